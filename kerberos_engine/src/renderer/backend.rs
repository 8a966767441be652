/// Backend selection
///
/// A backend is a factory that turns a surface plus a configuration into a
/// `GraphicsDevice`. Factories are registered once at startup; the renderer
/// picks one by `RendererConfig::backend` and never mixes backends afterwards.

use std::sync::Arc;

use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use rustc_hash::FxHashMap;
use serde::Deserialize;

use crate::config::RendererConfig;
use crate::error::{Error, Result};
use crate::graphics_device::{Extent2D, GraphicsDevice};
use crate::immediate::{HeadlessSurface, ImmediateGraphicsDevice};
use crate::{engine_error, engine_info};

/// Graphics backend kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// CPU-executed backend; commands take effect as they are recorded
    Immediate,
    /// Explicit command-buffer backend
    #[default]
    Vulkan,
}

impl BackendKind {
    pub fn name(&self) -> &'static str {
        match self {
            BackendKind::Immediate => "immediate",
            BackendKind::Vulkan => "vulkan",
        }
    }

    /// Whether the host OS can run this backend at all
    pub fn is_available_on_host(&self) -> bool {
        match self {
            BackendKind::Immediate => true,
            BackendKind::Vulkan => !cfg!(any(target_os = "macos", target_os = "ios")),
        }
    }
}

/// A platform window the backend can create a surface for
pub trait WindowHandleSource: HasWindowHandle + HasDisplayHandle + Send + Sync {}

impl<T: HasWindowHandle + HasDisplayHandle + Send + Sync + ?Sized> WindowHandleSource for T {}

/// What the renderer presents to
///
/// The window is borrowed, never owned: the windowing layer keeps it alive
/// for as long as the renderer exists.
pub enum SurfaceTarget<'a> {
    Window {
        window: &'a dyn WindowHandleSource,
        width: u32,
        height: u32,
    },
    /// Offscreen surface driven by the caller (tests, headless tools)
    Headless(Arc<HeadlessSurface>),
}

impl SurfaceTarget<'_> {
    /// Extent the first swapchain is requested at
    pub fn extent(&self) -> Extent2D {
        match self {
            SurfaceTarget::Window { width, height, .. } => Extent2D::new(*width, *height),
            SurfaceTarget::Headless(surface) => surface.extent(),
        }
    }
}

/// Device constructor for one backend
pub type BackendFactory =
    Box<dyn Fn(&SurfaceTarget<'_>, &RendererConfig) -> Result<Arc<dyn GraphicsDevice>> + Send + Sync>;

/// Registered backend factories by kind
pub struct BackendRegistry {
    factories: FxHashMap<BackendKind, BackendFactory>,
}

impl BackendRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self { factories: FxHashMap::default() }
    }

    /// Registry with the backends built into this crate (immediate)
    pub fn with_default_backends() -> Self {
        let mut registry = Self::new();
        registry.register(
            BackendKind::Immediate,
            Box::new(|surface, _config| {
                let device: Arc<dyn GraphicsDevice> = Arc::new(ImmediateGraphicsDevice::for_target(surface));
                Ok(device)
            }),
        );
        registry
    }

    /// Register (or replace) the factory for `kind`
    pub fn register(&mut self, kind: BackendKind, factory: BackendFactory) {
        engine_info!("kerberos::renderer", "Registered {} backend", kind.name());
        self.factories.insert(kind, factory);
    }

    pub fn is_registered(&self, kind: BackendKind) -> bool {
        self.factories.contains_key(&kind)
    }

    /// Construct the device for `config.backend`
    pub fn create_device(
        &self,
        surface: &SurfaceTarget<'_>,
        config: &RendererConfig,
    ) -> Result<Arc<dyn GraphicsDevice>> {
        let kind = config.backend;
        if !kind.is_available_on_host() {
            engine_error!("kerberos::renderer", "Backend {} is not available on this platform", kind.name());
            return Err(Error::UnsupportedBackend(format!(
                "{} is not available on this platform",
                kind.name()
            )));
        }
        let factory = self.factories.get(&kind).ok_or_else(|| {
            engine_error!("kerberos::renderer", "Backend {} is not registered", kind.name());
            Error::UnsupportedBackend(format!("{} backend is not registered", kind.name()))
        })?;
        let device = factory(surface, config)?;
        engine_info!(
            "kerberos::renderer",
            "Created {} device '{}'",
            kind.name(),
            device.info().device_name
        );
        Ok(device)
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::with_default_backends()
    }
}
