//! Kerberos sandbox
//!
//! Opens a window, creates a renderer for the backend named in
//! `kerberos.toml` and clears the swapchain to a slowly cycling color until
//! the window is closed.

use std::sync::Arc;
use std::time::Instant;

use kerberos_engine::glam::Vec4;
use kerberos_engine::kerberos::{
    BackendRegistry, Error, FrameStatus, Renderer, RendererConfig, Result, SurfaceTarget,
};
use kerberos_engine::{engine_error, engine_info, engine_warn};
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

const LOG_SOURCE: &str = "kerberos::sandbox";
const CONFIG_PATH: &str = "kerberos.toml";

struct SandboxApp {
    config: RendererConfig,
    registry: BackendRegistry,
    // Dropped before the window it presents to
    renderer: Option<Renderer>,
    window: Option<Arc<Window>>,
    started: Instant,
    exit_error: Option<Error>,
}

impl SandboxApp {
    fn new(config: RendererConfig) -> Self {
        let mut registry = BackendRegistry::with_default_backends();
        kerberos_engine_renderer_vulkan::register(&mut registry);
        Self {
            config,
            registry,
            renderer: None,
            window: None,
            started: Instant::now(),
            exit_error: None,
        }
    }

    fn create_renderer(&mut self, window: &Arc<Window>) -> Result<Renderer> {
        let size = window.inner_size();
        let surface = SurfaceTarget::Window { window: window.as_ref(), width: size.width, height: size.height };
        Renderer::new(&self.registry, surface, self.config.clone())
    }

    fn render(&mut self) -> Result<()> {
        let Some(renderer) = self.renderer.as_mut() else {
            return Ok(());
        };

        match renderer.begin_frame()? {
            FrameStatus::Ready(_) => {}
            FrameStatus::Suspended | FrameStatus::Dropped => return Ok(()),
        }

        let t = self.started.elapsed().as_secs_f32();
        renderer.set_clear_color(Vec4::new(
            0.5 + 0.5 * t.sin(),
            0.5 + 0.5 * (t * 0.7).sin(),
            0.5 + 0.5 * (t * 1.3).sin(),
            1.0,
        ));
        renderer.clear()?;
        renderer.end_frame()?;
        renderer.present()?;
        Ok(())
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: Error) {
        engine_error!(LOG_SOURCE, "Sandbox stopped: {}", error);
        self.exit_error = Some(error);
        self.shutdown();
        event_loop.exit();
    }

    fn shutdown(&mut self) {
        if let Some(mut renderer) = self.renderer.take() {
            if let Err(e) = renderer.shutdown() {
                engine_warn!(LOG_SOURCE, "Renderer shutdown reported: {}", e);
            }
            let stats = renderer.stats();
            engine_info!(LOG_SOURCE, "Rendered {:?}", stats);
        }
    }
}

impl ApplicationHandler for SandboxApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let attributes = Window::default_attributes()
            .with_title(self.config.app_name.clone())
            .with_inner_size(PhysicalSize::new(1280, 720));
        let window = match event_loop.create_window(attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                self.fail(event_loop, Error::InitializationFailed(format!("Failed to create window: {}", e)));
                return;
            }
        };

        match self.create_renderer(&window) {
            Ok(renderer) => {
                engine_info!(
                    LOG_SOURCE,
                    "Renderer ready on '{}' ({})",
                    renderer.device().info().device_name,
                    renderer.device().info().backend.name()
                );
                self.renderer = Some(renderer);
                self.window = Some(window);
            }
            Err(e) => self.fail(event_loop, e),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                self.shutdown();
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(renderer) = self.renderer.as_mut() {
                    renderer.on_surface_resized(size.width, size.height);
                }
            }
            WindowEvent::RedrawRequested => {
                if let Err(e) = self.render() {
                    self.fail(event_loop, e);
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }
}

fn main() -> Result<()> {
    let config = RendererConfig::load_from_path(CONFIG_PATH)?;

    let event_loop = EventLoop::new()
        .map_err(|e| Error::InitializationFailed(format!("Failed to create event loop: {}", e)))?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = SandboxApp::new(config);
    event_loop
        .run_app(&mut app)
        .map_err(|e| Error::BackendError(format!("Event loop error: {}", e)))?;

    match app.exit_error.take() {
        Some(error) => Err(error),
        None => Ok(()),
    }
}
