// =============================================================================
// CONFIGURATION - Renderer settings loaded from TOML
// =============================================================================
//
// Every field has a default, so a partial file (or no file at all) yields a
// usable configuration. `validate()` rejects values the frame loop cannot run
// with.

use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::graphics_device::PresentMode;
use crate::log::LogSeverity;
use crate::renderer::BackendKind;
use crate::engine_info;

/// Upper bound on frames in flight
pub const MAX_FRAMES_IN_FLIGHT: u32 = 8;

/// Settings consumed at renderer creation
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Application name reported to the driver
    pub app_name: String,
    pub backend: BackendKind,
    /// Requested minimum swapchain image count
    pub min_image_count: u32,
    pub present_mode: PresentMode,
    /// Number of frame slots (K)
    pub frames_in_flight: u32,
    /// Request validation layers; ignored in release builds
    pub enable_validation: bool,
    /// Bound on the per-frame fence wait before the device is considered lost
    pub fence_timeout_ns: u64,
    /// Give the swapchain a depth target
    pub depth_buffer: bool,
    /// Minimum severity passed to the engine logger
    pub log_level: LogSeverity,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            app_name: "Kerberos Application".to_string(),
            backend: BackendKind::default(),
            min_image_count: 2,
            present_mode: PresentMode::Vsync,
            frames_in_flight: 2,
            enable_validation: cfg!(debug_assertions),
            fence_timeout_ns: 10_000_000_000_000,
            depth_buffer: true,
            log_level: LogSeverity::Info,
        }
    }
}

impl RendererConfig {
    /// Load configuration from a specific path
    ///
    /// A missing file gives the defaults; an unreadable or malformed file is
    /// an `InitializationFailed` error.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            engine_info!("kerberos::config", "Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::InitializationFailed(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let config = Self::from_toml_str(&content)?;
        engine_info!("kerberos::config", "Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| Error::InitializationFailed(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.frames_in_flight == 0 || self.frames_in_flight > MAX_FRAMES_IN_FLIGHT {
            return Err(Error::InitializationFailed(format!(
                "frames_in_flight must be in 1..={}, got {}",
                MAX_FRAMES_IN_FLIGHT, self.frames_in_flight
            )));
        }
        if self.min_image_count == 0 {
            return Err(Error::InitializationFailed("min_image_count must be at least 1".to_string()));
        }
        if self.fence_timeout_ns == 0 {
            return Err(Error::InitializationFailed("fence_timeout_ns must be nonzero".to_string()));
        }
        Ok(())
    }

    /// Validation layers are only ever enabled in debug builds
    pub fn validation_enabled(&self) -> bool {
        cfg!(debug_assertions) && self.enable_validation
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
