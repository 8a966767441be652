/// Shader trait and shader descriptor

use std::any::Any;

use crate::error::{Error, Result};

/// Shader stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    /// Vertex shader
    Vertex,
    /// Fragment/Pixel shader
    Fragment,
}

/// Descriptor for creating a shader
///
/// `code` is a finished pipeline-stage object produced by the asset
/// pipeline: SPIR-V words for the Vulkan backend, any opaque blob for the
/// immediate backend.
#[derive(Debug, Clone)]
pub struct ShaderDesc {
    /// Debug label used in logs and validation output
    pub label: String,
    /// Compiled shader bytecode
    pub code: Vec<u8>,
    /// Shader stage
    pub stage: ShaderStage,
    /// Entry point function name
    pub entry_point: String,
}

impl ShaderDesc {
    pub fn validate(&self) -> Result<()> {
        if self.code.is_empty() {
            return Err(Error::InvalidResource(format!("shader '{}': empty code", self.label)));
        }
        if self.entry_point.is_empty() {
            return Err(Error::InvalidResource(format!(
                "shader '{}': empty entry point",
                self.label
            )));
        }
        Ok(())
    }
}

/// Shader resource trait
///
/// Shaders are consumed by pipelines and carry no mutable state.
pub trait Shader: Send + Sync {
    fn label(&self) -> &str;

    fn stage(&self) -> ShaderStage;

    fn entry_point(&self) -> &str;

    /// Backend downcast hook
    fn as_any(&self) -> &dyn Any;
}
