/// Shader - Vulkan implementation of the Shader trait
///
/// Bytecode is checked (alignment, SPIR-V magic) and reflected with spirq
/// before a module is created, so that a shader which cannot work with the
/// shared pipeline layout fails at creation with its label in the log,
/// rather than later inside the driver.

use ash::vk;
use kerberos_engine::kerberos::render::{Shader, ShaderDesc, ShaderStage, MAX_PUSH_CONSTANT_SIZE};
use kerberos_engine::kerberos::{Error, Result};
use kerberos_engine::engine_error;
use spirq::spirv::ExecutionModel;
use std::any::Any;
use std::ffi::CString;
use std::sync::Arc;

use crate::vulkan_context::{GpuContext, LOG_SOURCE};
use crate::vulkan_format::SET0_BINDING_COUNT;

const SPIRV_MAGIC: u32 = 0x0723_0203;

fn invalid(label: &str, reason: String) -> Error {
    engine_error!(LOG_SOURCE, "Shader '{}': {}", label, reason);
    Error::InvalidResource(format!("shader '{}': {}", label, reason))
}

/// Reassemble bytecode into SPIR-V words
pub(crate) fn spirv_words(label: &str, code: &[u8]) -> Result<Vec<u32>> {
    if code.len() % 4 != 0 {
        return Err(invalid(label, format!("code is not 4-byte aligned (size: {} bytes)", code.len())));
    }
    let words: Vec<u32> = code
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();
    match words.first() {
        Some(&SPIRV_MAGIC) => Ok(words),
        Some(&magic) => Err(invalid(label, format!("bad SPIR-V magic 0x{:08x}", magic))),
        None => Err(invalid(label, "empty code".to_string())),
    }
}

fn execution_model(stage: ShaderStage) -> ExecutionModel {
    match stage {
        ShaderStage::Vertex => ExecutionModel::Vertex,
        ShaderStage::Fragment => ExecutionModel::Fragment,
    }
}

/// Check the module against the shared pipeline layout
///
/// The entry point must exist for `stage`; push constants must fit in
/// `MAX_PUSH_CONSTANT_SIZE`; descriptors must be texture slots or uniform
/// bindings of set 0.
fn reflect(label: &str, words: &[u32], stage: ShaderStage, entry_point: &str) -> Result<()> {
    let entry_points = spirq::ReflectConfig::new()
        .spv(words)
        .ref_all_rscs(true)
        .reflect()
        .map_err(|e| invalid(label, format!("SPIR-V reflection failed: {:?}", e)))?;

    let model = execution_model(stage);
    let entry = entry_points
        .iter()
        .find(|ep| ep.name == entry_point && ep.exec_model == model)
        .ok_or_else(|| invalid(label, format!("no {:?} entry point named '{}'", stage, entry_point)))?;

    for var in entry.vars.iter() {
        match var {
            spirq::var::Variable::PushConstant { ty, .. } => {
                let size = ty.nbyte().unwrap_or(0) as u32;
                if size > MAX_PUSH_CONSTANT_SIZE {
                    return Err(invalid(
                        label,
                        format!("push constants use {} bytes (max {})", size, MAX_PUSH_CONSTANT_SIZE),
                    ));
                }
            }
            spirq::var::Variable::Descriptor { desc_bind, .. } => {
                if desc_bind.set() != 0 || desc_bind.bind() >= SET0_BINDING_COUNT {
                    return Err(invalid(
                        label,
                        format!(
                            "descriptor at set {} binding {} is outside the {} bindings of set 0",
                            desc_bind.set(),
                            desc_bind.bind(),
                            SET0_BINDING_COUNT
                        ),
                    ));
                }
            }
            _ => {}
        }
    }
    Ok(())
}

/// Vulkan shader implementation
pub struct VulkanShader {
    ctx: Arc<GpuContext>,
    pub(crate) module: vk::ShaderModule,
    label: String,
    stage: ShaderStage,
    entry_point: String,
    pub(crate) entry_point_c: CString,
}

impl VulkanShader {
    pub(crate) fn new(ctx: Arc<GpuContext>, desc: ShaderDesc) -> Result<Self> {
        desc.validate().map_err(|e| {
            engine_error!(LOG_SOURCE, "{}", e);
            e
        })?;

        let words = spirv_words(&desc.label, &desc.code)?;
        reflect(&desc.label, &words, desc.stage, &desc.entry_point)?;

        let entry_point_c = CString::new(desc.entry_point.clone())
            .map_err(|_| invalid(&desc.label, "entry point contains a NUL byte".to_string()))?;

        let create_info = vk::ShaderModuleCreateInfo::default().code(&words);
        let module = unsafe {
            ctx.device
                .create_shader_module(&create_info, None)
                .map_err(|e| invalid(&desc.label, format!("module creation failed: {:?}", e)))?
        };

        Ok(Self {
            ctx,
            module,
            label: desc.label,
            stage: desc.stage,
            entry_point: desc.entry_point,
            entry_point_c,
        })
    }
}

impl Shader for VulkanShader {
    fn label(&self) -> &str {
        &self.label
    }

    fn stage(&self) -> ShaderStage {
        self.stage
    }

    fn entry_point(&self) -> &str {
        &self.entry_point
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for VulkanShader {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.destroy_shader_module(self.module, None);
        }
    }
}

/// Downcast an engine shader; shaders from another backend are rejected
pub(crate) fn vk_shader(shader: &dyn Shader) -> Result<&VulkanShader> {
    shader
        .as_any()
        .downcast_ref::<VulkanShader>()
        .ok_or_else(|| Error::InvalidResource(format!("shader '{}' does not belong to the Vulkan backend", shader.label())))
}

#[cfg(test)]
#[path = "vulkan_shader_tests.rs"]
mod tests;
