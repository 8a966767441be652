/// Pipeline - Vulkan implementation of the Pipeline trait
///
/// Pipelines target dynamic rendering: attachment formats come from
/// `PipelineDesc::target` instead of a render pass. All pipelines share the
/// context's pipeline layout (texture slots in set 0, one push-constant
/// range), so binding state survives pipeline switches.

use ash::vk;
use kerberos_engine::kerberos::render::{Pipeline, PipelineDesc};
use kerberos_engine::kerberos::{Error, Result};
use kerberos_engine::engine_error;
use std::any::Any;
use std::sync::Arc;

use crate::vulkan_context::{GpuContext, LOG_SOURCE};
use crate::vulkan_format::{
    blend_attachment_to_vk, compare_op_to_vk, cull_mode_to_vk, front_face_to_vk, texture_format_to_vk, topology_to_vk,
    vertex_format_to_vk,
};
use crate::vulkan_shader::vk_shader;

/// Vulkan pipeline implementation
pub struct VulkanPipeline {
    ctx: Arc<GpuContext>,
    pub(crate) pipeline: vk::Pipeline,
    desc: PipelineDesc,
}

impl VulkanPipeline {
    pub(crate) fn new(ctx: Arc<GpuContext>, desc: PipelineDesc) -> Result<Self> {
        desc.validate().map_err(|e| {
            engine_error!(LOG_SOURCE, "{}", e);
            e
        })?;

        let vertex_shader = vk_shader(desc.vertex_shader.as_ref())?;
        let fragment_shader = vk_shader(desc.fragment_shader.as_ref())?;

        let shader_stages = [
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(vertex_shader.module)
                .name(&vertex_shader.entry_point_c),
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(fragment_shader.module)
                .name(&fragment_shader.entry_point_c),
        ];

        // Vertex input: one binding per layout, in order
        let vertex_bindings: Vec<vk::VertexInputBindingDescription> = desc
            .vertex_layouts
            .iter()
            .enumerate()
            .map(|(binding, layout)| vk::VertexInputBindingDescription {
                binding: binding as u32,
                stride: layout.stride,
                input_rate: vk::VertexInputRate::VERTEX,
            })
            .collect();

        let vertex_attributes: Vec<vk::VertexInputAttributeDescription> = desc
            .vertex_layouts
            .iter()
            .enumerate()
            .flat_map(|(binding, layout)| {
                layout.attributes.iter().map(move |attribute| vk::VertexInputAttributeDescription {
                    location: attribute.location,
                    binding: binding as u32,
                    format: vertex_format_to_vk(attribute.format),
                    offset: attribute.offset,
                })
            })
            .collect();

        let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&vertex_bindings)
            .vertex_attribute_descriptions(&vertex_attributes);

        let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(topology_to_vk(desc.topology))
            .primitive_restart_enable(false);

        // Viewport and scissor are dynamic; only the counts matter here
        let viewport_state = vk::PipelineViewportStateCreateInfo::default().viewport_count(1).scissor_count(1);

        let rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(cull_mode_to_vk(desc.cull_mode))
            .front_face(front_face_to_vk(desc.front_face))
            .depth_bias_enable(false);

        let has_depth = desc.target.depth_format.is_some();
        let depth_stencil_state = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(has_depth && desc.depth.test_enable)
            .depth_write_enable(has_depth && desc.depth.write_enable)
            .depth_compare_op(compare_op_to_vk(desc.depth.compare_op))
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let color_blend_attachments: Vec<vk::PipelineColorBlendAttachmentState> = desc
            .target
            .color_formats
            .iter()
            .map(|&format| blend_attachment_to_vk(desc.blend, format))
            .collect();
        let color_blend_state = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(&color_blend_attachments);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        // Attachment formats for dynamic rendering
        let color_formats: Vec<vk::Format> =
            desc.target.color_formats.iter().map(|&format| texture_format_to_vk(format)).collect();
        let depth_format = desc.target.depth_format.map(texture_format_to_vk).unwrap_or(vk::Format::UNDEFINED);
        let stencil_format = match desc.target.depth_format {
            Some(format) if format.has_stencil() => texture_format_to_vk(format),
            _ => vk::Format::UNDEFINED,
        };
        let mut rendering_info = vk::PipelineRenderingCreateInfo::default()
            .color_attachment_formats(&color_formats)
            .depth_attachment_format(depth_format)
            .stencil_attachment_format(stencil_format);

        let pipeline_create_info = vk::GraphicsPipelineCreateInfo::default()
            .push_next(&mut rendering_info)
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input_state)
            .input_assembly_state(&input_assembly_state)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization_state)
            .depth_stencil_state(&depth_stencil_state)
            .multisample_state(&multisample_state)
            .color_blend_state(&color_blend_state)
            .dynamic_state(&dynamic_state)
            .layout(ctx.pipeline_layout);

        let pipelines = unsafe {
            ctx.device
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_create_info], None)
                .map_err(|(_, e)| {
                    engine_error!(LOG_SOURCE, "Failed to create graphics pipeline '{}': {:?}", desc.label, e);
                    Error::InvalidResource(format!("pipeline '{}': creation failed: {:?}", desc.label, e))
                })?
        };
        let pipeline = pipelines
            .first()
            .copied()
            .ok_or_else(|| Error::InvalidResource(format!("pipeline '{}': driver returned no pipeline", desc.label)))?;

        Ok(Self { ctx, pipeline, desc })
    }
}

impl Pipeline for VulkanPipeline {
    fn desc(&self) -> &PipelineDesc {
        &self.desc
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for VulkanPipeline {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.destroy_pipeline(self.pipeline, None);
        }
    }
}

/// Downcast an engine pipeline; pipelines from another backend are rejected
pub(crate) fn vk_pipeline(pipeline: &dyn Pipeline) -> Result<&VulkanPipeline> {
    pipeline
        .as_any()
        .downcast_ref::<VulkanPipeline>()
        .ok_or_else(|| Error::InvalidOperation(format!("pipeline '{}' does not belong to the Vulkan backend", pipeline.desc().label)))
}
