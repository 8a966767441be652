/// Pipeline trait and pipeline descriptor
///
/// A pipeline is immutable: any change to its inputs means a new pipeline.
/// `PipelineDesc::cache_key()` gives the identity used by the renderer's
/// pipeline cache.

use std::any::Any;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::graphics_device::{Shader, ShaderStage, TextureFormat};

/// Bytes of push-constant space every pipeline layout reserves
pub const MAX_PUSH_CONSTANT_SIZE: u32 = 128;

/// Number of texture slots a pipeline can sample from
pub const MAX_TEXTURE_SLOTS: u32 = 4;

/// Number of uniform buffer bindings a pipeline can read
pub const MAX_UNIFORM_BINDINGS: u32 = 4;

/// Primitive topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrimitiveTopology {
    /// Triangle list
    #[default]
    TriangleList,
    /// Triangle strip
    TriangleStrip,
    /// Line list
    LineList,
    /// Line strip
    LineStrip,
    /// Point list
    PointList,
}

/// Index buffer element type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexType {
    /// 16-bit indices (max 65535 vertices)
    U16,
    /// 32-bit indices (max ~4 billion vertices)
    U32,
}

impl IndexType {
    /// Size in bytes of one index element
    pub fn size_bytes(&self) -> u32 {
        match self {
            IndexType::U16 => 2,
            IndexType::U32 => 4,
        }
    }
}

/// Semantic format of one vertex attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexFormat {
    Float,
    Float2,
    Float3,
    Float4,
    Int,
    Int2,
    Int3,
    Int4,
    /// Four bytes normalized to [0, 1] (packed vertex colors)
    UByte4Norm,
}

impl VertexFormat {
    pub fn size_bytes(&self) -> u32 {
        match self {
            VertexFormat::Float | VertexFormat::Int | VertexFormat::UByte4Norm => 4,
            VertexFormat::Float2 | VertexFormat::Int2 => 8,
            VertexFormat::Float3 | VertexFormat::Int3 => 12,
            VertexFormat::Float4 | VertexFormat::Int4 => 16,
        }
    }
}

/// Vertex attribute description
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    /// Attribute location in shader
    pub location: u32,
    /// Data type and component count
    pub format: VertexFormat,
    /// Offset in bytes from the start of the vertex
    pub offset: u32,
}

/// Vertex input layout of one vertex buffer binding
///
/// The binding index is the position of the layout in
/// `PipelineDesc::vertex_layouts`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct VertexLayout {
    /// Stride in bytes between consecutive vertices
    pub stride: u32,
    /// Vertex attributes
    pub attributes: Vec<VertexAttribute>,
}

impl VertexLayout {
    /// Tightly packed layout: locations follow slice order starting at 0
    ///
    /// # Example
    ///
    /// ```
    /// use kerberos_engine::kerberos::render::{VertexFormat, VertexLayout};
    ///
    /// let layout = VertexLayout::packed(&[VertexFormat::Float3, VertexFormat::Float2]);
    /// assert_eq!(layout.stride, 20);
    /// assert_eq!(layout.attributes[1].offset, 12);
    /// ```
    pub fn packed(formats: &[VertexFormat]) -> Self {
        let mut offset = 0;
        let attributes = formats
            .iter()
            .enumerate()
            .map(|(location, &format)| {
                let attribute = VertexAttribute { location: location as u32, format, offset };
                offset += format.size_bytes();
                attribute
            })
            .collect();
        Self { stride: offset, attributes }
    }
}

/// Face culling mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CullMode {
    /// No culling
    None,
    /// Cull front faces
    Front,
    /// Cull back faces
    #[default]
    Back,
}

/// Front face winding order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FrontFace {
    #[default]
    CounterClockwise,
    Clockwise,
}

/// Comparison operator for depth testing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompareOp {
    /// Never passes
    Never,
    /// Passes if less
    #[default]
    Less,
    /// Passes if equal
    Equal,
    /// Passes if less or equal
    LessEqual,
    /// Passes if greater
    Greater,
    /// Passes if not equal
    NotEqual,
    /// Passes if greater or equal
    GreaterEqual,
    /// Always passes
    Always,
}

/// Depth test configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthState {
    pub test_enable: bool,
    pub write_enable: bool,
    pub compare_op: CompareOp,
}

impl Default for DepthState {
    fn default() -> Self {
        Self { test_enable: true, write_enable: true, compare_op: CompareOp::Less }
    }
}

/// Color blending preset applied to every blendable color attachment
///
/// Integer attachments are never blended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendMode {
    /// Source replaces destination
    #[default]
    Opaque,
    /// src * a + dst * (1 - a)
    AlphaBlend,
    /// src * a + dst
    Additive,
}

/// Attachment formats a pipeline renders into
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct RenderTargetLayout {
    pub color_formats: Vec<TextureFormat>,
    pub depth_format: Option<TextureFormat>,
}

/// Descriptor for creating a graphics pipeline
#[derive(Clone)]
pub struct PipelineDesc {
    /// Debug label used in logs and validation output
    pub label: String,
    pub vertex_shader: Arc<dyn Shader>,
    pub fragment_shader: Arc<dyn Shader>,
    /// One layout per vertex buffer binding
    pub vertex_layouts: Vec<VertexLayout>,
    pub topology: PrimitiveTopology,
    pub cull_mode: CullMode,
    pub front_face: FrontFace,
    pub depth: DepthState,
    pub blend: BlendMode,
    /// Formats of the target; the renderer overrides this with the bound target
    pub target: RenderTargetLayout,
}

impl PipelineDesc {
    /// Descriptor with default fixed-function state
    pub fn new(
        label: impl Into<String>,
        vertex_shader: Arc<dyn Shader>,
        fragment_shader: Arc<dyn Shader>,
        vertex_layouts: Vec<VertexLayout>,
    ) -> Self {
        Self {
            label: label.into(),
            vertex_shader,
            fragment_shader,
            vertex_layouts,
            topology: PrimitiveTopology::default(),
            cull_mode: CullMode::default(),
            front_face: FrontFace::default(),
            depth: DepthState::default(),
            blend: BlendMode::default(),
            target: RenderTargetLayout::default(),
        }
    }

    /// Full check, including the render target layout
    pub fn validate(&self) -> Result<()> {
        self.validate_shaders()?;
        if self.target.color_formats.is_empty() && self.target.depth_format.is_none() {
            return Err(Error::InvalidResource(format!(
                "pipeline '{}': render target layout has no attachments",
                self.label
            )));
        }
        Ok(())
    }

    /// Check shader stages and vertex layouts (the target is not known yet)
    pub fn validate_shaders(&self) -> Result<()> {
        if self.vertex_shader.stage() != ShaderStage::Vertex {
            return Err(Error::InvalidResource(format!(
                "pipeline '{}': '{}' is not a vertex shader",
                self.label,
                self.vertex_shader.label()
            )));
        }
        if self.fragment_shader.stage() != ShaderStage::Fragment {
            return Err(Error::InvalidResource(format!(
                "pipeline '{}': '{}' is not a fragment shader",
                self.label,
                self.fragment_shader.label()
            )));
        }
        for (binding, layout) in self.vertex_layouts.iter().enumerate() {
            for attribute in &layout.attributes {
                if attribute.offset + attribute.format.size_bytes() > layout.stride {
                    return Err(Error::InvalidResource(format!(
                        "pipeline '{}': attribute {} overruns stride {} of binding {}",
                        self.label, attribute.location, layout.stride, binding
                    )));
                }
            }
        }
        Ok(())
    }

    /// Identity of the pipeline this descriptor would produce
    pub fn cache_key(&self) -> PipelineKey {
        PipelineKey {
            vertex_shader: shader_identity(&self.vertex_shader),
            fragment_shader: shader_identity(&self.fragment_shader),
            vertex_layouts: self.vertex_layouts.clone(),
            topology: self.topology,
            cull_mode: self.cull_mode,
            front_face: self.front_face,
            depth: self.depth,
            blend: self.blend,
            target: self.target.clone(),
        }
    }
}

impl std::fmt::Debug for PipelineDesc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineDesc")
            .field("label", &self.label)
            .field("vertex_shader", &self.vertex_shader.label())
            .field("fragment_shader", &self.fragment_shader.label())
            .field("topology", &self.topology)
            .field("depth", &self.depth)
            .field("blend", &self.blend)
            .field("target", &self.target)
            .finish()
    }
}

fn shader_identity(shader: &Arc<dyn Shader>) -> usize {
    Arc::as_ptr(shader) as *const () as usize
}

/// Hashable identity of a pipeline: shader objects plus every fixed-function field
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PipelineKey {
    vertex_shader: usize,
    fragment_shader: usize,
    vertex_layouts: Vec<VertexLayout>,
    topology: PrimitiveTopology,
    cull_mode: CullMode,
    front_face: FrontFace,
    depth: DepthState,
    blend: BlendMode,
    target: RenderTargetLayout,
}

/// Graphics pipeline trait
///
/// Implemented by backend-specific pipeline types.
pub trait Pipeline: Send + Sync {
    /// Creation descriptor (never changes)
    fn desc(&self) -> &PipelineDesc;

    /// Backend downcast hook
    fn as_any(&self) -> &dyn Any;
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
