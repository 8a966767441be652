/// Immediate resources backed by CPU memory

use std::any::Any;
use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};
use crate::graphics_device::{
    Buffer, BufferDesc, Framebuffer, FramebufferAttachments, FramebufferDesc, Pipeline, PipelineDesc, Shader, ShaderDesc, ShaderStage,
    Texture, TextureDesc, TextureFormat,
};
use crate::immediate::{lock, DeviceShared, MemoryReservation};

// ===== TEXEL STORAGE =====

/// Texel memory of one image (texture, attachment or swapchain image)
pub struct TexelStorage {
    desc: TextureDesc,
    texels: Mutex<Vec<u8>>,
    _memory: Option<MemoryReservation>,
}

impl TexelStorage {
    pub(crate) fn new(desc: TextureDesc, memory: MemoryReservation) -> Self {
        Self::allocate(desc, Some(memory))
    }

    /// Storage not accounted against the device memory limit
    pub(crate) fn unaccounted(desc: TextureDesc) -> Self {
        Self::allocate(desc, None)
    }

    fn allocate(desc: TextureDesc, memory: Option<MemoryReservation>) -> Self {
        let texels = vec![0u8; desc.byte_size() as usize];
        Self { desc, texels: Mutex::new(texels), _memory: memory }
    }

    pub fn desc(&self) -> &TextureDesc {
        &self.desc
    }

    /// Copy of every texel
    pub fn read(&self) -> Result<Vec<u8>> {
        Ok(lock(&self.texels, "texels")?.clone())
    }

    pub(crate) fn write(&self, data: &[u8]) -> Result<()> {
        let mut texels = lock(&self.texels, "texels")?;
        texels.copy_from_slice(data);
        Ok(())
    }

    /// Set every texel to the encoding of `texel`
    pub(crate) fn fill(&self, texel: &[u8]) -> Result<()> {
        let mut texels = lock(&self.texels, "texels")?;
        for chunk in texels.chunks_exact_mut(texel.len()) {
            chunk.copy_from_slice(texel);
        }
        Ok(())
    }

    /// The 4-byte texel at (x, y)
    pub(crate) fn texel_i32(&self, x: u32, y: u32) -> Result<i32> {
        let texels = lock(&self.texels, "texels")?;
        let offset = ((y * self.desc.width + x) * self.desc.format.bytes_per_pixel()) as usize;
        let bytes: [u8; 4] = texels
            .get(offset..offset + 4)
            .and_then(|slice| slice.try_into().ok())
            .ok_or_else(|| Error::InvalidOperation(format!("texel ({}, {}) out of range", x, y)))?;
        Ok(i32::from_le_bytes(bytes))
    }
}

/// Encode a float color for a color format
pub(crate) fn encode_color(format: TextureFormat, color: [f32; 4]) -> Vec<u8> {
    let unorm = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
    match format {
        TextureFormat::R8G8B8A8_SRGB | TextureFormat::R8G8B8A8_UNORM => {
            vec![unorm(color[0]), unorm(color[1]), unorm(color[2]), unorm(color[3])]
        }
        TextureFormat::B8G8R8A8_SRGB | TextureFormat::B8G8R8A8_UNORM => {
            vec![unorm(color[2]), unorm(color[1]), unorm(color[0]), unorm(color[3])]
        }
        TextureFormat::R32G32B32A32_SFLOAT => bytemuck::cast_slice(&color).to_vec(),
        TextureFormat::R32_SINT => (color[0] as i32).to_le_bytes().to_vec(),
        TextureFormat::D32_FLOAT | TextureFormat::D24_UNORM_S8_UINT => encode_depth(format, color[0]),
    }
}

/// Encode a depth value (stencil cleared to 0)
pub(crate) fn encode_depth(format: TextureFormat, depth: f32) -> Vec<u8> {
    match format {
        TextureFormat::D24_UNORM_S8_UINT => {
            let d24 = (depth.clamp(0.0, 1.0) * 0x00FF_FFFF as f32).round() as u32;
            d24.to_le_bytes().to_vec()
        }
        _ => depth.to_le_bytes().to_vec(),
    }
}

// ===== BUFFER =====

pub struct ImmediateBuffer {
    desc: BufferDesc,
    data: Mutex<Vec<u8>>,
    _memory: MemoryReservation,
}

impl ImmediateBuffer {
    pub(crate) fn new(desc: BufferDesc, memory: MemoryReservation) -> Self {
        let data = vec![0u8; desc.size as usize];
        Self { desc, data: Mutex::new(data), _memory: memory }
    }

    /// Copy of the buffer contents
    pub fn read_data(&self) -> Result<Vec<u8>> {
        Ok(lock(&self.data, "buffer")?.clone())
    }
}

impl Buffer for ImmediateBuffer {
    fn desc(&self) -> &BufferDesc {
        &self.desc
    }

    fn set_data(&self, offset: u64, data: &[u8]) -> Result<()> {
        self.desc.validate_write(offset, data.len())?;
        let mut storage = lock(&self.data, "buffer")?;
        let start = offset as usize;
        storage[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ===== TEXTURE =====

pub struct ImmediateTexture {
    storage: Arc<TexelStorage>,
}

impl ImmediateTexture {
    pub(crate) fn new(storage: Arc<TexelStorage>) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &Arc<TexelStorage> {
        &self.storage
    }

    /// Copy of every texel
    pub fn read_data(&self) -> Result<Vec<u8>> {
        self.storage.read()
    }

    pub(crate) fn downcast(texture: &dyn Texture) -> Result<&ImmediateTexture> {
        texture
            .as_any()
            .downcast_ref::<ImmediateTexture>()
            .ok_or_else(|| Error::InvalidOperation(format!("texture '{}' belongs to another backend", texture.desc().label)))
    }
}

impl Texture for ImmediateTexture {
    fn desc(&self) -> &TextureDesc {
        self.storage.desc()
    }

    fn set_data(&self, data: &[u8]) -> Result<()> {
        self.storage.desc().validate_upload(data.len())?;
        self.storage.write(data)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ===== FRAMEBUFFER =====

/// Texel storage of every attachment, taken from one snapshot
pub(crate) struct AttachmentStorages {
    pub(crate) desc: FramebufferDesc,
    pub(crate) colors: Vec<Arc<TexelStorage>>,
    pub(crate) depth: Option<Arc<TexelStorage>>,
}

pub struct ImmediateFramebuffer {
    attachments: Mutex<FramebufferAttachments>,
    shared: Arc<DeviceShared>,
}

impl ImmediateFramebuffer {
    /// Allocate every attachment of `desc` against the device memory limit
    pub(crate) fn new(desc: FramebufferDesc, shared: Arc<DeviceShared>) -> Result<Self> {
        let attachments = Self::allocate(desc, &shared)?;
        Ok(Self { attachments: Mutex::new(attachments), shared })
    }

    fn allocate(desc: FramebufferDesc, shared: &Arc<DeviceShared>) -> Result<FramebufferAttachments> {
        FramebufferAttachments::build(desc, |texture_desc| {
            texture_desc.validate()?;
            let memory = shared.reserve(texture_desc.byte_size())?;
            let storage = Arc::new(TexelStorage::new(texture_desc, memory));
            Ok(Arc::new(ImmediateTexture::new(storage)) as Arc<dyn Texture>)
        })
    }

    fn snapshot(&self) -> FramebufferAttachments {
        self.attachments.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }

    pub(crate) fn storages(&self) -> Result<AttachmentStorages> {
        let attachments = self.snapshot();
        let colors = attachments
            .colors
            .iter()
            .map(|texture| Ok(ImmediateTexture::downcast(texture.as_ref())?.storage().clone()))
            .collect::<Result<Vec<_>>>()?;
        let depth = match &attachments.depth {
            Some(texture) => Some(ImmediateTexture::downcast(texture.as_ref())?.storage().clone()),
            None => None,
        };
        Ok(AttachmentStorages { desc: attachments.desc, colors, depth })
    }
}

impl Framebuffer for ImmediateFramebuffer {
    fn desc(&self) -> FramebufferDesc {
        self.snapshot().desc
    }

    fn attachments(&self) -> FramebufferAttachments {
        self.snapshot()
    }

    fn resize(&self, width: u32, height: u32) -> Result<()> {
        let mut attachments = lock(&self.attachments, "framebuffer")?;
        if attachments.desc.width == width && attachments.desc.height == height {
            return Ok(());
        }
        let desc = attachments.desc.resized(width, height)?;
        // On failure the old attachments stay in place
        *attachments = Self::allocate(desc, &self.shared)?;
        Ok(())
    }

    fn read_pixel(&self, attachment: usize, x: u32, y: u32) -> Result<i32> {
        let attachments = self.snapshot();
        attachments.desc.validate_int_access(attachment, x, y)?;
        self.shared.retire_all()?;
        let texture = attachments
            .colors
            .get(attachment)
            .ok_or_else(|| Error::InvalidOperation(format!("no color attachment {}", attachment)))?;
        ImmediateTexture::downcast(texture.as_ref())?.storage().texel_i32(x, y)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ===== SHADER & PIPELINE =====

pub struct ImmediateShader {
    desc: ShaderDesc,
}

impl ImmediateShader {
    pub(crate) fn new(desc: ShaderDesc) -> Self {
        Self { desc }
    }
}

impl Shader for ImmediateShader {
    fn label(&self) -> &str {
        &self.desc.label
    }

    fn stage(&self) -> ShaderStage {
        self.desc.stage
    }

    fn entry_point(&self) -> &str {
        &self.desc.entry_point
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct ImmediatePipeline {
    desc: PipelineDesc,
}

impl ImmediatePipeline {
    pub(crate) fn new(desc: PipelineDesc) -> Self {
        Self { desc }
    }
}

impl Pipeline for ImmediatePipeline {
    fn desc(&self) -> &PipelineDesc {
        &self.desc
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
