/// Staged uploads waiting to be recorded
///
/// `Buffer::set_data` and `Texture::set_data` copy into a host-visible
/// staging buffer and push a `PendingUpload` onto the context queue. The next
/// command list to `begin()` drains the queue, records the copies ahead of
/// anything else, and keeps the staging buffers until it is re-recorded
/// (which only happens after its fence has signaled).

use ash::vk;
use kerberos_engine::engine_warn;
use std::sync::Arc;

use crate::vulkan_buffer::RawBuffer;
use crate::vulkan_context::{GpuContext, LOG_SOURCE};
use crate::vulkan_texture::ImageState;

enum UploadTarget {
    /// `stages`/`access` read the buffer outside the copy
    Buffer { buffer: vk::Buffer, offset: u64, stages: vk::PipelineStageFlags, access: vk::AccessFlags },
    Image { state: Arc<ImageState>, width: u32, height: u32 },
}

pub(crate) struct PendingUpload {
    target: UploadTarget,
    staging: RawBuffer,
}

impl PendingUpload {
    pub(crate) fn buffer(
        buffer: vk::Buffer,
        offset: u64,
        (stages, access): (vk::PipelineStageFlags, vk::AccessFlags),
        staging: RawBuffer,
    ) -> Self {
        Self { target: UploadTarget::Buffer { buffer, offset, stages, access }, staging }
    }

    pub(crate) fn image(state: Arc<ImageState>, width: u32, height: u32, staging: RawBuffer) -> Self {
        Self { target: UploadTarget::Image { state, width, height }, staging }
    }

    pub(crate) fn targets_buffer(&self, buffer: vk::Buffer) -> bool {
        matches!(&self.target, UploadTarget::Buffer { buffer: b, .. } if *b == buffer)
    }

    pub(crate) fn targets_image(&self, image: vk::Image) -> bool {
        matches!(&self.target, UploadTarget::Image { state, .. } if state.image == image)
    }

    /// Record barrier, copy and barrier; the upload becomes its staging buffer
    pub(crate) unsafe fn record(self, device: &ash::Device, command_buffer: vk::CommandBuffer) -> RawBuffer {
        match &self.target {
            UploadTarget::Buffer { buffer, offset, stages, access } => {
                let size = self.staging.size;

                // Earlier reads must finish before the overwrite
                let before = vk::BufferMemoryBarrier::default()
                    .src_access_mask(*access)
                    .dst_access_mask(vk::AccessFlags::TRANSFER_WRITE)
                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .buffer(*buffer)
                    .offset(*offset)
                    .size(size);
                device.cmd_pipeline_barrier(
                    command_buffer,
                    *stages,
                    vk::PipelineStageFlags::TRANSFER,
                    vk::DependencyFlags::empty(),
                    &[],
                    &[before],
                    &[],
                );

                let region = vk::BufferCopy { src_offset: 0, dst_offset: *offset, size };
                device.cmd_copy_buffer(command_buffer, self.staging.buffer, *buffer, &[region]);

                let after = vk::BufferMemoryBarrier::default()
                    .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
                    .dst_access_mask(*access)
                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .buffer(*buffer)
                    .offset(*offset)
                    .size(size);
                device.cmd_pipeline_barrier(
                    command_buffer,
                    vk::PipelineStageFlags::TRANSFER,
                    *stages,
                    vk::DependencyFlags::empty(),
                    &[],
                    &[after],
                    &[],
                );
            }
            UploadTarget::Image { state, width, height } => {
                state.transition(device, command_buffer, vk::ImageLayout::TRANSFER_DST_OPTIMAL);

                let region = vk::BufferImageCopy::default()
                    .buffer_offset(0)
                    .buffer_row_length(0)
                    .buffer_image_height(0)
                    .image_subresource(vk::ImageSubresourceLayers {
                        aspect_mask: state.aspect,
                        mip_level: 0,
                        base_array_layer: 0,
                        layer_count: 1,
                    })
                    .image_offset(vk::Offset3D { x: 0, y: 0, z: 0 })
                    .image_extent(vk::Extent3D { width: *width, height: *height, depth: 1 });
                device.cmd_copy_buffer_to_image(
                    command_buffer,
                    self.staging.buffer,
                    state.image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[region],
                );

                state.transition(device, command_buffer, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
            }
        }
        self.staging
    }

    /// Drop without recording
    pub(crate) fn release(self, ctx: &GpuContext) {
        self.staging.release(ctx);
    }
}

/// Take every queued upload, in submission order
pub(crate) fn take_pending(ctx: &GpuContext) -> Vec<PendingUpload> {
    match ctx.pending_uploads.lock() {
        Ok(mut pending) => std::mem::take(&mut *pending),
        Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
    }
}

/// Forget queued uploads matching `predicate` (their destination is going away)
pub(crate) fn cancel_uploads(ctx: &GpuContext, predicate: impl Fn(&PendingUpload) -> bool) {
    let cancelled: Vec<PendingUpload> = {
        let mut pending = match ctx.pending_uploads.lock() {
            Ok(pending) => pending,
            Err(poisoned) => poisoned.into_inner(),
        };
        let (cancelled, kept) = std::mem::take(&mut *pending).into_iter().partition(|upload| predicate(upload));
        *pending = kept;
        cancelled
    };
    if !cancelled.is_empty() {
        engine_warn!(LOG_SOURCE, "Dropped {} upload(s) never recorded", cancelled.len());
    }
    for upload in cancelled {
        upload.release(ctx);
    }
}
