//! Dynamic glyph atlas: shelf-packed rectangle allocation, a host-visible
//! staging-buffer upload queue, and layout-tracked flush/release (spec.md
//! §4.8).
//!
//! Grounded in shape (not wire format — this crate targets Vulkan, the
//! reference is wgpu-based) on the shelf/cache split in
//! `other_examples/245f9443_horizonanalytic-lattice__crates-horizon-lattice-render-src-text-glyph_atlas.rs.rs`:
//! a packer that only knows rectangles, a cache keyed by whatever the caller
//! uses to identify a glyph, and upload bookkeeping kept separate from both.

mod shelf;

pub use shelf::{PackError, Rect, ShelfPacker};

use std::collections::HashMap;
use std::hash::Hash;

use ash::vk;

use crate::error::{VkError, VkResult};
use crate::memory::{AllocationStrategy, Allocator, MemoryUsage};
use crate::resources::{BufferCreateOptions, ImageCreateOptions, LayoutTransition, ManagedBuffer, ManagedImage};

pub const DEFAULT_ATLAS_EXTENT: u32 = 512;
pub const DEFAULT_PADDING: u32 = 1;
const MAX_ATLAS_EXTENT: u32 = 4096;

/// Everything the rasterizer callback needs to know about a requested glyph.
#[derive(Debug, Clone, Copy)]
pub struct GlyphMetrics {
    pub width: u32,
    pub height: u32,
    pub advance: f32,
    pub bearing_x: f32,
    pub bearing_y: f32,
}

/// Cached placement and sampling data for one glyph. Cheap to clone so
/// `lookup` and `ensure` can both hand callers an owned copy.
#[derive(Debug, Clone, Copy)]
pub struct GlyphInfo {
    pub rect: Rect,
    pub uv_min: (f32, f32),
    pub uv_max: (f32, f32),
    pub advance: f32,
    pub bearing_x: f32,
    pub bearing_y: f32,
}

struct PendingUpload {
    staging: ManagedBuffer,
    rect: Rect,
}

fn atlas_image_options(extent: u32) -> ImageCreateOptions {
    ImageCreateOptions {
        format: vk::Format::R8_UNORM,
        extent: vk::Extent3D { width: extent, height: extent, depth: 1 },
        usage: vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
        memory_usage: MemoryUsage::GpuOnly,
        ..ImageCreateOptions::default()
    }
}

/// Suggests a grown extent: double each axis, capped at 4096, per spec.md
/// §4.8's growth rule.
pub fn suggested_growth_extent(current: vk::Extent2D) -> vk::Extent2D {
    vk::Extent2D {
        width: (current.width.saturating_mul(2)).min(MAX_ATLAS_EXTENT),
        height: (current.height.saturating_mul(2)).min(MAX_ATLAS_EXTENT),
    }
}

pub struct GlyphAtlas<K> {
    image: ManagedImage,
    packer: ShelfPacker,
    padding: u32,
    glyphs: HashMap<K, GlyphInfo>,
    pending: Vec<PendingUpload>,
    in_flight: Vec<ManagedBuffer>,
}

impl<K: Eq + Hash + Clone> GlyphAtlas<K> {
    pub fn create(device: &ash::Device, allocator: &Allocator, extent: u32, padding: u32) -> VkResult<Self> {
        let mut image = ManagedImage::create(device, allocator, &atlas_image_options(extent))?;
        if let Err(e) = image.create_view(device, vk::ImageAspectFlags::COLOR) {
            unsafe { image.destroy(device, allocator) };
            return Err(e);
        }
        tracing::info!(target: "zeus_vk::glyph_atlas", extent, padding, "glyph atlas created");
        Ok(Self {
            image,
            packer: ShelfPacker::new(extent, extent, padding),
            padding,
            glyphs: HashMap::new(),
            pending: Vec::new(),
            in_flight: Vec::new(),
        })
    }

    pub fn view(&self) -> vk::ImageView {
        self.image.view().expect("the atlas image always has a view after create()/resize()")
    }

    pub fn extent(&self) -> vk::Extent2D {
        vk::Extent2D { width: self.packer.atlas_width(), height: self.packer.atlas_height() }
    }

    pub fn lookup(&self, key: &K) -> Option<GlyphInfo> {
        self.glyphs.get(key).copied()
    }

    /// Returns the cached glyph, or rasterizes and stages a new one. `rasterize`
    /// fills exactly `metrics.width * metrics.height` single-channel bytes;
    /// `on_grow`, if given, is invoked with a suggested new extent when the
    /// atlas has run out of room and must construct a replacement image.
    pub fn ensure<F, G>(
        &mut self,
        device: &ash::Device,
        allocator: &Allocator,
        key: K,
        metrics: GlyphMetrics,
        rasterize: F,
        mut on_grow: Option<G>,
    ) -> VkResult<GlyphInfo>
    where
        F: FnOnce(&mut [u8]) -> VkResult<()>,
        G: FnMut(vk::Extent2D) -> VkResult<ManagedImage>,
    {
        if let Some(info) = self.glyphs.get(&key) {
            return Ok(*info);
        }

        let rect = match self.packer.reserve(metrics.width, metrics.height) {
            Ok(rect) => rect,
            Err(PackError::DoesNotFit) => return Err(VkError::FeatureNotPresent),
            Err(PackError::NeedsGrowth) => {
                let grow = on_grow.as_mut().ok_or(VkError::FeatureNotPresent)?;
                let suggested = suggested_growth_extent(self.extent());
                let new_image = grow(suggested)?;
                self.resize(device, allocator, new_image)?;
                self.packer
                    .reserve(metrics.width, metrics.height)
                    .map_err(|_| VkError::FeatureNotPresent)?
            }
        };

        let byte_len = (metrics.width as usize) * (metrics.height as usize);
        let staging = ManagedBuffer::create(
            device,
            allocator,
            &BufferCreateOptions {
                size: byte_len as u64,
                usage: vk::BufferUsageFlags::TRANSFER_SRC,
                strategy: AllocationStrategy::FirstFit,
                ..BufferCreateOptions::default()
            },
        )?;
        let ptr = staging.mapped_ptr().ok_or(VkError::MemoryMapFailed)?;
        let slice = unsafe { std::slice::from_raw_parts_mut(ptr, byte_len) };
        rasterize(slice)?;

        let atlas_extent = self.extent();
        let uv_min = (rect.x as f32 / atlas_extent.width as f32, rect.y as f32 / atlas_extent.height as f32);
        let uv_max = (
            (rect.x + rect.width) as f32 / atlas_extent.width as f32,
            (rect.y + rect.height) as f32 / atlas_extent.height as f32,
        );
        let info = GlyphInfo {
            rect,
            uv_min,
            uv_max,
            advance: metrics.advance,
            bearing_x: metrics.bearing_x,
            bearing_y: metrics.bearing_y,
        };

        self.pending.push(PendingUpload { staging, rect });
        self.glyphs.insert(key, info);
        tracing::debug!(target: "zeus_vk::glyph_atlas", x = rect.x, y = rect.y, w = rect.width, h = rect.height, "glyph staged");
        Ok(info)
    }

    /// Swaps in a larger atlas image, invalidating every cached glyph.
    pub fn resize(&mut self, device: &ash::Device, allocator: &Allocator, mut new_image: ManagedImage) -> VkResult<()> {
        let new_extent = new_image.extent();
        if let Err(e) = new_image.create_view(device, vk::ImageAspectFlags::COLOR) {
            unsafe { new_image.destroy(device, allocator) };
            return Err(e);
        }

        let mut old_image = std::mem::replace(&mut self.image, new_image);
        unsafe { old_image.destroy(device, allocator) };
        self.packer.reset(new_extent.width, new_extent.height);
        self.glyphs.clear();
        tracing::info!(target: "zeus_vk::glyph_atlas", width = new_extent.width, height = new_extent.height, "glyph atlas resized; cache invalidated");
        Ok(())
    }

    /// Transitions the atlas to `TRANSFER_DST_OPTIMAL`, copies every pending
    /// staging buffer into it, and transitions back to
    /// `SHADER_READ_ONLY_OPTIMAL`. Returns `false` (no-op, no barriers
    /// recorded) if nothing was pending.
    pub fn flush_uploads(&mut self, device: &ash::Device, command_buffer: vk::CommandBuffer) -> VkResult<bool> {
        if self.pending.is_empty() {
            return Ok(false);
        }

        let to_transfer_override = (self.image.current_layout() == vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL).then_some(LayoutTransition {
            src_access_mask: vk::AccessFlags::SHADER_READ,
            dst_access_mask: vk::AccessFlags::TRANSFER_WRITE,
            src_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
            dst_stage: vk::PipelineStageFlags::TRANSFER,
        });
        self.image.ensure_layout(
            device,
            command_buffer,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageAspectFlags::COLOR,
            to_transfer_override,
        )?;

        for upload in self.pending.drain(..) {
            let region = vk::BufferImageCopy {
                buffer_offset: 0,
                buffer_row_length: upload.rect.width,
                buffer_image_height: upload.rect.height,
                image_subresource: vk::ImageSubresourceLayers {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    mip_level: 0,
                    base_array_layer: 0,
                    layer_count: 1,
                },
                image_offset: vk::Offset3D { x: upload.rect.x as i32, y: upload.rect.y as i32, z: 0 },
                image_extent: vk::Extent3D { width: upload.rect.width, height: upload.rect.height, depth: 1 },
            };
            unsafe {
                device.cmd_copy_buffer_to_image(
                    command_buffer,
                    upload.staging.raw(),
                    self.image.raw(),
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[region],
                );
            }
            self.in_flight.push(upload.staging);
        }

        self.image.ensure_layout(
            device,
            command_buffer,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::ImageAspectFlags::COLOR,
            None,
        )?;

        tracing::debug!(target: "zeus_vk::glyph_atlas", uploads = self.in_flight.len(), "glyph atlas uploads flushed");
        Ok(true)
    }

    /// Destroys staging buffers left over from a previous frame's
    /// `flush_uploads`. Callers must only call this after that frame's fence
    /// has signaled.
    pub fn release_uploads(&mut self, device: &ash::Device, allocator: &Allocator) {
        for mut staging in self.in_flight.drain(..) {
            unsafe { staging.destroy(device, allocator) };
        }
    }

    /// # Safety
    /// No command buffer referencing the atlas image or view may still be
    /// pending, and `release_uploads` must have drained the in-flight queue.
    pub unsafe fn destroy(&mut self, device: &ash::Device, allocator: &Allocator) {
        unsafe {
            self.image.destroy(device, allocator);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suggested_growth_doubles_each_axis_and_caps_at_4096() {
        let next = suggested_growth_extent(vk::Extent2D { width: 512, height: 512 });
        assert_eq!(next, vk::Extent2D { width: 1024, height: 1024 });
        let capped = suggested_growth_extent(vk::Extent2D { width: 3000, height: 4000 });
        assert_eq!(capped, vk::Extent2D { width: 4096, height: 4096 });
    }

    #[test]
    fn uv_coordinates_from_a_known_rect_stay_within_unit_range() {
        let atlas_extent = 512.0_f32;
        let rect = Rect { x: 1, y: 1, width: 16, height: 16 };
        let uv_min = (rect.x as f32 / atlas_extent, rect.y as f32 / atlas_extent);
        let uv_max = ((rect.x + rect.width) as f32 / atlas_extent, (rect.y + rect.height) as f32 / atlas_extent);
        for v in [uv_min.0, uv_min.1, uv_max.0, uv_max.1] {
            assert!((0.0..=1.0).contains(&v));
        }
    }

    #[test]
    fn default_extent_and_padding_match_the_documented_defaults() {
        assert_eq!(DEFAULT_ATLAS_EXTENT, 512);
        assert_eq!(DEFAULT_PADDING, 1);
    }
}
