//! A `vk::Image` bound to an [`Allocation`], with layout-transition helpers.

use ash::vk;

use crate::error::{VkError, VkResult};
use crate::memory::{Allocation, AllocationStrategy, Allocator, MemoryUsage};

pub struct ImageCreateOptions {
    pub image_type: vk::ImageType,
    pub format: vk::Format,
    pub extent: vk::Extent3D,
    pub mip_levels: u32,
    pub array_layers: u32,
    pub samples: vk::SampleCountFlags,
    pub tiling: vk::ImageTiling,
    pub usage: vk::ImageUsageFlags,
    pub memory_usage: MemoryUsage,
    pub strategy: AllocationStrategy,
}

impl Default for ImageCreateOptions {
    fn default() -> Self {
        Self {
            image_type: vk::ImageType::TYPE_2D,
            format: vk::Format::R8G8B8A8_UNORM,
            extent: vk::Extent3D { width: 1, height: 1, depth: 1 },
            mip_levels: 1,
            array_layers: 1,
            samples: vk::SampleCountFlags::TYPE_1,
            tiling: vk::ImageTiling::OPTIMAL,
            usage: vk::ImageUsageFlags::empty(),
            memory_usage: MemoryUsage::GpuOnly,
            strategy: AllocationStrategy::FirstFit,
        }
    }
}

/// Explicit access/stage override for a layout transition the built-in
/// table (see [`transition_barrier`]) does not recognize.
#[derive(Debug, Clone, Copy)]
pub struct LayoutTransition {
    pub src_access_mask: vk::AccessFlags,
    pub dst_access_mask: vk::AccessFlags,
    pub src_stage: vk::PipelineStageFlags,
    pub dst_stage: vk::PipelineStageFlags,
}

pub struct ManagedImage {
    image: vk::Image,
    allocation: Allocation,
    format: vk::Format,
    extent: vk::Extent3D,
    mip_levels: u32,
    array_layers: u32,
    current_layout: vk::ImageLayout,
    view: Option<vk::ImageView>,
    aspect_mask: vk::ImageAspectFlags,
    destroyed: bool,
}

impl ManagedImage {
    pub fn create(device: &ash::Device, allocator: &Allocator, opts: &ImageCreateOptions) -> VkResult<Self> {
        let create_info = vk::ImageCreateInfo::default()
            .image_type(opts.image_type)
            .format(opts.format)
            .extent(opts.extent)
            .mip_levels(opts.mip_levels)
            .array_layers(opts.array_layers)
            .samples(opts.samples)
            .tiling(opts.tiling)
            .usage(opts.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);
        let image = unsafe { device.create_image(&create_info, None) }.map_err(VkError::from)?;
        let requirements = unsafe { device.get_image_memory_requirements(image) };

        let allocation = match allocator.allocate(requirements, opts.memory_usage, opts.strategy, false) {
            Ok(a) => a,
            Err(e) => {
                unsafe { device.destroy_image(image, None) };
                return Err(e);
            }
        };

        if let Err(e) = unsafe { device.bind_image_memory(image, allocation.memory, allocation.offset) } {
            allocator.free(&allocation);
            unsafe { device.destroy_image(image, None) };
            return Err(VkError::from(e));
        }

        Ok(Self {
            image,
            allocation,
            format: opts.format,
            extent: opts.extent,
            mip_levels: opts.mip_levels,
            array_layers: opts.array_layers,
            current_layout: vk::ImageLayout::UNDEFINED,
            view: None,
            aspect_mask: vk::ImageAspectFlags::empty(),
            destroyed: false,
        })
    }

    pub fn raw(&self) -> vk::Image {
        self.image
    }

    pub fn format(&self) -> vk::Format {
        self.format
    }

    pub fn extent(&self) -> vk::Extent3D {
        self.extent
    }

    pub fn current_layout(&self) -> vk::ImageLayout {
        self.current_layout
    }

    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }

    pub fn array_layers(&self) -> u32 {
        self.array_layers
    }

    /// The aspect mask the current [`Self::view`] was created with, or
    /// empty if no view has been created yet.
    pub fn aspect_mask(&self) -> vk::ImageAspectFlags {
        self.aspect_mask
    }

    /// The image's owned view, if [`Self::create_view`] has been called.
    pub fn view(&self) -> Option<vk::ImageView> {
        self.view
    }

    /// Creates the image's view, spanning every mip level and array layer.
    /// Any view already owned by this image is destroyed first, so calling
    /// this again (e.g. after a format change) never leaks the old handle.
    pub fn create_view(&mut self, device: &ash::Device, aspect_mask: vk::ImageAspectFlags) -> VkResult<vk::ImageView> {
        if let Some(old) = self.view.take() {
            unsafe { device.destroy_image_view(old, None) };
        }
        let subresource = vk::ImageSubresourceRange::default()
            .aspect_mask(aspect_mask)
            .base_mip_level(0)
            .level_count(vk::REMAINING_MIP_LEVELS)
            .base_array_layer(0)
            .layer_count(vk::REMAINING_ARRAY_LAYERS);
        let view_info = vk::ImageViewCreateInfo::default()
            .image(self.image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(self.format)
            .subresource_range(subresource);
        let view = unsafe { device.create_image_view(&view_info, None) }.map_err(VkError::from)?;
        self.view = Some(view);
        self.aspect_mask = aspect_mask;
        Ok(view)
    }

    /// Records a pipeline barrier transitioning the image from its current
    /// layout to `new_layout`. The access/stage masks come from the
    /// built-in transition table; unlisted `(old, new)` pairs require an
    /// explicit `override_transition` or fail with
    /// [`VkError::FeatureNotPresent`] rather than guessing at masks.
    pub fn ensure_layout(
        &mut self,
        device: &ash::Device,
        command_buffer: vk::CommandBuffer,
        new_layout: vk::ImageLayout,
        aspect_mask: vk::ImageAspectFlags,
        override_transition: Option<LayoutTransition>,
    ) -> VkResult<()> {
        if self.current_layout == new_layout {
            return Ok(());
        }
        let transition = override_transition
            .or_else(|| transition_barrier(self.current_layout, new_layout))
            .ok_or(VkError::FeatureNotPresent)?;

        let subresource = vk::ImageSubresourceRange::default()
            .aspect_mask(aspect_mask)
            .base_mip_level(0)
            .level_count(vk::REMAINING_MIP_LEVELS)
            .base_array_layer(0)
            .layer_count(vk::REMAINING_ARRAY_LAYERS);
        let barrier = vk::ImageMemoryBarrier::default()
            .old_layout(self.current_layout)
            .new_layout(new_layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(self.image)
            .subresource_range(subresource)
            .src_access_mask(transition.src_access_mask)
            .dst_access_mask(transition.dst_access_mask);

        unsafe {
            device.cmd_pipeline_barrier(
                command_buffer,
                transition.src_stage,
                transition.dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier],
            );
        }
        self.current_layout = new_layout;
        Ok(())
    }

    /// # Safety
    /// The image and any views created from it must not be referenced by
    /// any pending command buffer.
    pub unsafe fn destroy(&mut self, device: &ash::Device, allocator: &Allocator) {
        if self.destroyed {
            return;
        }
        if let Some(view) = self.view.take() {
            unsafe { device.destroy_image_view(view, None) };
        }
        unsafe { device.destroy_image(self.image, None) };
        allocator.free(&self.allocation);
        self.destroyed = true;
    }
}

/// The small set of transitions this crate understands without being told
/// the access/stage masks explicitly: upload-to-shader-read, render-target
/// setup, and presentation handoff.
fn transition_barrier(old: vk::ImageLayout, new: vk::ImageLayout) -> Option<LayoutTransition> {
    use vk::AccessFlags as A;
    use vk::ImageLayout as L;
    use vk::PipelineStageFlags as S;

    match (old, new) {
        (L::UNDEFINED, L::TRANSFER_DST_OPTIMAL) => Some(LayoutTransition {
            src_access_mask: A::empty(),
            dst_access_mask: A::TRANSFER_WRITE,
            src_stage: S::TOP_OF_PIPE,
            dst_stage: S::TRANSFER,
        }),
        (L::TRANSFER_DST_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL) => Some(LayoutTransition {
            src_access_mask: A::TRANSFER_WRITE,
            dst_access_mask: A::SHADER_READ,
            src_stage: S::TRANSFER,
            dst_stage: S::FRAGMENT_SHADER,
        }),
        (L::UNDEFINED, L::COLOR_ATTACHMENT_OPTIMAL) => Some(LayoutTransition {
            src_access_mask: A::empty(),
            dst_access_mask: A::COLOR_ATTACHMENT_WRITE,
            src_stage: S::TOP_OF_PIPE,
            dst_stage: S::COLOR_ATTACHMENT_OUTPUT,
        }),
        (L::UNDEFINED, L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL) => Some(LayoutTransition {
            src_access_mask: A::empty(),
            dst_access_mask: A::DEPTH_STENCIL_ATTACHMENT_READ | A::DEPTH_STENCIL_ATTACHMENT_WRITE,
            src_stage: S::TOP_OF_PIPE,
            dst_stage: S::EARLY_FRAGMENT_TESTS,
        }),
        (L::COLOR_ATTACHMENT_OPTIMAL, L::PRESENT_SRC_KHR) => Some(LayoutTransition {
            src_access_mask: A::COLOR_ATTACHMENT_WRITE,
            dst_access_mask: A::empty(),
            src_stage: S::COLOR_ATTACHMENT_OUTPUT,
            dst_stage: S::BOTTOM_OF_PIPE,
        }),
        (L::UNDEFINED, L::PRESENT_SRC_KHR) => Some(LayoutTransition {
            src_access_mask: A::empty(),
            dst_access_mask: A::empty(),
            src_stage: S::TOP_OF_PIPE,
            dst_stage: S::BOTTOM_OF_PIPE,
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_transitions_resolve_to_nonempty_stage_masks() {
        let t = transition_barrier(vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL).unwrap();
        assert_eq!(t.dst_stage, vk::PipelineStageFlags::TRANSFER);
    }

    #[test]
    fn unlisted_transition_is_none_so_callers_must_override_or_fail() {
        assert!(transition_barrier(vk::ImageLayout::GENERAL, vk::ImageLayout::PREINITIALIZED).is_none());
    }
}
