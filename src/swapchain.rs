//! Swapchain lifecycle, present-mode selection, status mapping, and the
//! optional `VK_GOOGLE_display_timing` extension (spec.md §4.6).

use ash::vk;

use crate::error::{VkError, VkResult};
use crate::loader::DeviceDispatch;

/// `SUCCESS` / `SUBOPTIMAL_KHR` / `ERROR_OUT_OF_DATE_KHR` re-classified at
/// the swapchain boundary, per spec.md §7: everywhere else these three
/// values are errors, but `acquire_next_image`/`present` hand callers a
/// status instead of forcing them through the error path for a routine
/// resize signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentStatus {
    Success,
    Suboptimal,
    OutOfDate,
}

impl PresentStatus {
    fn from_suboptimal_flag(suboptimal: bool) -> Self {
        if suboptimal {
            PresentStatus::Suboptimal
        } else {
            PresentStatus::Success
        }
    }

    fn from_vk_result(result: vk::Result) -> VkResult<Self> {
        match result {
            vk::Result::SUCCESS => Ok(PresentStatus::Success),
            vk::Result::SUBOPTIMAL_KHR => Ok(PresentStatus::Suboptimal),
            vk::Result::ERROR_OUT_OF_DATE_KHR => Ok(PresentStatus::OutOfDate),
            other => Err(VkError::from_vk_result(other)),
        }
    }
}

/// A single frame's display-timing request: the present id to tag and the
/// desired present time in the compositor's clock domain.
#[derive(Debug, Clone, Copy)]
pub struct PresentTimingRequest {
    pub present_id: u32,
    pub desired_present_time: u64,
}

pub struct SwapchainCreateOptions {
    pub surface: vk::SurfaceKHR,
    pub format: vk::Format,
    pub color_space: vk::ColorSpaceKHR,
    pub extent: vk::Extent2D,
    pub image_usage: vk::ImageUsageFlags,
    pub min_image_count: u32,
    pub image_array_layers: u32,
    pub present_mode: vk::PresentModeKHR,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
    pub composite_alpha: vk::CompositeAlphaFlagsKHR,
    pub queue_family_indices: Option<Vec<u32>>,
}

impl Default for SwapchainCreateOptions {
    fn default() -> Self {
        Self {
            surface: vk::SurfaceKHR::null(),
            format: vk::Format::B8G8R8A8_SRGB,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            extent: vk::Extent2D { width: 0, height: 0 },
            image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            min_image_count: 2,
            image_array_layers: 1,
            present_mode: vk::PresentModeKHR::FIFO,
            pre_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
            queue_family_indices: None,
        }
    }
}

pub struct Swapchain {
    raw: vk::SwapchainKHR,
    surface: vk::SurfaceKHR,
    format: vk::Format,
    color_space: vk::ColorSpaceKHR,
    extent: vk::Extent2D,
    image_array_layers: u32,
    present_mode: vk::PresentModeKHR,
    images: Vec<vk::Image>,
    destroyed: bool,
}

impl Swapchain {
    pub fn create(dispatch: &DeviceDispatch, opts: &SwapchainCreateOptions, old_swapchain: Option<vk::SwapchainKHR>) -> VkResult<Self> {
        let swapchain_ext = dispatch
            .swapchain
            .as_ref()
            .ok_or_else(|| VkError::ExtensionNotPresent(ash::khr::swapchain::NAME.to_string_lossy().into_owned()))?;

        let (sharing_mode, family_indices): (vk::SharingMode, &[u32]) = match &opts.queue_family_indices {
            Some(indices) if indices.len() > 1 => (vk::SharingMode::CONCURRENT, indices.as_slice()),
            _ => (vk::SharingMode::EXCLUSIVE, &[]),
        };

        let mut create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(opts.surface)
            .min_image_count(opts.min_image_count)
            .image_format(opts.format)
            .image_color_space(opts.color_space)
            .image_extent(opts.extent)
            .image_array_layers(opts.image_array_layers)
            .image_usage(opts.image_usage)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(family_indices)
            .pre_transform(opts.pre_transform)
            .composite_alpha(opts.composite_alpha)
            .present_mode(opts.present_mode)
            .clipped(true);
        if let Some(old) = old_swapchain {
            create_info = create_info.old_swapchain(old);
        }

        let raw = unsafe { swapchain_ext.create_swapchain(&create_info, None) }.map_err(VkError::from)?;
        let images = unsafe { swapchain_ext.get_swapchain_images(raw) }.map_err(VkError::from)?;

        tracing::info!(
            target: "zeus_vk::swapchain",
            images = images.len(),
            extent = ?opts.extent,
            present_mode = ?opts.present_mode,
            "swapchain created"
        );

        Ok(Self {
            raw,
            surface: opts.surface,
            format: opts.format,
            color_space: opts.color_space,
            extent: opts.extent,
            image_array_layers: opts.image_array_layers,
            present_mode: opts.present_mode,
            images,
            destroyed: false,
        })
    }

    /// Re-creates against `opts` (which must carry the same `surface`),
    /// passing the current handle as `old_swapchain`, then destroys the old
    /// handle only after the new one is live. `self` is left unchanged on
    /// failure so callers can retry with the previous (still-valid) extent.
    pub fn recreate(&mut self, dispatch: &DeviceDispatch, opts: &SwapchainCreateOptions) -> VkResult<()> {
        let old_raw = self.raw;
        let new = Self::create(dispatch, opts, Some(old_raw))?;
        if let Some(swapchain_ext) = dispatch.swapchain.as_ref() {
            unsafe { swapchain_ext.destroy_swapchain(old_raw, None) };
        }
        *self = new;
        Ok(())
    }

    pub fn raw(&self) -> vk::SwapchainKHR {
        self.raw
    }

    pub fn surface(&self) -> vk::SurfaceKHR {
        self.surface
    }

    pub fn format(&self) -> vk::Format {
        self.format
    }

    pub fn color_space(&self) -> vk::ColorSpaceKHR {
        self.color_space
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    /// Only `SUBOPTIMAL_KHR` and `ERROR_OUT_OF_DATE_KHR` are non-errors here;
    /// any other non-success result propagates as a driver error.
    pub fn acquire_next_image(
        &self,
        dispatch: &DeviceDispatch,
        timeout_ns: u64,
        semaphore: vk::Semaphore,
        fence: vk::Fence,
    ) -> VkResult<(u32, PresentStatus)> {
        let swapchain_ext = dispatch
            .swapchain
            .as_ref()
            .ok_or_else(|| VkError::ExtensionNotPresent(ash::khr::swapchain::NAME.to_string_lossy().into_owned()))?;
        match unsafe { swapchain_ext.acquire_next_image(self.raw, timeout_ns, semaphore, fence) } {
            Ok((index, suboptimal)) => Ok((index, PresentStatus::from_suboptimal_flag(suboptimal))),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok((0, PresentStatus::OutOfDate)),
            Err(e) => Err(VkError::from(e)),
        }
    }

    /// Presents `image_index`. If `timing` is supplied but the display-timing
    /// extension was not resolved on this device, fails with
    /// [`VkError::FeatureNotPresent`] *before* calling `vkQueuePresentKHR` —
    /// spec.md §8 scenario 4 requires the underlying present call is never
    /// issued in that case.
    pub fn present(
        &self,
        dispatch: &DeviceDispatch,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphores: &[vk::Semaphore],
        timing: Option<PresentTimingRequest>,
    ) -> VkResult<PresentStatus> {
        let swapchain_ext = dispatch
            .swapchain
            .as_ref()
            .ok_or_else(|| VkError::ExtensionNotPresent(ash::khr::swapchain::NAME.to_string_lossy().into_owned()))?;

        if timing.is_some() && dispatch.display_timing.is_none() {
            return Err(VkError::FeatureNotPresent);
        }

        let swapchains = [self.raw];
        let indices = [image_index];
        let mut present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&indices);

        let present_times = timing.map(|t| {
            [vk::PresentTimeGOOGLE { present_id: t.present_id, desired_present_time: t.desired_present_time }]
        });
        let mut timing_info;
        if let Some(times) = present_times.as_ref() {
            timing_info = vk::PresentTimesInfoGOOGLE::default().times(times);
            present_info = present_info.push_next(&mut timing_info);
        }

        match unsafe { swapchain_ext.queue_present(queue, &present_info) } {
            Ok(suboptimal) => Ok(PresentStatus::from_suboptimal_flag(suboptimal)),
            Err(e) => PresentStatus::from_vk_result(e),
        }
    }

    /// `None` if display-timing entries were never resolved (the extension
    /// is unavailable); `Some` queries the driver.
    pub fn query_refresh_cycle_duration(&self, dispatch: &DeviceDispatch) -> VkResult<Option<u64>> {
        let Some(display_timing) = dispatch.display_timing.as_ref() else {
            return Ok(None);
        };
        let duration = unsafe { display_timing.get_refresh_cycle_duration_google(self.raw) }.map_err(VkError::from)?;
        Ok(Some(duration.refresh_duration))
    }

    pub fn fetch_past_presentation_timings(
        &self,
        dispatch: &DeviceDispatch,
    ) -> VkResult<Option<Vec<vk::PastPresentationTimingGOOGLE>>> {
        let Some(display_timing) = dispatch.display_timing.as_ref() else {
            return Ok(None);
        };
        let timings = unsafe { display_timing.get_past_presentation_timing_google(self.raw) }.map_err(VkError::from)?;
        Ok(Some(timings))
    }

    /// # Safety
    /// Every image view/framebuffer derived from this swapchain's images
    /// must already be destroyed, and no in-flight present may reference it.
    pub unsafe fn destroy(&mut self, dispatch: &DeviceDispatch) {
        if self.destroyed {
            return;
        }
        if let Some(swapchain_ext) = dispatch.swapchain.as_ref() {
            unsafe { swapchain_ext.destroy_swapchain(self.raw, None) };
        }
        self.destroyed = true;
    }
}

/// Offline present-mode fallback per spec.md §4.6: an exact match wins;
/// otherwise `mailbox` prefers `immediate`, `immediate` prefers `mailbox`,
/// and `fifo_relaxed` falls back to plain `FIFO` — which is always
/// available and is the ultimate fallback for anything else.
pub fn select_present_mode(available: &[vk::PresentModeKHR], preferred: vk::PresentModeKHR) -> vk::PresentModeKHR {
    if available.contains(&preferred) {
        return preferred;
    }
    let fallback_chain: &[vk::PresentModeKHR] = match preferred {
        vk::PresentModeKHR::MAILBOX => &[vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO],
        vk::PresentModeKHR::IMMEDIATE => &[vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::FIFO],
        vk::PresentModeKHR::FIFO_RELAXED => &[vk::PresentModeKHR::FIFO],
        _ => &[vk::PresentModeKHR::FIFO],
    };
    for candidate in fallback_chain {
        if available.contains(candidate) {
            return *candidate;
        }
    }
    vk::PresentModeKHR::FIFO
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn present_status_classifies_the_three_swapchain_values() {
        assert_eq!(PresentStatus::from_vk_result(vk::Result::SUCCESS).unwrap(), PresentStatus::Success);
        assert_eq!(PresentStatus::from_vk_result(vk::Result::SUBOPTIMAL_KHR).unwrap(), PresentStatus::Suboptimal);
        assert_eq!(PresentStatus::from_vk_result(vk::Result::ERROR_OUT_OF_DATE_KHR).unwrap(), PresentStatus::OutOfDate);
        assert!(PresentStatus::from_vk_result(vk::Result::ERROR_DEVICE_LOST).is_err());
    }

    #[test]
    fn select_present_mode_returns_exact_match_when_available() {
        let available = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(select_present_mode(&available, vk::PresentModeKHR::MAILBOX), vk::PresentModeKHR::MAILBOX);
    }

    #[test]
    fn select_present_mode_falls_back_per_table() {
        let available = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE];
        assert_eq!(select_present_mode(&available, vk::PresentModeKHR::MAILBOX), vk::PresentModeKHR::IMMEDIATE);

        let fifo_only = [vk::PresentModeKHR::FIFO];
        assert_eq!(select_present_mode(&fifo_only, vk::PresentModeKHR::MAILBOX), vk::PresentModeKHR::FIFO);
        assert_eq!(select_present_mode(&fifo_only, vk::PresentModeKHR::FIFO_RELAXED), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn select_present_mode_result_is_always_in_the_available_set_when_nonempty() {
        let available = [vk::PresentModeKHR::FIFO];
        let result = select_present_mode(&available, vk::PresentModeKHR::MAILBOX);
        assert!(available.contains(&result));
    }
}
