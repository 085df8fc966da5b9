//! Fence and semaphore wrappers, including binary-vs-timeline discrimination
//! (spec.md §4.6).

use ash::vk;

use crate::error::{VkError, VkResult};

pub struct Fence {
    raw: vk::Fence,
    destroyed: bool,
}

impl Fence {
    pub fn create(device: &ash::Device, signaled: bool) -> VkResult<Self> {
        let flags = if signaled { vk::FenceCreateFlags::SIGNALED } else { vk::FenceCreateFlags::empty() };
        let info = vk::FenceCreateInfo::default().flags(flags);
        let raw = unsafe { device.create_fence(&info, None) }.map_err(VkError::from)?;
        Ok(Self { raw, destroyed: false })
    }

    pub fn raw(&self) -> vk::Fence {
        self.raw
    }

    pub fn wait(&self, device: &ash::Device, timeout_ns: u64) -> VkResult<()> {
        unsafe { device.wait_for_fences(&[self.raw], true, timeout_ns) }.map_err(VkError::from)
    }

    pub fn reset(&self, device: &ash::Device) -> VkResult<()> {
        unsafe { device.reset_fences(&[self.raw]) }.map_err(VkError::from)
    }

    pub fn is_signaled(&self, device: &ash::Device) -> VkResult<bool> {
        match unsafe { device.get_fence_status(self.raw) } {
            Ok(()) => Ok(true),
            Err(vk::Result::NOT_READY) => Ok(false),
            Err(e) => Err(VkError::from(e)),
        }
    }

    /// # Safety
    /// The fence must not be referenced by a pending submission.
    pub unsafe fn destroy(&mut self, device: &ash::Device) {
        if self.destroyed {
            return;
        }
        unsafe { device.destroy_fence(self.raw, None) };
        self.destroyed = true;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SemaphoreKind {
    Binary,
    Timeline,
}

pub struct Semaphore {
    raw: vk::Semaphore,
    kind: SemaphoreKind,
    destroyed: bool,
}

impl Semaphore {
    pub fn create_binary(device: &ash::Device) -> VkResult<Self> {
        let info = vk::SemaphoreCreateInfo::default();
        let raw = unsafe { device.create_semaphore(&info, None) }.map_err(VkError::from)?;
        Ok(Self { raw, kind: SemaphoreKind::Binary, destroyed: false })
    }

    pub fn create_timeline(device: &ash::Device, initial_value: u64) -> VkResult<Self> {
        let mut type_info = vk::SemaphoreTypeCreateInfo::default()
            .semaphore_type(vk::SemaphoreType::TIMELINE)
            .initial_value(initial_value);
        let info = vk::SemaphoreCreateInfo::default().push_next(&mut type_info);
        let raw = unsafe { device.create_semaphore(&info, None) }.map_err(VkError::from)?;
        Ok(Self { raw, kind: SemaphoreKind::Timeline, destroyed: false })
    }

    pub fn raw(&self) -> vk::Semaphore {
        self.raw
    }

    pub fn kind(&self) -> SemaphoreKind {
        self.kind
    }

    /// Queries the current counter value. Only valid for timeline
    /// semaphores; binary semaphores fail with
    /// [`VkError::FeatureNotPresent`] rather than returning a meaningless 0.
    pub fn timeline_value(&self, device: &ash::Device) -> VkResult<u64> {
        if self.kind != SemaphoreKind::Timeline {
            return Err(VkError::FeatureNotPresent);
        }
        unsafe { device.get_semaphore_counter_value(self.raw) }.map_err(VkError::from)
    }

    /// Host-side signal of a timeline semaphore's counter.
    pub fn signal_timeline(&self, device: &ash::Device, value: u64) -> VkResult<()> {
        if self.kind != SemaphoreKind::Timeline {
            return Err(VkError::FeatureNotPresent);
        }
        let signal_info = vk::SemaphoreSignalInfo::default().semaphore(self.raw).value(value);
        unsafe { device.signal_semaphore(&signal_info) }.map_err(VkError::from)
    }

    /// Blocks until the timeline counter reaches `value`.
    pub fn wait_timeline(&self, device: &ash::Device, value: u64, timeout_ns: u64) -> VkResult<()> {
        if self.kind != SemaphoreKind::Timeline {
            return Err(VkError::FeatureNotPresent);
        }
        let semaphores = [self.raw];
        let values = [value];
        let wait_info = vk::SemaphoreWaitInfo::default().semaphores(&semaphores).values(&values);
        unsafe { device.wait_semaphores(&wait_info, timeout_ns) }.map_err(VkError::from)
    }

    /// # Safety
    /// The semaphore must not be referenced by a pending submission.
    pub unsafe fn destroy(&mut self, device: &ash::Device) {
        if self.destroyed {
            return;
        }
        unsafe { device.destroy_semaphore(self.raw, None) };
        self.destroyed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn semaphore_kind_is_tracked_at_construction_time() {
        assert_ne!(SemaphoreKind::Binary, SemaphoreKind::Timeline);
    }
}
