//! Logical device creation and the queues resolved for it (spec.md §4.3-4.4).

use std::ffi::CString;

use ash::vk;

use crate::error::{VkError, VkResult};
use crate::instance::Instance;
use crate::loader::{DeviceDispatch, Loader};
use crate::physical_device::Selection;

pub struct DeviceCreateOptions<'a> {
    pub required_extensions: &'a [&'a str],
    pub enabled_features: vk::PhysicalDeviceFeatures,
    pub enable_swapchain: bool,
    pub enable_display_timing: bool,
}

impl Default for DeviceCreateOptions<'_> {
    fn default() -> Self {
        Self {
            required_extensions: &[ash::khr::swapchain::NAME.to_str().unwrap()],
            enabled_features: vk::PhysicalDeviceFeatures::default(),
            enable_swapchain: true,
            enable_display_timing: false,
        }
    }
}

/// The queue handle resolved for a given family, paired with its index so
/// callers can build command pools against the same family.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedQueue {
    pub family_index: u32,
    pub queue: vk::Queue,
}

pub struct Device {
    pub(crate) raw: ash::Device,
    dispatch: DeviceDispatch,
    graphics: Option<ResolvedQueue>,
    present: Option<ResolvedQueue>,
    transfer: Option<ResolvedQueue>,
    compute: Option<ResolvedQueue>,
    destroyed: bool,
}

impl Device {
    /// Builds one `vk::DeviceQueueCreateInfo` per distinct family named in
    /// the selection (graphics/present/transfer/compute commonly alias one
    /// another; each distinct index gets exactly one queue at priority 1.0).
    pub fn create(
        instance: &Instance,
        loader: &Loader,
        selection: &Selection,
        opts: &DeviceCreateOptions,
    ) -> VkResult<Self> {
        let mut families: Vec<u32> = [selection.graphics, selection.present, selection.transfer, selection.compute]
            .into_iter()
            .flatten()
            .collect();
        families.sort_unstable();
        families.dedup();

        const PRIORITY: [f32; 1] = [1.0];
        let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = families
            .iter()
            .map(|&index| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(index)
                    .queue_priorities(&PRIORITY)
            })
            .collect();

        let mut extension_names: Vec<CString> = opts.required_extensions.iter().map(|s| CString::new(*s).unwrap()).collect();
        for optional in &selection.enabled_optional_extensions {
            extension_names.push(CString::new(optional.as_str()).unwrap());
        }
        let extension_ptrs: Vec<*const i8> = extension_names.iter().map(|c| c.as_ptr()).collect();

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extension_ptrs)
            .enabled_features(&opts.enabled_features);

        let raw = unsafe { instance.raw().create_device(selection.physical_device, &create_info, None) }
            .map_err(VkError::DeviceCreationFailed)?;
        tracing::info!(target: "zeus_vk::device", device = %selection.summary(), "vkCreateDevice succeeded");

        let dispatch = loader.resolve_device(instance.raw(), &raw, opts.enable_swapchain, opts.enable_display_timing);

        let queue_for = |index: Option<u32>| {
            index.map(|family_index| ResolvedQueue {
                family_index,
                queue: unsafe { raw.get_device_queue(family_index, 0) },
            })
        };

        Ok(Self {
            raw,
            dispatch,
            graphics: queue_for(selection.graphics),
            present: queue_for(selection.present),
            transfer: queue_for(selection.transfer),
            compute: queue_for(selection.compute),
            destroyed: false,
        })
    }

    pub fn raw(&self) -> &ash::Device {
        &self.raw
    }

    pub fn dispatch(&self) -> &DeviceDispatch {
        &self.dispatch
    }

    pub fn graphics_queue(&self) -> Option<ResolvedQueue> {
        self.graphics
    }

    pub fn present_queue(&self) -> Option<ResolvedQueue> {
        self.present
    }

    pub fn transfer_queue(&self) -> Option<ResolvedQueue> {
        self.transfer
    }

    pub fn compute_queue(&self) -> Option<ResolvedQueue> {
        self.compute
    }

    pub fn wait_idle(&self) -> VkResult<()> {
        unsafe { self.raw.device_wait_idle() }.map_err(VkError::from)
    }

    /// Idempotent; the teacher's `Renderer::cleanup` tears down in reverse
    /// creation order and calls `device_wait_idle` first, which this mirrors.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        if let Err(e) = self.wait_idle() {
            tracing::warn!(target: "zeus_vk::device", error = ?e, "device_wait_idle failed before destroy");
        }
        unsafe {
            self.raw.destroy_device(None);
        }
        self.destroyed = true;
        tracing::info!(target: "zeus_vk::device", "device destroyed");
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_request_swapchain_extension() {
        let opts = DeviceCreateOptions::default();
        assert_eq!(opts.required_extensions, &["VK_KHR_swapchain"]);
        assert!(opts.enable_swapchain);
        assert!(!opts.enable_display_timing);
    }
}
