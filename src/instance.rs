//! Instance lifecycle (spec.md §4.2).

use std::ffi::{c_void, CStr, CString};

use ash::vk;

use crate::error::{VkError, VkResult};
use crate::loader::{GlobalDispatch, InstanceDispatch, Loader};

/// Parameters for [`Instance::create`]. Mirrors the teacher's pattern of
/// passing explicit owned strings through to `vk::ApplicationInfo`/
/// `vk::InstanceCreateInfo` rather than threading raw C strings by hand.
pub struct InstanceCreateOptions<'a> {
    pub application_name: &'a str,
    pub application_version: u32,
    pub engine_name: &'a str,
    pub engine_version: u32,
    pub api_version: u32,
    pub enabled_layers: &'a [&'a str],
    pub enabled_extensions: &'a [&'a str],
    pub enable_debug_messenger: bool,
}

impl Default for InstanceCreateOptions<'_> {
    fn default() -> Self {
        Self {
            application_name: "zeus-vk-app",
            application_version: vk::make_api_version(0, 1, 0, 0),
            engine_name: "zeus-vk",
            engine_version: vk::make_api_version(0, 1, 0, 0),
            api_version: vk::API_VERSION_1_2,
            enabled_layers: &[],
            enabled_extensions: &[],
            enable_debug_messenger: false,
        }
    }
}

pub struct Instance {
    pub(crate) raw: ash::Instance,
    pub(crate) dispatch: InstanceDispatch,
    allocation_callbacks: Option<vk::AllocationCallbacks<'static>>,
    debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
    destroyed: bool,
}

impl Instance {
    pub fn create(loader: &Loader, global: &GlobalDispatch<'_>, opts: &InstanceCreateOptions) -> VkResult<Self> {
        let app_name = CString::new(opts.application_name).unwrap();
        let engine_name = CString::new(opts.engine_name).unwrap();

        let layer_names: Vec<CString> = opts.enabled_layers.iter().map(|s| CString::new(*s).unwrap()).collect();
        let layer_ptrs: Vec<*const i8> = layer_names.iter().map(|c| c.as_ptr()).collect();

        let mut extension_names: Vec<CString> =
            opts.enabled_extensions.iter().map(|s| CString::new(*s).unwrap()).collect();
        let has_debug_utils_ext = opts.enable_debug_messenger
            && opts
                .enabled_extensions
                .iter()
                .any(|e| *e == ash::ext::debug_utils::NAME.to_str().unwrap());
        if opts.enable_debug_messenger && !has_debug_utils_ext {
            extension_names.push(CString::new(ash::ext::debug_utils::NAME.to_bytes()).unwrap());
        }
        let has_surface_ext = opts
            .enabled_extensions
            .iter()
            .any(|e| *e == ash::khr::surface::NAME.to_str().unwrap());
        let extension_ptrs: Vec<*const i8> = extension_names.iter().map(|c| c.as_ptr()).collect();

        let app_info = vk::ApplicationInfo::default()
            .application_name(&app_name)
            .application_version(opts.application_version)
            .engine_name(&engine_name)
            .engine_version(opts.engine_version)
            .api_version(opts.api_version);

        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_layer_names(&layer_ptrs)
            .enabled_extension_names(&extension_ptrs);

        let entry = global.entry();
        let raw = unsafe { entry.create_instance(&create_info, None) }
            .map_err(VkError::InstanceCreationFailed)?;
        tracing::info!(target: "zeus_vk::instance", "vkCreateInstance succeeded");

        let dispatch = loader.resolve_instance(&raw, has_surface_ext, opts.enable_debug_messenger || has_debug_utils_ext);

        let debug_messenger = if opts.enable_debug_messenger {
            match dispatch.debug_utils.as_ref() {
                Some(debug_utils) => {
                    let messenger_info = default_debug_messenger_info();
                    match unsafe { debug_utils.create_debug_utils_messenger(&messenger_info, None) } {
                        Ok(messenger) => Some(messenger),
                        Err(e) => {
                            tracing::warn!(target: "zeus_vk::instance", error = ?e, "failed to create debug messenger");
                            None
                        }
                    }
                }
                None => {
                    tracing::warn!(target: "zeus_vk::instance", "debug messenger requested but VK_EXT_debug_utils unresolvable");
                    None
                }
            }
        } else {
            None
        };

        Ok(Self {
            raw,
            dispatch,
            allocation_callbacks: None,
            debug_messenger,
            destroyed: false,
        })
    }

    pub fn raw(&self) -> &ash::Instance {
        &self.raw
    }

    pub fn dispatch(&self) -> &InstanceDispatch {
        &self.dispatch
    }

    pub fn enumerate_physical_devices(&self) -> VkResult<Vec<vk::PhysicalDevice>> {
        let devices = unsafe { self.raw.enumerate_physical_devices() }.map_err(VkError::from)?;
        if devices.is_empty() {
            return Err(VkError::NoPhysicalDevices);
        }
        Ok(devices)
    }

    pub fn get_queue_family_properties(&self, pd: vk::PhysicalDevice) -> Vec<vk::QueueFamilyProperties> {
        unsafe { self.raw.get_physical_device_queue_family_properties(pd) }
    }

    pub fn get_physical_device_features(&self, pd: vk::PhysicalDevice) -> vk::PhysicalDeviceFeatures {
        unsafe { self.raw.get_physical_device_features(pd) }
    }

    pub fn get_physical_device_properties(&self, pd: vk::PhysicalDevice) -> vk::PhysicalDeviceProperties {
        unsafe { self.raw.get_physical_device_properties(pd) }
    }

    pub fn get_physical_device_memory_properties(
        &self,
        pd: vk::PhysicalDevice,
    ) -> vk::PhysicalDeviceMemoryProperties {
        unsafe { self.raw.get_physical_device_memory_properties(pd) }
    }

    pub fn enumerate_device_extension_properties(
        &self,
        pd: vk::PhysicalDevice,
    ) -> VkResult<Vec<vk::ExtensionProperties>> {
        unsafe { self.raw.enumerate_device_extension_properties(pd) }.map_err(VkError::from)
    }

    pub fn get_physical_device_surface_support(
        &self,
        pd: vk::PhysicalDevice,
        queue_family_index: u32,
        surface: vk::SurfaceKHR,
    ) -> VkResult<bool> {
        let surface_ext = self
            .dispatch
            .surface
            .as_ref()
            .ok_or(VkError::ExtensionNotPresent(ash::khr::surface::NAME.to_string_lossy().into_owned()))?;
        unsafe { surface_ext.get_physical_device_surface_support(pd, queue_family_index, surface) }
            .map_err(VkError::from)
    }

    /// Idempotent: calling `destroy` more than once is a no-op.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        unsafe {
            if let (Some(messenger), Some(debug_utils)) =
                (self.debug_messenger.take(), self.dispatch.debug_utils.as_ref())
            {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.raw.destroy_instance(self.allocation_callbacks.as_ref());
        }
        self.destroyed = true;
        tracing::info!(target: "zeus_vk::instance", "instance destroyed");
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        self.destroy();
    }
}

unsafe extern "system" fn default_debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut c_void,
) -> vk::Bool32 {
    let message = unsafe { CStr::from_ptr((*data).p_message) }.to_string_lossy();
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        tracing::error!(target: "zeus_vk::instance::validation", "{message}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        tracing::warn!(target: "zeus_vk::instance::validation", "{message}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        tracing::info!(target: "zeus_vk::instance::validation", "{message}");
    } else {
        tracing::debug!(target: "zeus_vk::instance::validation", "{message}");
    }
    vk::FALSE
}

fn default_debug_messenger_info<'a>() -> vk::DebugUtilsMessengerCreateInfoEXT<'a> {
    vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::INFO,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(default_debug_callback))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_request_vulkan_1_2() {
        let opts = InstanceCreateOptions::default();
        assert_eq!(opts.api_version, vk::API_VERSION_1_2);
        assert!(!opts.enable_debug_messenger);
    }
}
