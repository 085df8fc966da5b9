//! Unified error taxonomy for the crate.
//!
//! Two disjoint kinds are folded into one enum per spec: infrastructure
//! failures (library discovery, device selection, extension negotiation)
//! and driver-reported failures (anything that comes back as a non-success
//! `VkResult`). The central mapper [`VkError::from_vk_result`] is the only
//! place a raw `ash::vk::Result` gets translated; everywhere else callers
//! work with `VkError` directly.

use std::path::PathBuf;

use ash::vk;
use thiserror::Error;

pub type VkResult<T> = Result<T, VkError>;

#[derive(Error, Debug)]
pub enum VkError {
    // --- Infrastructure ---
    #[error("no usable Vulkan library found in search paths: {0:?}")]
    LibraryNotFound(Vec<PathBuf>),
    #[error("required Vulkan symbol could not be resolved: {0}")]
    MissingSymbol(&'static str),
    #[error("requested instance layer not present: {0}")]
    LayerNotPresent(String),
    #[error("requested extension not present: {0}")]
    ExtensionNotPresent(String),
    #[error("no physical devices reported by the instance")]
    NoPhysicalDevices,
    #[error("no queue family satisfies the requested capability")]
    QueueFamilyNotFound,
    #[error("vkCreateInstance failed: {0:?}")]
    InstanceCreationFailed(vk::Result),
    #[error("vkCreateDevice failed: {0:?}")]
    DeviceCreationFailed(vk::Result),
    #[error("debug messenger unavailable: VK_EXT_debug_utils not resolvable")]
    DebugMessengerUnavailable,
    #[error("no physical device satisfies the requirements")]
    SuitableDeviceNotFound,

    // --- Driver ---
    #[error("driver reported NOT_READY")]
    NotReady,
    #[error("operation timed out")]
    Timeout,
    #[error("driver reported EVENT_SET")]
    EventSet,
    #[error("driver reported EVENT_RESET")]
    EventReset,
    #[error("driver reported INCOMPLETE")]
    Incomplete,
    #[error("out of host memory")]
    OutOfHostMemory,
    #[error("out of device memory")]
    OutOfDeviceMemory,
    #[error("driver initialization failed")]
    InitializationFailed,
    #[error("device lost")]
    DeviceLost,
    #[error("memory map failed")]
    MemoryMapFailed,
    #[error("required feature not present")]
    FeatureNotPresent,
    #[error("incompatible driver")]
    IncompatibleDriver,
    #[error("too many objects of this type already allocated")]
    TooManyObjects,
    #[error("requested format not supported")]
    FormatNotSupported,
    #[error("descriptor pool fragmented")]
    FragmentedPool,
    #[error("swapchain out of date")]
    OutOfDate,
    #[error("surface lost")]
    SurfaceLost,
    #[error("unknown driver error: {0:?}")]
    Unknown(vk::Result),
}

impl VkError {
    /// Classifies a raw `vk::Result`. `SUCCESS` is not representable here —
    /// callers check for it before reaching for this mapper. `SUBOPTIMAL_KHR`
    /// and `ERROR_OUT_OF_DATE_KHR` are deliberately classified like any other
    /// driver result; the swapchain boundary re-interprets them into
    /// [`crate::swapchain::PresentStatus`] before they would ever reach here.
    pub fn from_vk_result(result: vk::Result) -> Self {
        match result {
            vk::Result::NOT_READY => VkError::NotReady,
            vk::Result::TIMEOUT => VkError::Timeout,
            vk::Result::EVENT_SET => VkError::EventSet,
            vk::Result::EVENT_RESET => VkError::EventReset,
            vk::Result::INCOMPLETE => VkError::Incomplete,
            vk::Result::ERROR_OUT_OF_HOST_MEMORY => VkError::OutOfHostMemory,
            vk::Result::ERROR_OUT_OF_DEVICE_MEMORY => VkError::OutOfDeviceMemory,
            vk::Result::ERROR_INITIALIZATION_FAILED => VkError::InitializationFailed,
            vk::Result::ERROR_DEVICE_LOST => VkError::DeviceLost,
            vk::Result::ERROR_MEMORY_MAP_FAILED => VkError::MemoryMapFailed,
            vk::Result::ERROR_LAYER_NOT_PRESENT => VkError::LayerNotPresent(String::new()),
            vk::Result::ERROR_EXTENSION_NOT_PRESENT => VkError::ExtensionNotPresent(String::new()),
            vk::Result::ERROR_FEATURE_NOT_PRESENT => VkError::FeatureNotPresent,
            vk::Result::ERROR_INCOMPATIBLE_DRIVER => VkError::IncompatibleDriver,
            vk::Result::ERROR_TOO_MANY_OBJECTS => VkError::TooManyObjects,
            vk::Result::ERROR_FORMAT_NOT_SUPPORTED => VkError::FormatNotSupported,
            vk::Result::ERROR_FRAGMENTED_POOL => VkError::FragmentedPool,
            vk::Result::ERROR_SURFACE_LOST_KHR => VkError::SurfaceLost,
            vk::Result::ERROR_OUT_OF_DATE_KHR => VkError::OutOfDate,
            other => VkError::Unknown(other),
        }
    }

    /// `Ok(())` on `SUCCESS`, the classified error otherwise. This is the
    /// "central mapper" referenced throughout spec.md §7: every raw Vulkan
    /// call result not already wrapped by `ash`'s own `Result<T, vk::Result>`
    /// return type should be funneled through here.
    pub fn ensure_success(result: vk::Result) -> VkResult<()> {
        if result == vk::Result::SUCCESS {
            Ok(())
        } else {
            Err(VkError::from_vk_result(result))
        }
    }
}

impl From<vk::Result> for VkError {
    fn from(result: vk::Result) -> Self {
        VkError::from_vk_result(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_success_roundtrips_every_non_success_result() {
        let cases = [
            vk::Result::NOT_READY,
            vk::Result::TIMEOUT,
            vk::Result::ERROR_OUT_OF_DEVICE_MEMORY,
            vk::Result::ERROR_DEVICE_LOST,
            vk::Result::ERROR_SURFACE_LOST_KHR,
            vk::Result::ERROR_OUT_OF_DATE_KHR,
        ];
        for case in cases {
            let err = VkError::ensure_success(case).unwrap_err();
            let reconstructed = VkError::from_vk_result(case);
            assert_eq!(format!("{err}"), format!("{reconstructed}"));
        }
    }

    #[test]
    fn ensure_success_succeeds_on_success() {
        assert!(VkError::ensure_success(vk::Result::SUCCESS).is_ok());
    }
}
