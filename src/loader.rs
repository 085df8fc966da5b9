//! Library discovery and three-tier dispatch resolution.
//!
//! `Loader` owns the dynamic-library handle (via `ash::Entry`, which wraps
//! `libloading` under its `loaded` feature — the ecosystem-standard way to
//! resolve `vkGetInstanceProcAddr` rather than hand-rolling `dlopen`/`dlsym`
//! calls). [`GlobalDispatch`], [`InstanceDispatch`], and [`DeviceDispatch`]
//! are the three flat records spec.md §3/§4.1 describes: global (creation,
//! enumeration), instance (physical-device/surface queries), and device
//! (buffers, images, commands, queues, swapchain, optional display-timing).

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use ash::vk;

use crate::error::{VkError, VkResult};

/// Default library search order per spec.md §6.
pub const DEFAULT_SEARCH_PATHS: &[&str] = &[
    "libvulkan.so.1",
    "libvulkan.so",
    "vulkan-1.dll",
    "libvulkan.dylib",
    "libMoltenVK.dylib",
];

pub struct Loader {
    entry: ash::Entry,
    library_path: PathBuf,
}

impl Loader {
    /// Tries each candidate in order; first success wins. All failures
    /// surface as [`VkError::LibraryNotFound`] carrying every path tried.
    pub fn open<P: AsRef<OsStr>>(search_paths: &[P]) -> VkResult<Self> {
        let mut tried = Vec::with_capacity(search_paths.len());
        for candidate in search_paths {
            let path = PathBuf::from(candidate.as_ref());
            // SAFETY: `load_from` dlopen()s the given path and resolves
            // `vkGetInstanceProcAddr` from it. The crate's contract is that
            // the returned `Entry` is not used past this `Loader`'s lifetime.
            match unsafe { ash::Entry::load_from(candidate) } {
                Ok(entry) => {
                    tracing::info!(target: "zeus_vk::loader", path = %path.display(), "opened Vulkan library");
                    return Ok(Self { entry, library_path: path });
                }
                Err(e) => {
                    tracing::debug!(target: "zeus_vk::loader", path = %path.display(), error = %e, "candidate library failed to load");
                    tried.push(path);
                }
            }
        }
        Err(VkError::LibraryNotFound(tried))
    }

    /// Convenience over [`Self::open`] using the platform default search
    /// order from spec.md §6.
    pub fn open_default() -> VkResult<Self> {
        Self::open(DEFAULT_SEARCH_PATHS)
    }

    pub fn library_path(&self) -> &Path {
        &self.library_path
    }

    pub fn entry(&self) -> &ash::Entry {
        &self.entry
    }

    /// The global dispatch table. Always succeeds once `open` has: `ash`
    /// would have failed the load itself had `vkGetInstanceProcAddr` not
    /// resolved.
    pub fn resolve_global(&self) -> VkResult<GlobalDispatch<'_>> {
        Ok(GlobalDispatch { entry: &self.entry })
    }

    /// Builds the per-instance dispatch table. `surface_ext`/`debug_ext`
    /// reflect whether the corresponding extensions were enabled at
    /// instance creation — both are optional and absence is not an error.
    pub fn resolve_instance(
        &self,
        instance: &ash::Instance,
        surface_enabled: bool,
        debug_utils_enabled: bool,
    ) -> InstanceDispatch {
        let surface = surface_enabled.then(|| ash::khr::surface::Instance::new(&self.entry, instance));
        let debug_utils =
            debug_utils_enabled.then(|| ash::ext::debug_utils::Instance::new(&self.entry, instance));
        InstanceDispatch {
            instance: instance.clone(),
            surface,
            debug_utils,
        }
    }

    /// Builds the per-device dispatch table. The display-timing entries
    /// are genuinely optional on most drivers: absence sets the field to
    /// `None` rather than failing resolution.
    pub fn resolve_device(
        &self,
        instance: &ash::Instance,
        device: &ash::Device,
        swapchain_enabled: bool,
        display_timing_enabled: bool,
    ) -> DeviceDispatch {
        let swapchain = swapchain_enabled.then(|| ash::khr::swapchain::Device::new(instance, device));
        let display_timing =
            display_timing_enabled.then(|| ash::google::display_timing::Device::new(instance, device));
        DeviceDispatch {
            device: device.clone(),
            swapchain,
            display_timing,
        }
    }
}

/// No-handle dispatch: instance/device creation, global enumeration.
pub struct GlobalDispatch<'a> {
    entry: &'a ash::Entry,
}

impl<'a> GlobalDispatch<'a> {
    pub fn entry(&self) -> &'a ash::Entry {
        self.entry
    }

    pub fn enumerate_instance_extension_properties(&self) -> VkResult<Vec<vk::ExtensionProperties>> {
        unsafe {
            self.entry
                .enumerate_instance_extension_properties(None)
                .map_err(VkError::from)
        }
    }

    pub fn enumerate_instance_layer_properties(&self) -> VkResult<Vec<vk::LayerProperties>> {
        unsafe { self.entry.enumerate_instance_layer_properties().map_err(VkError::from) }
    }
}

/// Per-instance dispatch: physical-device queries, surface queries.
/// `surface`/`debug_utils` are `None` when the corresponding extension was
/// not requested at instance creation.
pub struct InstanceDispatch {
    pub(crate) instance: ash::Instance,
    pub surface: Option<ash::khr::surface::Instance>,
    pub debug_utils: Option<ash::ext::debug_utils::Instance>,
}

impl InstanceDispatch {
    pub fn raw(&self) -> &ash::Instance {
        &self.instance
    }

    pub fn has_surface_support_query(&self) -> bool {
        self.surface.is_some()
    }

    pub fn has_debug_utils(&self) -> bool {
        self.debug_utils.is_some()
    }
}

/// Per-device dispatch: buffers, images, commands, queues, swapchain, and
/// the optional `VK_GOOGLE_display_timing` entries.
pub struct DeviceDispatch {
    pub(crate) device: ash::Device,
    pub swapchain: Option<ash::khr::swapchain::Device>,
    pub display_timing: Option<ash::google::display_timing::Device>,
}

impl DeviceDispatch {
    pub fn raw(&self) -> &ash::Device {
        &self.device
    }

    pub fn has_swapchain(&self) -> bool {
        self.swapchain.is_some()
    }

    /// Capability predicate for the optional display-timing extension —
    /// queried, never assumed. A caller attempting display-timing calls
    /// when this is `false` gets `FeatureNotPresent`, not a panic.
    pub fn has_display_timing(&self) -> bool {
        self.display_timing.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_with_no_valid_candidates_reports_every_path_tried() {
        let candidates = ["/nonexistent/libvulkan.so.1", "/also/missing/libvulkan.so"];
        let err = Loader::open(&candidates).unwrap_err();
        match err {
            VkError::LibraryNotFound(paths) => {
                assert_eq!(paths.len(), 2);
                assert_eq!(paths[0], PathBuf::from(candidates[0]));
                assert_eq!(paths[1], PathBuf::from(candidates[1]));
            }
            other => panic!("expected LibraryNotFound, got {other:?}"),
        }
    }

    #[test]
    fn default_search_paths_match_spec_order() {
        assert_eq!(
            DEFAULT_SEARCH_PATHS,
            &["libvulkan.so.1", "libvulkan.so", "vulkan-1.dll", "libvulkan.dylib", "libMoltenVK.dylib"]
        );
    }
}
