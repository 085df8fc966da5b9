//! Physical-device selection: requirements matching, scoring, queue-family
//! negotiation, and ReBAR detection (spec.md §4.3).

use ash::vk;

use crate::error::{VkError, VkResult};
use crate::instance::Instance;

const REBAR_HEAP_THRESHOLD_BYTES: u64 = 256 * 1024 * 1024;

#[derive(Debug, Clone, Copy, Default)]
pub struct QueueNeeds {
    pub require_graphics: bool,
    pub require_transfer: bool,
    pub require_compute: bool,
    pub prefer_dedicated_transfer: bool,
    pub prefer_dedicated_compute: bool,
}

pub struct Requirements<'a> {
    pub required_extensions: &'a [&'a str],
    pub optional_extensions: &'a [&'a str],
    /// Only the `true` fields are checked against the candidate's supported
    /// features; `false`/default fields are ignored per spec.md §4.3 step 2.
    pub required_features: Option<vk::PhysicalDeviceFeatures>,
    pub queue_needs: QueueNeeds,
    pub surface: Option<vk::SurfaceKHR>,
    pub prefer_discrete: bool,
}

impl Default for Requirements<'_> {
    fn default() -> Self {
        Self {
            required_extensions: &[],
            optional_extensions: &[],
            required_features: None,
            queue_needs: QueueNeeds::default(),
            surface: None,
            prefer_discrete: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Selection {
    pub physical_device: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,
    pub features: vk::PhysicalDeviceFeatures,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub graphics: Option<u32>,
    pub present: Option<u32>,
    pub transfer: Option<u32>,
    pub compute: Option<u32>,
    pub enabled_optional_extensions: Vec<String>,
    pub score: i64,
    pub has_rebar: bool,
}

impl Selection {
    /// One-line summary for the teacher's habit of `info!`-logging the
    /// selected device at startup (`render_engine.rs`, `pipeline_manager.rs`).
    pub fn summary(&self) -> String {
        let name = self
            .properties
            .device_name_as_c_str()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "<invalid device name>".to_string());
        format!(
            "{name} (type={:?}, score={}, rebar={})",
            self.properties.device_type, self.score, self.has_rebar
        )
    }
}

/// Runs `selectBest`: enumerates, evaluates, and returns the highest-scoring
/// candidate. An empty candidate pool (after rejection) surfaces as
/// [`VkError::SuitableDeviceNotFound`]; a literally empty instance
/// enumeration surfaces earlier as [`VkError::NoPhysicalDevices`] from
/// [`Instance::enumerate_physical_devices`].
pub fn select_best(instance: &Instance, requirements: &Requirements) -> VkResult<Selection> {
    let candidates = instance.enumerate_physical_devices()?;
    let mut best: Option<Selection> = None;
    for pd in candidates {
        match evaluate_device(instance, pd, requirements) {
            Some(selection) => {
                tracing::debug!(target: "zeus_vk::physical_device", candidate = %selection.summary(), "candidate accepted");
                let replace = match &best {
                    Some(current) => selection.score > current.score,
                    None => true,
                };
                if replace {
                    best = Some(selection);
                }
            }
            None => {
                tracing::debug!(target: "zeus_vk::physical_device", "candidate rejected");
            }
        }
    }
    best.ok_or(VkError::SuitableDeviceNotFound)
}

fn evaluate_device(instance: &Instance, pd: vk::PhysicalDevice, requirements: &Requirements) -> Option<Selection> {
    let properties = instance.get_physical_device_properties(pd);
    let features = instance.get_physical_device_features(pd);
    let memory_properties = instance.get_physical_device_memory_properties(pd);

    let available_extensions = instance.enumerate_device_extension_properties(pd).ok()?;
    let available_names: Vec<String> = available_extensions
        .iter()
        .filter_map(|e| e.extension_name_as_c_str().ok().map(|c| c.to_string_lossy().into_owned()))
        .collect();

    for required in requirements.required_extensions {
        if !available_names.iter().any(|a| a == required) {
            return None;
        }
    }
    let enabled_optional_extensions: Vec<String> = requirements
        .optional_extensions
        .iter()
        .filter(|opt| available_names.iter().any(|a| a == **opt))
        .map(|s| s.to_string())
        .collect();

    let queue_families = instance.get_queue_family_properties(pd);
    let resolution = resolve_queue_families(instance, pd, &queue_families, requirements)?;

    if let Some(required_features) = &requirements.required_features {
        if !features_satisfy(required_features, &features) {
            return None;
        }
    }

    let has_rebar = detect_rebar(&memory_properties);
    let score = score_device(&properties, enabled_optional_extensions.len(), &resolution, requirements.prefer_discrete);

    Some(Selection {
        physical_device: pd,
        properties,
        features,
        memory_properties,
        graphics: resolution.graphics,
        present: resolution.present,
        transfer: resolution.transfer,
        compute: resolution.compute,
        enabled_optional_extensions,
        score,
        has_rebar,
    })
}

struct QueueResolution {
    graphics: Option<u32>,
    present: Option<u32>,
    transfer: Option<u32>,
    compute: Option<u32>,
}

/// Three-tier transfer score per spec.md §4.3: fully dedicated (no graphics,
/// no compute) beats compute-only-paired beats graphics-paired. Families
/// with no transfer support at all are not candidates.
fn transfer_tier(flags: vk::QueueFlags) -> Option<u8> {
    if !flags.contains(vk::QueueFlags::TRANSFER) && !flags.contains(vk::QueueFlags::GRAPHICS) && !flags.contains(vk::QueueFlags::COMPUTE) {
        return None;
    }
    // Every graphics or compute queue implicitly supports transfer per the
    // Vulkan spec, so any family with GRAPHICS, COMPUTE, or TRANSFER is
    // eligible; the tiers rank how "dedicated" that support is.
    let has_graphics = flags.contains(vk::QueueFlags::GRAPHICS);
    let has_compute = flags.contains(vk::QueueFlags::COMPUTE);
    Some(match (has_graphics, has_compute) {
        (false, false) => 2, // fully dedicated transfer family
        (false, true) => 1,  // compute-only-paired
        _ => 0,              // graphics-paired (or graphics+compute)
    })
}

fn resolve_queue_families(
    instance: &Instance,
    pd: vk::PhysicalDevice,
    families: &[vk::QueueFamilyProperties],
    requirements: &Requirements,
) -> Option<QueueResolution> {
    let mut graphics_index = None;
    let mut present_index = None;
    let mut transfer_index = None;
    let mut transfer_best_tier = -1i8;
    let mut compute_index = None;
    let mut compute_has_graphics_free = false;

    for (i, family) in families.iter().enumerate() {
        let i = i as u32;
        let flags = family.queue_flags;

        if graphics_index.is_none() && flags.contains(vk::QueueFlags::GRAPHICS) {
            graphics_index = Some(i);
        }

        if let Some(surface) = requirements.surface {
            if present_index.is_none() {
                if let Ok(true) = instance.get_physical_device_surface_support(pd, i, surface) {
                    present_index = Some(i);
                }
            }
        }

        if let Some(tier) = transfer_tier(flags) {
            if tier as i8 > transfer_best_tier {
                transfer_best_tier = tier as i8;
                transfer_index = Some(i);
            }
        }

        if flags.contains(vk::QueueFlags::COMPUTE) {
            let without_graphics = !flags.contains(vk::QueueFlags::GRAPHICS);
            if compute_index.is_none()
                || (requirements.queue_needs.prefer_dedicated_compute && without_graphics && !compute_has_graphics_free)
            {
                compute_index = Some(i);
                compute_has_graphics_free = without_graphics;
            }
        }
    }

    if graphics_index.is_none() && !requirements.queue_needs.require_graphics {
        graphics_index = families.iter().position(|f| f.queue_count > 0).map(|i| i as u32);
    }

    if requirements.queue_needs.require_graphics && graphics_index.is_none() {
        return None;
    }
    if requirements.surface.is_some() && present_index.is_none() {
        return None;
    }
    if requirements.queue_needs.require_transfer && transfer_index.is_none() {
        return None;
    }
    if requirements.queue_needs.require_compute && compute_index.is_none() {
        return None;
    }

    Some(QueueResolution {
        graphics: graphics_index,
        present: present_index,
        transfer: transfer_index,
        compute: compute_index,
    })
}

fn features_satisfy(required: &vk::PhysicalDeviceFeatures, available: &vk::PhysicalDeviceFeatures) -> bool {
    macro_rules! implies {
        ($field:ident) => {
            required.$field == 0 || available.$field != 0
        };
    }
    implies!(robust_buffer_access)
        && implies!(full_draw_index_uint32)
        && implies!(image_cube_array)
        && implies!(independent_blend)
        && implies!(geometry_shader)
        && implies!(tessellation_shader)
        && implies!(sample_rate_shading)
        && implies!(dual_src_blend)
        && implies!(logic_op)
        && implies!(multi_draw_indirect)
        && implies!(draw_indirect_first_instance)
        && implies!(depth_clamp)
        && implies!(depth_bias_clamp)
        && implies!(fill_mode_non_solid)
        && implies!(depth_bounds)
        && implies!(wide_lines)
        && implies!(large_points)
        && implies!(alpha_to_one)
        && implies!(multi_viewport)
        && implies!(sampler_anisotropy)
        && implies!(texture_compression_etc2)
        && implies!(texture_compression_astc_ldr)
        && implies!(texture_compression_bc)
        && implies!(occlusion_query_precise)
        && implies!(pipeline_statistics_query)
        && implies!(vertex_pipeline_stores_and_atomics)
        && implies!(fragment_stores_and_atomics)
        && implies!(shader_tessellation_and_geometry_point_size)
        && implies!(shader_image_gather_extended)
        && implies!(shader_storage_image_extended_formats)
        && implies!(shader_storage_image_multisample)
        && implies!(shader_storage_image_read_without_format)
        && implies!(shader_storage_image_write_without_format)
        && implies!(shader_uniform_buffer_array_dynamic_indexing)
        && implies!(shader_sampled_image_array_dynamic_indexing)
        && implies!(shader_storage_buffer_array_dynamic_indexing)
        && implies!(shader_storage_image_array_dynamic_indexing)
        && implies!(shader_clip_distance)
        && implies!(shader_cull_distance)
        && implies!(shader_float64)
        && implies!(shader_int64)
        && implies!(shader_int16)
        && implies!(shader_resource_residency)
        && implies!(shader_resource_min_lod)
        && implies!(sparse_binding)
        && implies!(sparse_residency_buffer)
        && implies!(sparse_residency_image2_d)
        && implies!(sparse_residency_image3_d)
        && implies!(sparse_residency2_samples)
        && implies!(sparse_residency4_samples)
        && implies!(sparse_residency8_samples)
        && implies!(sparse_residency16_samples)
        && implies!(sparse_residency_aliased)
        && implies!(variable_multisample_rate)
        && implies!(inherited_queries)
}

fn score_device(
    properties: &vk::PhysicalDeviceProperties,
    optional_extensions_satisfied: usize,
    resolution: &QueueResolution,
    prefer_discrete: bool,
) -> i64 {
    let mut score: i64 = match properties.device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 1000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => {
            if prefer_discrete {
                500
            } else {
                800
            }
        }
        vk::PhysicalDeviceType::VIRTUAL_GPU => 300,
        vk::PhysicalDeviceType::CPU => 100,
        _ => 0,
    };
    score += 10 * optional_extensions_satisfied as i64;
    if let (Some(g), Some(t)) = (resolution.graphics, resolution.transfer) {
        if g != t {
            score += 100;
        }
    }
    if let (Some(g), Some(c)) = (resolution.graphics, resolution.compute) {
        if g != c {
            score += 60;
        }
    }
    score = score.wrapping_add(properties.limits.max_image_dimension2_d as i64);
    score
}

/// ReBAR detection: true iff a device-local heap larger than 256 MiB hosts
/// a memory type that is both `DEVICE_LOCAL` and `HOST_VISIBLE`.
pub fn detect_rebar(memory_properties: &vk::PhysicalDeviceMemoryProperties) -> bool {
    let types = &memory_properties.memory_types[..memory_properties.memory_type_count as usize];
    let heaps = &memory_properties.memory_heaps[..memory_properties.memory_heap_count as usize];
    let wanted = vk::MemoryPropertyFlags::DEVICE_LOCAL | vk::MemoryPropertyFlags::HOST_VISIBLE;
    types.iter().any(|ty| {
        ty.property_flags.contains(wanted)
            && heaps
                .get(ty.heap_index as usize)
                .map(|heap| heap.size > REBAR_HEAP_THRESHOLD_BYTES)
                .unwrap_or(false)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_properties(
        types: &[(vk::MemoryPropertyFlags, u32)],
        heaps: &[(u64, vk::MemoryHeapFlags)],
    ) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties::default();
        props.memory_type_count = types.len() as u32;
        for (i, (flags, heap_index)) in types.iter().enumerate() {
            props.memory_types[i] = vk::MemoryType {
                property_flags: *flags,
                heap_index: *heap_index,
            };
        }
        props.memory_heap_count = heaps.len() as u32;
        for (i, (size, flags)) in heaps.iter().enumerate() {
            props.memory_heaps[i] = vk::MemoryHeap {
                size: *size,
                flags: *flags,
            };
        }
        props
    }

    #[test]
    fn rebar_detected_with_qualifying_heap() {
        // Scenario 1 from spec.md §8: heap 0 = 12 GiB DEVICE_LOCAL; two
        // memory types on heap 0, one DEVICE_LOCAL only, one DEVICE_LOCAL|HOST_VISIBLE.
        let props = memory_properties(
            &[
                (vk::MemoryPropertyFlags::DEVICE_LOCAL, 0),
                (vk::MemoryPropertyFlags::DEVICE_LOCAL | vk::MemoryPropertyFlags::HOST_VISIBLE, 0),
            ],
            &[(12 * 1024 * 1024 * 1024, vk::MemoryHeapFlags::DEVICE_LOCAL)],
        );
        assert!(detect_rebar(&props));
    }

    #[test]
    fn rebar_not_detected_below_threshold() {
        let props = memory_properties(
            &[(vk::MemoryPropertyFlags::DEVICE_LOCAL | vk::MemoryPropertyFlags::HOST_VISIBLE, 0)],
            &[(256 * 1024 * 1024, vk::MemoryHeapFlags::DEVICE_LOCAL)],
        );
        assert!(!detect_rebar(&props));
    }

    #[test]
    fn rebar_not_detected_without_host_visible_pairing() {
        let props = memory_properties(
            &[
                (vk::MemoryPropertyFlags::DEVICE_LOCAL, 0),
                (vk::MemoryPropertyFlags::HOST_VISIBLE, 1),
            ],
            &[
                (12 * 1024 * 1024 * 1024, vk::MemoryHeapFlags::DEVICE_LOCAL),
                (4 * 1024 * 1024 * 1024, vk::MemoryHeapFlags::empty()),
            ],
        );
        assert!(!detect_rebar(&props));
    }

    #[test]
    fn transfer_tier_prefers_fully_dedicated_over_compute_paired_over_graphics_paired() {
        assert_eq!(transfer_tier(vk::QueueFlags::TRANSFER), Some(2));
        assert_eq!(transfer_tier(vk::QueueFlags::TRANSFER | vk::QueueFlags::COMPUTE), Some(1));
        assert_eq!(transfer_tier(vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER), Some(0));
        assert_eq!(transfer_tier(vk::QueueFlags::empty()), None);
    }

    #[test]
    fn scoring_rewards_discrete_gpus_and_dedicated_queues() {
        let mut props = vk::PhysicalDeviceProperties::default();
        props.device_type = vk::PhysicalDeviceType::DISCRETE_GPU;
        props.limits.max_image_dimension2_d = 16384;

        let dedicated = QueueResolution { graphics: Some(0), present: Some(0), transfer: Some(1), compute: Some(2) };
        let shared = QueueResolution { graphics: Some(0), present: Some(0), transfer: Some(0), compute: Some(0) };

        let score_dedicated = score_device(&props, 2, &dedicated, true);
        let score_shared = score_device(&props, 2, &shared, true);
        assert_eq!(score_dedicated - score_shared, 160);
        assert_eq!(score_shared, 1000 + 20 + 16384);
    }

    #[test]
    fn integrated_gpu_scores_higher_when_discrete_not_preferred() {
        let mut props = vk::PhysicalDeviceProperties::default();
        props.device_type = vk::PhysicalDeviceType::INTEGRATED_GPU;
        let resolution = QueueResolution { graphics: Some(0), present: None, transfer: Some(0), compute: None };
        assert_eq!(score_device(&props, 0, &resolution, true), 500);
        assert_eq!(score_device(&props, 0, &resolution, false), 800);
    }
}
