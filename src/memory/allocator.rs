//! Top-level suballocator: one [`Pool`] per memory type, created lazily.

use std::sync::atomic::{AtomicU64, Ordering};

use ash::vk;
use parking_lot::Mutex;

use crate::error::{VkError, VkResult};
use crate::memory::block::{AllocationStrategy, SubAllocation};
use crate::memory::pool::{BlockIndex, Pool, DEFAULT_BLOCK_SIZE};

/// Required bits must all be set; excluded bits must all be clear; preferred
/// bits are a tiebreaker, not a requirement, mirroring the
/// required/preferred/excluded filter spec.md §4.4 describes for picking a
/// memory type out of a `vk::MemoryRequirements::memory_type_bits` mask.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryTypeFilter {
    pub required: vk::MemoryPropertyFlags,
    pub preferred: vk::MemoryPropertyFlags,
    pub excluded: vk::MemoryPropertyFlags,
}

/// The six allocation usage classes spec.md §4.4's `usageToFilter` table
/// maps to a [`MemoryTypeFilter`]. Callers pick a usage, not raw property
/// flags; `cpu_to_gpu` is the one class whose filter depends on ReBAR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryUsage {
    GpuOnly,
    CpuToGpu,
    GpuToCpu,
    CpuOnly,
    GpuLazilyAllocated,
}

/// Implements spec.md §4.4's `usageToFilter` table. `has_rebar` only
/// changes the `cpu_to_gpu` row: with ReBAR, device-local host-visible
/// memory is required outright (the upload can live in the BAR-mapped
/// region GPU-side); without it, only host-visible is required and the
/// device-local preference is dropped.
pub fn usage_to_filter(usage: MemoryUsage, has_rebar: bool) -> MemoryTypeFilter {
    use vk::MemoryPropertyFlags as F;
    match usage {
        MemoryUsage::GpuOnly => MemoryTypeFilter {
            required: F::DEVICE_LOCAL,
            preferred: F::empty(),
            excluded: F::HOST_VISIBLE,
        },
        MemoryUsage::CpuToGpu if has_rebar => MemoryTypeFilter {
            required: F::DEVICE_LOCAL | F::HOST_VISIBLE,
            preferred: F::HOST_COHERENT,
            excluded: F::empty(),
        },
        MemoryUsage::CpuToGpu => MemoryTypeFilter {
            required: F::HOST_VISIBLE,
            preferred: F::HOST_COHERENT,
            excluded: F::empty(),
        },
        MemoryUsage::GpuToCpu => MemoryTypeFilter {
            required: F::HOST_VISIBLE,
            preferred: F::HOST_CACHED | F::HOST_COHERENT,
            excluded: F::empty(),
        },
        MemoryUsage::CpuOnly => MemoryTypeFilter {
            required: F::HOST_VISIBLE | F::HOST_COHERENT,
            preferred: F::empty(),
            excluded: F::empty(),
        },
        MemoryUsage::GpuLazilyAllocated => MemoryTypeFilter {
            required: F::empty(),
            preferred: F::LAZILY_ALLOCATED,
            excluded: F::empty(),
        },
    }
}

/// Picks the memory type index satisfying `type_bits` (from
/// `vk::MemoryRequirements::memory_type_bits`) and `filter.required`/
/// `filter.excluded`, preferring the candidate with the most bits in common
/// with `filter.preferred`; ties keep the lowest index.
pub fn select_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    filter: &MemoryTypeFilter,
) -> Option<u32> {
    let types = &memory_properties.memory_types[..memory_properties.memory_type_count as usize];
    let mut best: Option<(u32, u32)> = None; // (index, preferred match count)
    for (i, ty) in types.iter().enumerate() {
        if type_bits & (1 << i) == 0 {
            continue;
        }
        if !ty.property_flags.contains(filter.required) {
            continue;
        }
        if ty.property_flags.intersects(filter.excluded) {
            continue;
        }
        let match_count = (ty.property_flags & filter.preferred).as_raw().count_ones();
        let better = match best {
            None => true,
            Some((_, best_count)) => match_count > best_count,
        };
        if better {
            best = Some((i as u32, match_count));
        }
    }
    best.map(|(i, _)| i)
}

#[derive(Debug, Clone, Copy)]
pub struct Allocation {
    pub memory: vk::DeviceMemory,
    pub memory_type_index: u32,
    pub offset: u64,
    pub size: u64,
    pub mapped_ptr: Option<*mut u8>,
    block_index: BlockIndex,
}

/// Matches spec.md §4.4's `stats()` return shape exactly: live-allocation
/// bookkeeping (`total_allocations`, `total_allocated_bytes`,
/// `peak_allocated_bytes`) alongside pool-wide bytes and a fragmentation
/// estimate averaged over blocks that currently have free space.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllocatorStats {
    pub total_allocations: u64,
    pub total_allocated_bytes: u64,
    pub peak_allocated_bytes: u64,
    pub pool_allocated_bytes: u64,
    pub average_fragmentation: f64,
}

impl std::fmt::Display for AllocatorStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} live allocations, {}/{} bytes used (peak {}), {:.1}% fragmented",
            self.total_allocations,
            self.total_allocated_bytes,
            self.pool_allocated_bytes,
            self.peak_allocated_bytes,
            self.average_fragmentation * 100.0
        )
    }
}

pub struct Allocator {
    device: ash::Device,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    has_rebar: bool,
    pools: Mutex<Vec<Option<Pool>>>,
    live_allocations: AtomicU64,
    live_bytes: AtomicU64,
    peak_bytes: AtomicU64,
}

impl Allocator {
    pub fn new(device: ash::Device, memory_properties: vk::PhysicalDeviceMemoryProperties, has_rebar: bool) -> Self {
        let count = memory_properties.memory_type_count as usize;
        Self {
            device,
            memory_properties,
            has_rebar,
            pools: Mutex::new((0..count).map(|_| None).collect()),
            live_allocations: AtomicU64::new(0),
            live_bytes: AtomicU64::new(0),
            peak_bytes: AtomicU64::new(0),
        }
    }

    pub fn allocate(
        &self,
        requirements: vk::MemoryRequirements,
        usage: MemoryUsage,
        strategy: AllocationStrategy,
        force_dedicated: bool,
    ) -> VkResult<Allocation> {
        let filter = usage_to_filter(usage, self.has_rebar);
        let memory_type_index = select_memory_type(&self.memory_properties, requirements.memory_type_bits, &filter)
            .ok_or(VkError::FeatureNotPresent)?;
        let host_visible = self.memory_properties.memory_types[memory_type_index as usize]
            .property_flags
            .contains(vk::MemoryPropertyFlags::HOST_VISIBLE);

        let mut pools = self.pools.lock();
        let pool = pools[memory_type_index as usize]
            .get_or_insert_with(|| Pool::new(memory_type_index, host_visible, DEFAULT_BLOCK_SIZE));

        let placed = pool.allocate(&self.device, requirements.size, requirements.alignment, strategy, force_dedicated)?;
        let memory = pool.memory_of(placed.block_index);

        self.live_allocations.fetch_add(1, Ordering::Relaxed);
        let live_bytes = self.live_bytes.fetch_add(placed.sub.size, Ordering::Relaxed) + placed.sub.size;
        self.peak_bytes.fetch_max(live_bytes, Ordering::Relaxed);

        tracing::trace!(
            target: "zeus_vk::memory",
            memory_type_index,
            size = requirements.size,
            "allocation placed"
        );

        Ok(Allocation {
            memory,
            memory_type_index,
            offset: placed.sub.offset,
            size: placed.sub.size,
            mapped_ptr: placed.sub.mapped_ptr,
            block_index: placed.block_index,
        })
    }

    pub fn free(&self, allocation: &Allocation) {
        let mut pools = self.pools.lock();
        if let Some(pool) = pools[allocation.memory_type_index as usize].as_mut() {
            pool.free(allocation.block_index, allocation.offset, allocation.size);
        }
        drop(pools);
        self.live_allocations.fetch_sub(1, Ordering::Relaxed);
        self.live_bytes.fetch_sub(allocation.size, Ordering::Relaxed);
    }

    pub fn stats(&self) -> AllocatorStats {
        let pools = self.pools.lock();
        let (pool_allocated_bytes, fragmentation_sum, fragmented_blocks) =
            pools.iter().flatten().fold((0u64, 0.0f64, 0usize), |(bytes, frag_sum, frag_n), pool| {
                let (pool_frag_sum, pool_frag_n) = pool.fragmentation();
                (bytes + pool.total_bytes(), frag_sum + pool_frag_sum, frag_n + pool_frag_n)
            });

        AllocatorStats {
            total_allocations: self.live_allocations.load(Ordering::Relaxed),
            total_allocated_bytes: self.live_bytes.load(Ordering::Relaxed),
            peak_allocated_bytes: self.peak_bytes.load(Ordering::Relaxed),
            pool_allocated_bytes,
            average_fragmentation: if fragmented_blocks > 0 { fragmentation_sum / fragmented_blocks as f64 } else { 0.0 },
        }
    }

    /// Releases empty blocks across every pool.
    ///
    /// # Safety
    /// No suballocation from a reclaimed block may still be referenced by
    /// in-flight GPU work.
    pub unsafe fn trim(&self) {
        let mut pools = self.pools.lock();
        for pool in pools.iter_mut().flatten() {
            unsafe { pool.trim(&self.device) };
        }
    }

    /// # Safety
    /// Every outstanding allocation must already have been freed.
    pub unsafe fn destroy(&self) {
        let mut pools = self.pools.lock();
        for pool in pools.iter_mut().flatten() {
            unsafe { pool.destroy_all(&self.device) };
        }
    }

    pub fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.memory_properties
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_properties(types: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties::default();
        props.memory_type_count = types.len() as u32;
        for (i, flags) in types.iter().enumerate() {
            props.memory_types[i] = vk::MemoryType { property_flags: *flags, heap_index: 0 };
        }
        props
    }

    #[test]
    fn select_memory_type_honors_required_and_excluded() {
        let props = memory_properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        ]);
        let filter = MemoryTypeFilter {
            required: vk::MemoryPropertyFlags::HOST_VISIBLE,
            preferred: Default::default(),
            excluded: Default::default(),
        };
        assert_eq!(select_memory_type(&props, 0b11, &filter), Some(1));
    }

    #[test]
    fn select_memory_type_prefers_higher_preferred_match_count() {
        let props = memory_properties(&[
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT | vk::MemoryPropertyFlags::DEVICE_LOCAL,
        ]);
        let filter = usage_to_filter(MemoryUsage::CpuToGpu, false);
        assert_eq!(select_memory_type(&props, 0b11, &filter), Some(1));
    }

    #[test]
    fn select_memory_type_respects_type_bits_mask() {
        let props = memory_properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        ]);
        let filter = usage_to_filter(MemoryUsage::GpuOnly, false);
        // Only index 1 allowed by the mask, even though index 0 also matches.
        assert_eq!(select_memory_type(&props, 0b10, &filter), Some(1));
    }

    #[test]
    fn select_memory_type_returns_none_when_nothing_qualifies() {
        let props = memory_properties(&[vk::MemoryPropertyFlags::HOST_VISIBLE]);
        let filter = usage_to_filter(MemoryUsage::GpuOnly, false);
        assert_eq!(select_memory_type(&props, 0b1, &filter), None);
    }

    #[test]
    fn usage_to_filter_flips_cpu_to_gpu_requirement_on_rebar() {
        let rebar = usage_to_filter(MemoryUsage::CpuToGpu, true);
        assert!(rebar.required.contains(vk::MemoryPropertyFlags::DEVICE_LOCAL | vk::MemoryPropertyFlags::HOST_VISIBLE));

        let no_rebar = usage_to_filter(MemoryUsage::CpuToGpu, false);
        assert_eq!(no_rebar.required, vk::MemoryPropertyFlags::HOST_VISIBLE);
        assert!(!no_rebar.required.contains(vk::MemoryPropertyFlags::DEVICE_LOCAL));
    }

    #[test]
    fn usage_to_filter_gpu_only_excludes_host_visible() {
        let filter = usage_to_filter(MemoryUsage::GpuOnly, true);
        assert_eq!(filter.excluded, vk::MemoryPropertyFlags::HOST_VISIBLE);
    }

    #[test]
    fn usage_to_filter_gpu_to_cpu_prefers_cached_coherent() {
        let filter = usage_to_filter(MemoryUsage::GpuToCpu, false);
        assert_eq!(filter.required, vk::MemoryPropertyFlags::HOST_VISIBLE);
        assert_eq!(
            filter.preferred,
            vk::MemoryPropertyFlags::HOST_CACHED | vk::MemoryPropertyFlags::HOST_COHERENT
        );
    }

    #[test]
    fn usage_to_filter_gpu_lazily_allocated_has_no_required_bits() {
        let filter = usage_to_filter(MemoryUsage::GpuLazilyAllocated, false);
        assert_eq!(filter.required, vk::MemoryPropertyFlags::empty());
        assert_eq!(filter.preferred, vk::MemoryPropertyFlags::LAZILY_ALLOCATED);
    }

    #[test]
    fn stats_display_reports_usage_and_peak() {
        let stats = AllocatorStats {
            total_allocations: 3,
            total_allocated_bytes: 750,
            peak_allocated_bytes: 900,
            pool_allocated_bytes: 1000,
            average_fragmentation: 0.25,
        };
        assert_eq!(format!("{stats}"), "3 live allocations, 750/1000 bytes used (peak 900), 25.0% fragmented");
    }
}
