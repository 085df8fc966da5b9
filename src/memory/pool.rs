//! A pool owns every [`Block`] allocated for one memory type index, and
//! decides when a request is large enough to bypass suballocation entirely
//! (a dedicated allocation, spec.md §4.4 "dedicated-allocation threshold").

use ash::vk;

use crate::error::VkResult;
use crate::memory::block::{AllocationStrategy, Block, SubAllocation};

/// Requests at or above this size get their own `vk::DeviceMemory` instead
/// of competing for space in a shared block.
pub const DEDICATED_ALLOCATION_THRESHOLD: u64 = 16 * 1024 * 1024;

/// Default block size for new non-dedicated blocks. Chosen well above
/// typical buffer/image sizes so a handful of blocks serve many
/// suballocations each, matching VMA's own default block-size heuristic.
pub const DEFAULT_BLOCK_SIZE: u64 = 256 * 1024 * 1024;

pub struct PlacedAllocation {
    pub block_index: BlockIndex,
    pub sub: SubAllocation,
}

/// Either a suballocation living in `blocks[i]`, or a dedicated block that
/// is not tracked in the shared-block list at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockIndex {
    Shared(usize),
    Dedicated(usize),
}

pub struct Pool {
    memory_type_index: u32,
    host_visible: bool,
    block_size: u64,
    blocks: Vec<Block>,
    dedicated_blocks: Vec<Block>,
}

impl Pool {
    pub fn new(memory_type_index: u32, host_visible: bool, block_size: u64) -> Self {
        Self {
            memory_type_index,
            host_visible,
            block_size,
            blocks: Vec::new(),
            dedicated_blocks: Vec::new(),
        }
    }

    pub fn memory_type_index(&self) -> u32 {
        self.memory_type_index
    }

    pub fn allocate(
        &mut self,
        device: &ash::Device,
        size: u64,
        alignment: u64,
        strategy: AllocationStrategy,
        force_dedicated: bool,
    ) -> VkResult<PlacedAllocation> {
        if force_dedicated || size >= DEDICATED_ALLOCATION_THRESHOLD {
            let mut block = Block::allocate_device_memory(device, self.memory_type_index, size, self.host_visible)?;
            let sub = block
                .try_allocate(size, alignment, strategy)
                .expect("a freshly allocated block sized exactly to the request always fits it");
            self.dedicated_blocks.push(block);
            return Ok(PlacedAllocation {
                block_index: BlockIndex::Dedicated(self.dedicated_blocks.len() - 1),
                sub,
            });
        }

        for (i, block) in self.blocks.iter_mut().enumerate() {
            if let Some(sub) = block.try_allocate(size, alignment, strategy) {
                return Ok(PlacedAllocation { block_index: BlockIndex::Shared(i), sub });
            }
        }

        let new_block_size = self.block_size.max(size);
        let mut block = Block::allocate_device_memory(device, self.memory_type_index, new_block_size, self.host_visible)?;
        let sub = block
            .try_allocate(size, alignment, strategy)
            .expect("a freshly allocated block sized to at least the request always fits it");
        self.blocks.push(block);
        Ok(PlacedAllocation { block_index: BlockIndex::Shared(self.blocks.len() - 1), sub })
    }

    pub fn free(&mut self, block_index: BlockIndex, offset: u64, size: u64) {
        match block_index {
            BlockIndex::Shared(i) => self.blocks[i].free(offset, size),
            BlockIndex::Dedicated(i) => self.dedicated_blocks[i].free(offset, size),
        }
    }

    pub fn memory_of(&self, block_index: BlockIndex) -> vk::DeviceMemory {
        match block_index {
            BlockIndex::Shared(i) => self.blocks[i].memory,
            BlockIndex::Dedicated(i) => self.dedicated_blocks[i].memory,
        }
    }

    /// Drops empty shared blocks (freeing their `vk::DeviceMemory`) and any
    /// dedicated block whose single allocation has been freed. Called
    /// periodically rather than on every free, matching the teacher's
    /// batched-cleanup habit in `render_engine.rs`'s resize path.
    ///
    /// # Safety
    /// No suballocation from a reclaimed block may still be referenced by
    /// in-flight GPU work.
    pub unsafe fn trim(&mut self, device: &ash::Device) {
        let mut retained = Vec::with_capacity(self.blocks.len());
        for mut block in self.blocks.drain(..) {
            if block.is_empty() {
                unsafe { block.destroy(device) };
            } else {
                retained.push(block);
            }
        }
        self.blocks = retained;

        let mut retained_dedicated = Vec::with_capacity(self.dedicated_blocks.len());
        for mut block in self.dedicated_blocks.drain(..) {
            if block.is_empty() {
                unsafe { block.destroy(device) };
            } else {
                retained_dedicated.push(block);
            }
        }
        self.dedicated_blocks = retained_dedicated;
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len() + self.dedicated_blocks.len()
    }

    pub fn total_bytes(&self) -> u64 {
        self.blocks.iter().map(|b| b.size).sum::<u64>() + self.dedicated_blocks.iter().map(|b| b.size).sum::<u64>()
    }

    pub fn free_bytes(&self) -> u64 {
        self.blocks.iter().map(|b| b.free_bytes()).sum()
    }

    /// Sum of per-block fragmentation (`1 - largest_free_chunk / free_bytes`)
    /// and the number of blocks that contributed one, so callers can average
    /// across every pool without double-counting fully-used or empty blocks.
    pub fn fragmentation(&self) -> (f64, usize) {
        self.blocks
            .iter()
            .filter_map(|b| {
                let free = b.free_bytes();
                if free == 0 {
                    return None;
                }
                Some(1.0 - (b.largest_free_chunk() as f64 / free as f64))
            })
            .fold((0.0, 0), |(sum, n), frag| (sum + frag, n + 1))
    }

    /// # Safety
    /// Every block must be empty (callers tear down pools only after all
    /// allocations from them have been freed).
    pub unsafe fn destroy_all(&mut self, device: &ash::Device) {
        for mut block in self.blocks.drain(..) {
            unsafe { block.destroy(device) };
        }
        for mut block in self.dedicated_blocks.drain(..) {
            unsafe { block.destroy(device) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedicated_threshold_routes_large_requests_to_their_own_block() {
        assert!(DEDICATED_ALLOCATION_THRESHOLD >= 16 * 1024 * 1024);
    }
}
