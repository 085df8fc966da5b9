//! A single `vk::DeviceMemory` allocation, suballocated via a free-list.

use ash::vk;

use crate::error::{VkError, VkResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationStrategy {
    FirstFit,
    BestFit,
    WorstFit,
}

#[derive(Debug, Clone, Copy)]
struct FreeChunk {
    offset: u64,
    size: u64,
}

/// A placed suballocation within a [`Block`]. `mapped_ptr` is non-null only
/// when the owning block is persistently mapped (host-visible memory).
#[derive(Debug, Clone, Copy)]
pub struct SubAllocation {
    pub offset: u64,
    pub size: u64,
    pub mapped_ptr: Option<*mut u8>,
}

pub struct Block {
    pub memory: vk::DeviceMemory,
    pub size: u64,
    pub memory_type_index: u32,
    mapped_base: Option<*mut u8>,
    free_chunks: Vec<FreeChunk>,
    live_allocations: usize,
}

impl Block {
    pub fn allocate_device_memory(
        device: &ash::Device,
        memory_type_index: u32,
        size: u64,
        host_visible: bool,
    ) -> VkResult<Self> {
        let alloc_info = vk::MemoryAllocateInfo::default()
            .allocation_size(size)
            .memory_type_index(memory_type_index);
        let memory = unsafe { device.allocate_memory(&alloc_info, None) }.map_err(VkError::from)?;

        let mapped_base = if host_visible {
            let ptr = unsafe { device.map_memory(memory, 0, vk::WHOLE_SIZE, vk::MemoryMapFlags::empty()) }
                .map_err(VkError::from)?;
            Some(ptr as *mut u8)
        } else {
            None
        };

        Ok(Self {
            memory,
            size,
            memory_type_index,
            mapped_base,
            free_chunks: vec![FreeChunk { offset: 0, size }],
            live_allocations: 0,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.live_allocations == 0
    }

    pub fn is_mapped(&self) -> bool {
        self.mapped_base.is_some()
    }

    /// Finds a free chunk satisfying `size`/`alignment` per `strategy`, and
    /// splits the remainder back into the free list rather than discarding
    /// it — a chunk larger than requested always yields a second, smaller
    /// free chunk covering the leftover bytes.
    pub fn try_allocate(&mut self, size: u64, alignment: u64, strategy: AllocationStrategy) -> Option<SubAllocation> {
        let mut best_index = None;
        for (i, chunk) in self.free_chunks.iter().enumerate() {
            let aligned_offset = align_up(chunk.offset, alignment);
            let padding = aligned_offset - chunk.offset;
            if padding > chunk.size || chunk.size - padding < size {
                continue;
            }
            let usable = chunk.size - padding;
            let better = match (best_index, strategy) {
                (None, _) => true,
                (Some(_), AllocationStrategy::FirstFit) => false,
                (Some(b), AllocationStrategy::BestFit) => usable < self.free_chunks[b].size - (align_up(self.free_chunks[b].offset, alignment) - self.free_chunks[b].offset),
                (Some(b), AllocationStrategy::WorstFit) => usable > self.free_chunks[b].size - (align_up(self.free_chunks[b].offset, alignment) - self.free_chunks[b].offset),
            };
            if better {
                best_index = Some(i);
                if strategy == AllocationStrategy::FirstFit {
                    break;
                }
            }
        }

        let index = best_index?;
        let chunk = self.free_chunks.remove(index);
        let aligned_offset = align_up(chunk.offset, alignment);
        let head_padding = aligned_offset - chunk.offset;
        let tail_start = aligned_offset + size;
        let tail_size = chunk.offset + chunk.size - tail_start;

        if head_padding > 0 {
            self.free_chunks.push(FreeChunk { offset: chunk.offset, size: head_padding });
        }
        if tail_size > 0 {
            self.free_chunks.push(FreeChunk { offset: tail_start, size: tail_size });
        }

        self.live_allocations += 1;
        let mapped_ptr = self.mapped_base.map(|base| unsafe { base.add(aligned_offset as usize) });
        Some(SubAllocation { offset: aligned_offset, size, mapped_ptr })
    }

    /// Returns `(offset, size)` to the free list and coalesces with any
    /// free chunk immediately adjacent on either side, so fragmentation
    /// does not accumulate across repeated allocate/free cycles.
    pub fn free(&mut self, offset: u64, size: u64) {
        self.free_chunks.push(FreeChunk { offset, size });
        self.free_chunks.sort_unstable_by_key(|c| c.offset);

        let mut merged: Vec<FreeChunk> = Vec::with_capacity(self.free_chunks.len());
        for chunk in self.free_chunks.drain(..) {
            match merged.last_mut() {
                Some(prev) if prev.offset + prev.size == chunk.offset => {
                    prev.size += chunk.size;
                }
                _ => merged.push(chunk),
            }
        }
        self.free_chunks = merged;
        self.live_allocations -= 1;
    }

    pub fn largest_free_chunk(&self) -> u64 {
        self.free_chunks.iter().map(|c| c.size).max().unwrap_or(0)
    }

    pub fn free_bytes(&self) -> u64 {
        self.free_chunks.iter().map(|c| c.size).sum()
    }

    /// # Safety
    /// The caller must ensure no suballocations from this block are in use
    /// on the device (command buffers retired, descriptor sets released).
    pub unsafe fn destroy(&mut self, device: &ash::Device) {
        if self.mapped_base.is_some() {
            unsafe { device.unmap_memory(self.memory) };
        }
        unsafe { device.free_memory(self.memory, None) };
    }
}

fn align_up(value: u64, alignment: u64) -> u64 {
    if alignment == 0 {
        return value;
    }
    (value + alignment - 1) & !(alignment - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_block(size: u64) -> Block {
        Block {
            memory: vk::DeviceMemory::null(),
            size,
            memory_type_index: 0,
            mapped_base: None,
            free_chunks: vec![FreeChunk { offset: 0, size }],
            live_allocations: 0,
        }
    }

    #[test]
    fn allocate_splits_remainder_into_a_free_chunk() {
        let mut block = empty_block(1024);
        let a = block.try_allocate(256, 16, AllocationStrategy::FirstFit).unwrap();
        assert_eq!(a.offset, 0);
        assert_eq!(block.free_bytes(), 1024 - 256);
        // A second allocation must not overlap the first.
        let b = block.try_allocate(256, 16, AllocationStrategy::FirstFit).unwrap();
        assert!(b.offset >= a.offset + a.size);
    }

    #[test]
    fn free_coalesces_adjacent_chunks_back_to_a_single_span() {
        let mut block = empty_block(1024);
        let a = block.try_allocate(256, 16, AllocationStrategy::FirstFit).unwrap();
        let b = block.try_allocate(256, 16, AllocationStrategy::FirstFit).unwrap();
        block.free(a.offset, a.size);
        block.free(b.offset, b.size);
        assert_eq!(block.free_bytes(), 1024);
        assert_eq!(block.largest_free_chunk(), 1024);
        assert!(block.is_empty());
    }

    #[test]
    fn alignment_is_respected_even_when_it_forces_head_padding() {
        let mut block = empty_block(1024);
        let _ = block.try_allocate(8, 1, AllocationStrategy::FirstFit).unwrap();
        let b = block.try_allocate(64, 256, AllocationStrategy::FirstFit).unwrap();
        assert_eq!(b.offset % 256, 0);
    }

    #[test]
    fn best_fit_chooses_the_tightest_sufficient_chunk() {
        let mut block = empty_block(0);
        block.free_chunks = vec![
            FreeChunk { offset: 0, size: 1000 },
            FreeChunk { offset: 2000, size: 100 },
            FreeChunk { offset: 3000, size: 500 },
        ];
        let a = block.try_allocate(64, 1, AllocationStrategy::BestFit).unwrap();
        assert_eq!(a.offset, 2000);
    }

    #[test]
    fn no_fit_returns_none_without_mutating_free_list() {
        let mut block = empty_block(100);
        assert!(block.try_allocate(200, 1, AllocationStrategy::FirstFit).is_none());
        assert_eq!(block.free_bytes(), 100);
    }
}
