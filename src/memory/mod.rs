//! VMA-style suballocator: `Allocator` owns one [`pool::Pool`] per memory
//! type, each pool owning a list of [`block::Block`]s it suballocates from
//! (spec.md §4.4). Grounded on the heap-walking pattern in
//! `examples/other_examples/5e4cd9a1_YelenaTor-framealloc__src-gpu-vulkan-allocator.rs.rs`,
//! generalized from a single-heap-size query into a full suballocator since
//! spec.md explicitly calls for pool/block/suballocation management that the
//! teacher repo (which uses `vk-mem` directly) does not implement itself.

mod allocator;
mod block;
mod pool;

pub use allocator::{usage_to_filter, Allocation, Allocator, AllocatorStats, MemoryTypeFilter, MemoryUsage};
pub use block::AllocationStrategy;
