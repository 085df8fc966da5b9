//! Descriptor pool allocation and content-addressed descriptor-set caching
//! (spec.md §4.7). Grounded on the bindless descriptor-set bookkeeping in
//! `examples/other_examples/340c6572_DannyDoesGraphics-DARE__dagal-src-descriptor-bindless-bindless.rs.rs`.

mod cache;
mod pool;

pub use cache::{DescriptorCache, DescriptorKey};
pub use pool::{DescriptorPoolAllocator, PoolSizes};
