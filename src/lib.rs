//! A Vulkan runtime foundation for a high-refresh-rate text renderer:
//! loader/dispatch resolution, instance and device lifecycle,
//! physical-device selection, a VMA-style suballocator, managed
//! buffer/image wrappers, swapchain management with display-timing,
//! descriptor pooling and caching, pipeline construction and persistence,
//! render-pass dependency inference, a dynamic glyph atlas, and
//! synchronization primitives.
//!
//! Nothing here pulls in windowing, text shaping, or a scene graph — those
//! are a client's job. This crate stops at the Vulkan boundary.

pub mod config;
pub mod descriptors;
pub mod device;
pub mod error;
pub mod glyph_atlas;
pub mod instance;
pub mod loader;
pub mod memory;
pub mod physical_device;
pub mod pipeline;
pub mod resources;
pub mod swapchain;
pub mod sync;

pub use config::SafeOverlayConfig;
pub use descriptors::{DescriptorCache, DescriptorKey, DescriptorPoolAllocator, PoolSizes};
pub use device::{Device, DeviceCreateOptions, ResolvedQueue};
pub use error::{VkError, VkResult};
pub use glyph_atlas::{GlyphAtlas, GlyphInfo, GlyphMetrics};
pub use instance::{Instance, InstanceCreateOptions};
pub use loader::{DeviceDispatch, GlobalDispatch, InstanceDispatch, Loader};
pub use memory::{Allocation, AllocationStrategy, Allocator, AllocatorStats, MemoryTypeFilter, MemoryUsage};
pub use physical_device::{QueueNeeds, Requirements, Selection};
pub use pipeline::{GraphicsPipelineBuilder, GraphicsPipelineDescription, PipelineCache, RenderPassBuilder};
pub use resources::{BufferCreateOptions, ImageCreateOptions, LayoutTransition, ManagedBuffer, ManagedImage};
pub use swapchain::{PresentStatus, Swapchain, SwapchainCreateOptions};
pub use sync::{Fence, Semaphore, SemaphoreKind};

/// Installs a `tracing` subscriber reading `RUST_LOG` (default: everything
/// at `info` and above goes to stderr with target/file/line). Grounded on
/// the teacher's `logging::init_tracing` — opt-in, not a crate-level side
/// effect: a consumer embedding this in a larger application is expected
/// to own subscriber installation instead, in which case they simply never
/// call this.
pub fn init_tracing() -> Result<(), Box<dyn std::error::Error>> {
    use tracing_subscriber::prelude::*;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    let subscriber = tracing_subscriber::registry()
        .with(fmt_layer)
        .with(tracing_subscriber::EnvFilter::from_default_env());

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
