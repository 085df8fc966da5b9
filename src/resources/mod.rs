//! Managed GPU resources: buffers and images bound to suballocated memory.

mod buffer;
mod image;

pub use buffer::{BufferCreateOptions, ManagedBuffer};
pub use image::{ImageCreateOptions, LayoutTransition, ManagedImage};
