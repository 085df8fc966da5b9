//! Pipeline cache persistence, render-pass construction, and graphics
//! pipeline building (spec.md §4.9-4.10).

mod builder;
mod cache;
mod render_pass;

pub use builder::{GraphicsPipelineBuilder, GraphicsPipelineDescription, ShaderStage};
pub use cache::PipelineCache;
pub use render_pass::{AttachmentDescription, RenderPassBuilder, SubpassDescription};
