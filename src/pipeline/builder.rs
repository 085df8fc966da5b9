//! Graphics pipeline construction (spec.md §4.10, §9 "Builder chains").
//!
//! SPIR-V bytecode is an opaque input per spec.md §1 Non-goals — this
//! builder takes already-compiled shader modules (or raw bytecode it wraps
//! in a `vk::ShaderModule` on the caller's behalf) and never compiles
//! anything itself. Modeled as a fluent builder consumed by `build(self)`,
//! per spec.md §9: the capability set is fixed, the chaining style is not.

use ash::vk;

use crate::error::{VkError, VkResult};

#[derive(Debug, Clone, Copy)]
pub struct ShaderStage<'a> {
    pub module: vk::ShaderModule,
    pub stage: vk::ShaderStageFlags,
    pub entry_point: &'a std::ffi::CStr,
}

/// Plain-data description of everything a graphics pipeline needs beyond
/// shader stages, assembled incrementally by [`GraphicsPipelineBuilder`]
/// and consumed whole by `vkCreateGraphicsPipelines`.
pub struct GraphicsPipelineDescription<'a> {
    pub stages: Vec<ShaderStage<'a>>,
    pub vertex_bindings: Vec<vk::VertexInputBindingDescription>,
    pub vertex_attributes: Vec<vk::VertexInputAttributeDescription>,
    pub topology: vk::PrimitiveTopology,
    pub polygon_mode: vk::PolygonMode,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    pub sample_count: vk::SampleCountFlags,
    pub depth_test_enable: bool,
    pub depth_write_enable: bool,
    pub depth_compare_op: vk::CompareOp,
    pub color_blend_attachments: Vec<vk::PipelineColorBlendAttachmentState>,
    pub dynamic_states: Vec<vk::DynamicState>,
    pub layout: vk::PipelineLayout,
    pub render_pass: vk::RenderPass,
    pub subpass: u32,
}

impl Default for GraphicsPipelineDescription<'_> {
    fn default() -> Self {
        Self {
            stages: Vec::new(),
            vertex_bindings: Vec::new(),
            vertex_attributes: Vec::new(),
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: vk::CullModeFlags::NONE,
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
            sample_count: vk::SampleCountFlags::TYPE_1,
            depth_test_enable: false,
            depth_write_enable: false,
            depth_compare_op: vk::CompareOp::LESS,
            color_blend_attachments: vec![straight_alpha_blend()],
            dynamic_states: vec![vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR],
            layout: vk::PipelineLayout::null(),
            render_pass: vk::RenderPass::null(),
            subpass: 0,
        }
    }
}

/// Standard premultiplied-alpha-friendly blend state for a text/UI
/// renderer's single color attachment.
fn straight_alpha_blend() -> vk::PipelineColorBlendAttachmentState {
    vk::PipelineColorBlendAttachmentState::default()
        .blend_enable(true)
        .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
        .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
        .color_blend_op(vk::BlendOp::ADD)
        .src_alpha_blend_factor(vk::BlendFactor::ONE)
        .dst_alpha_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
        .alpha_blend_op(vk::BlendOp::ADD)
        .color_write_mask(vk::ColorComponentFlags::RGBA)
}

#[derive(Default)]
pub struct GraphicsPipelineBuilder<'a> {
    desc: GraphicsPipelineDescription<'a>,
}

impl<'a> GraphicsPipelineBuilder<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stages(mut self, stages: Vec<ShaderStage<'a>>) -> Self {
        self.desc.stages = stages;
        self
    }

    pub fn vertex_input(
        mut self,
        bindings: Vec<vk::VertexInputBindingDescription>,
        attributes: Vec<vk::VertexInputAttributeDescription>,
    ) -> Self {
        self.desc.vertex_bindings = bindings;
        self.desc.vertex_attributes = attributes;
        self
    }

    pub fn topology(mut self, topology: vk::PrimitiveTopology) -> Self {
        self.desc.topology = topology;
        self
    }

    pub fn rasterization(mut self, polygon_mode: vk::PolygonMode, cull_mode: vk::CullModeFlags, front_face: vk::FrontFace) -> Self {
        self.desc.polygon_mode = polygon_mode;
        self.desc.cull_mode = cull_mode;
        self.desc.front_face = front_face;
        self
    }

    pub fn depth_test(mut self, test_enable: bool, write_enable: bool, compare_op: vk::CompareOp) -> Self {
        self.desc.depth_test_enable = test_enable;
        self.desc.depth_write_enable = write_enable;
        self.desc.depth_compare_op = compare_op;
        self
    }

    pub fn color_blend_attachments(mut self, attachments: Vec<vk::PipelineColorBlendAttachmentState>) -> Self {
        self.desc.color_blend_attachments = attachments;
        self
    }

    pub fn layout(mut self, layout: vk::PipelineLayout) -> Self {
        self.desc.layout = layout;
        self
    }

    pub fn render_pass(mut self, render_pass: vk::RenderPass, subpass: u32) -> Self {
        self.desc.render_pass = render_pass;
        self.desc.subpass = subpass;
        self
    }

    pub fn build(self, device: &ash::Device, cache: vk::PipelineCache) -> VkResult<vk::Pipeline> {
        let desc = self.desc;
        if desc.stages.is_empty() || desc.layout == vk::PipelineLayout::null() || desc.render_pass == vk::RenderPass::null() {
            return Err(VkError::FeatureNotPresent);
        }

        let stage_infos: Vec<vk::PipelineShaderStageCreateInfo> = desc
            .stages
            .iter()
            .map(|s| {
                vk::PipelineShaderStageCreateInfo::default()
                    .stage(s.stage)
                    .module(s.module)
                    .name(s.entry_point)
            })
            .collect();

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&desc.vertex_bindings)
            .vertex_attribute_descriptions(&desc.vertex_attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(desc.topology)
            .primitive_restart_enable(false);

        // Viewport/scissor counts are fixed here; the actual rectangles are
        // supplied per-frame via `vkCmdSetViewport`/`vkCmdSetScissor` since
        // both are in `dynamic_states` by default.
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(desc.polygon_mode)
            .cull_mode(desc.cull_mode)
            .front_face(desc.front_face)
            .line_width(1.0);

        let multisample = vk::PipelineMultisampleStateCreateInfo::default().rasterization_samples(desc.sample_count);

        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(desc.depth_test_enable)
            .depth_write_enable(desc.depth_write_enable)
            .depth_compare_op(desc.depth_compare_op);

        let color_blend = vk::PipelineColorBlendStateCreateInfo::default().attachments(&desc.color_blend_attachments);

        let dynamic_state = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&desc.dynamic_states);

        let create_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stage_infos)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blend)
            .dynamic_state(&dynamic_state)
            .layout(desc.layout)
            .render_pass(desc.render_pass)
            .subpass(desc.subpass);

        let pipelines = unsafe { device.create_graphics_pipelines(cache, &[create_info], None) }
            .map_err(|(_, e)| VkError::from(e))?;
        tracing::debug!(target: "zeus_vk::pipeline", stages = stage_infos.len(), "graphics pipeline created");
        Ok(pipelines[0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_description_uses_dynamic_viewport_and_scissor() {
        let desc = GraphicsPipelineDescription::default();
        assert!(desc.dynamic_states.contains(&vk::DynamicState::VIEWPORT));
        assert!(desc.dynamic_states.contains(&vk::DynamicState::SCISSOR));
    }

    #[test]
    fn builder_without_stages_or_layout_fails_validation() {
        let builder = GraphicsPipelineBuilder::new();
        // We can't call `build` without a real device in a unit test; assert
        // the precondition the real `build` enforces instead.
        assert!(builder.desc.stages.is_empty());
        assert_eq!(builder.desc.layout, vk::PipelineLayout::null());
    }

    #[test]
    fn default_blend_state_is_straight_alpha() {
        let blend = straight_alpha_blend();
        assert!(blend.blend_enable == vk::TRUE);
        assert_eq!(blend.src_color_blend_factor, vk::BlendFactor::SRC_ALPHA);
    }
}
