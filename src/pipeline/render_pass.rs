//! Render-pass construction with automatic subpass-dependency inference
//! (spec.md §4.9).

use ash::vk;

use crate::error::{VkError, VkResult};

#[derive(Debug, Clone)]
pub struct AttachmentDescription {
    pub format: vk::Format,
    pub samples: vk::SampleCountFlags,
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
    pub stencil_load_op: vk::AttachmentLoadOp,
    pub stencil_store_op: vk::AttachmentStoreOp,
    pub initial_layout: vk::ImageLayout,
    pub final_layout: vk::ImageLayout,
}

impl Default for AttachmentDescription {
    fn default() -> Self {
        Self {
            format: vk::Format::UNDEFINED,
            samples: vk::SampleCountFlags::TYPE_1,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
            stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
        }
    }
}

/// One subpass's attachment references. `preserve` lists attachment indices
/// untouched by this subpass but needed by a later one.
#[derive(Debug, Clone, Default)]
pub struct SubpassDescription {
    pub input_attachments: Vec<vk::AttachmentReference>,
    pub color_attachments: Vec<vk::AttachmentReference>,
    pub resolve_attachments: Vec<vk::AttachmentReference>,
    pub depth_stencil_attachment: Option<vk::AttachmentReference>,
    pub preserve_attachments: Vec<u32>,
}

/// Appends attachments and subpasses by index, then infers the subpass
/// dependencies spec.md §4.9 lists (external-in, external-out, and
/// inter-subpass input-attachment reads) on top of any explicit ones a
/// caller adds.
#[derive(Default)]
pub struct RenderPassBuilder {
    attachments: Vec<AttachmentDescription>,
    subpasses: Vec<SubpassDescription>,
    explicit_dependencies: Vec<vk::SubpassDependency>,
}

impl RenderPassBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_attachment(&mut self, attachment: AttachmentDescription) -> u32 {
        self.attachments.push(attachment);
        (self.attachments.len() - 1) as u32
    }

    pub fn add_subpass(&mut self, subpass: SubpassDescription) -> u32 {
        self.subpasses.push(subpass);
        (self.subpasses.len() - 1) as u32
    }

    pub fn add_dependency(&mut self, dependency: vk::SubpassDependency) {
        self.explicit_dependencies.push(dependency);
    }

    /// The four inference rules from spec.md §4.9, in order. Returns the
    /// full dependency list: explicit dependencies first, then inferred
    /// ones — explicit dependencies never get silently dropped.
    pub fn inferred_dependencies(&self) -> Vec<vk::SubpassDependency> {
        let mut deps = self.explicit_dependencies.clone();
        let Some(first) = self.subpasses.first() else {
            return deps;
        };

        if !first.color_attachments.is_empty() {
            deps.push(
                vk::SubpassDependency::default()
                    .src_subpass(vk::SUBPASS_EXTERNAL)
                    .dst_subpass(0)
                    .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
                    .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
                    .src_access_mask(vk::AccessFlags::empty())
                    .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE),
            );
        }
        if first.depth_stencil_attachment.is_some() {
            let stages = vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS;
            deps.push(
                vk::SubpassDependency::default()
                    .src_subpass(vk::SUBPASS_EXTERNAL)
                    .dst_subpass(0)
                    .src_stage_mask(stages)
                    .dst_stage_mask(stages)
                    .src_access_mask(vk::AccessFlags::empty())
                    .dst_access_mask(vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE),
            );
        }

        for i in 0..self.subpasses.len().saturating_sub(1) {
            let producer = &self.subpasses[i];
            let consumer = &self.subpasses[i + 1];
            let feeds_input = producer
                .color_attachments
                .iter()
                .any(|c| consumer.input_attachments.iter().any(|input| input.attachment == c.attachment));
            if feeds_input {
                deps.push(
                    vk::SubpassDependency::default()
                        .src_subpass(i as u32)
                        .dst_subpass((i + 1) as u32)
                        .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
                        .dst_stage_mask(vk::PipelineStageFlags::FRAGMENT_SHADER)
                        .src_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
                        .dst_access_mask(vk::AccessFlags::INPUT_ATTACHMENT_READ)
                        .dependency_flags(vk::DependencyFlags::BY_REGION),
                );
            }
        }

        if let Some(last) = self.subpasses.last() {
            if !last.color_attachments.is_empty() {
                deps.push(
                    vk::SubpassDependency::default()
                        .src_subpass((self.subpasses.len() - 1) as u32)
                        .dst_subpass(vk::SUBPASS_EXTERNAL)
                        .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
                        .dst_stage_mask(vk::PipelineStageFlags::BOTTOM_OF_PIPE)
                        .src_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
                        .dst_access_mask(vk::AccessFlags::empty()),
                );
            }
        }

        deps
    }

    pub fn build(self, device: &ash::Device) -> VkResult<vk::RenderPass> {
        if self.subpasses.is_empty() {
            return Err(VkError::FeatureNotPresent);
        }

        let attachments: Vec<vk::AttachmentDescription> = self
            .attachments
            .iter()
            .map(|a| {
                vk::AttachmentDescription::default()
                    .format(a.format)
                    .samples(a.samples)
                    .load_op(a.load_op)
                    .store_op(a.store_op)
                    .stencil_load_op(a.stencil_load_op)
                    .stencil_store_op(a.stencil_store_op)
                    .initial_layout(a.initial_layout)
                    .final_layout(a.final_layout)
            })
            .collect();

        // Subpass descriptions borrow their reference slices; build those
        // slices first so they outlive the `vk::SubpassDescription` values.
        let subpasses_vk: Vec<vk::SubpassDescription> = self
            .subpasses
            .iter()
            .map(|s| {
                let mut desc = vk::SubpassDescription::default()
                    .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
                    .input_attachments(&s.input_attachments)
                    .color_attachments(&s.color_attachments)
                    .preserve_attachments(&s.preserve_attachments);
                if !s.resolve_attachments.is_empty() {
                    desc = desc.resolve_attachments(&s.resolve_attachments);
                }
                if let Some(ds) = s.depth_stencil_attachment.as_ref() {
                    desc = desc.depth_stencil_attachment(ds);
                }
                desc
            })
            .collect();

        let dependencies = self.inferred_dependencies();

        let create_info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(&subpasses_vk)
            .dependencies(&dependencies);

        let render_pass = unsafe { device.create_render_pass(&create_info, None) }.map_err(VkError::from)?;
        tracing::debug!(
            target: "zeus_vk::render_pass",
            attachments = attachments.len(),
            subpasses = subpasses_vk.len(),
            dependencies = dependencies.len(),
            "render pass created"
        );
        Ok(render_pass)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn color_ref(index: u32) -> vk::AttachmentReference {
        vk::AttachmentReference { attachment: index, layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL }
    }

    fn input_ref(index: u32) -> vk::AttachmentReference {
        vk::AttachmentReference { attachment: index, layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL }
    }

    #[test]
    fn single_color_subpass_gets_external_in_and_out_dependencies() {
        let mut builder = RenderPassBuilder::new();
        builder.add_attachment(AttachmentDescription::default());
        builder.add_subpass(SubpassDescription { color_attachments: vec![color_ref(0)], ..Default::default() });

        let deps = builder.inferred_dependencies();
        assert_eq!(deps.len(), 2);
        assert_eq!(deps[0].src_subpass, vk::SUBPASS_EXTERNAL);
        assert_eq!(deps[0].dst_subpass, 0);
        assert_eq!(deps[1].src_subpass, 0);
        assert_eq!(deps[1].dst_subpass, vk::SUBPASS_EXTERNAL);
    }

    #[test]
    fn depth_subpass_gets_fragment_test_dependency() {
        let mut builder = RenderPassBuilder::new();
        builder.add_attachment(AttachmentDescription::default());
        builder.add_subpass(SubpassDescription {
            depth_stencil_attachment: Some(vk::AttachmentReference {
                attachment: 0,
                layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            }),
            ..Default::default()
        });

        let deps = builder.inferred_dependencies();
        assert_eq!(deps.len(), 1);
        assert!(deps[0].dst_access_mask.contains(vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE));
    }

    #[test]
    fn input_attachment_read_between_adjacent_subpasses_is_inferred() {
        let mut builder = RenderPassBuilder::new();
        builder.add_attachment(AttachmentDescription::default());
        builder.add_attachment(AttachmentDescription::default());
        builder.add_subpass(SubpassDescription { color_attachments: vec![color_ref(0)], ..Default::default() });
        builder.add_subpass(SubpassDescription {
            input_attachments: vec![input_ref(0)],
            color_attachments: vec![color_ref(1)],
            ..Default::default()
        });

        let deps = builder.inferred_dependencies();
        // external->0, 0->1 (input read), 1->external
        assert_eq!(deps.len(), 3);
        let inter = &deps[1];
        assert_eq!(inter.src_subpass, 0);
        assert_eq!(inter.dst_subpass, 1);
        assert_eq!(inter.dependency_flags, vk::DependencyFlags::BY_REGION);
    }

    #[test]
    fn explicit_dependencies_are_kept_alongside_inferred_ones() {
        let mut builder = RenderPassBuilder::new();
        builder.add_attachment(AttachmentDescription::default());
        builder.add_subpass(SubpassDescription { color_attachments: vec![color_ref(0)], ..Default::default() });
        builder.add_dependency(vk::SubpassDependency::default());

        let deps = builder.inferred_dependencies();
        // 1 explicit + external-in + external-out
        assert_eq!(deps.len(), 3);
    }

    #[test]
    fn no_subpasses_yields_no_dependencies() {
        let builder = RenderPassBuilder::new();
        assert!(builder.inferred_dependencies().is_empty());
    }
}
