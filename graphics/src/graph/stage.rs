//! Declarative render stage and back buffer descriptions.
//!
//! A [`BackBufferDesc`] describes a multi-stage pipeline as authored data:
//! each [`RenderStageDesc`] declares its attachments and how it depends on
//! earlier stages via [`StageLink`]s. Links may only reference strictly
//! earlier stage indices, which makes the link structure a DAG by
//! construction: declaration order is execution order, and no cycle
//! detection is needed.

use crate::types::{Extent2d, SampleCount, TextureFormat};

use super::target::AttachmentDesc;

/// How a stage sources its draw work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    /// Renders scene geometry.
    Scene,
    /// Renders a fullscreen quad (post-processing, lighting resolve).
    Fullscreen,
    /// Renders overlay content (UI, debug draw) on top of prior output.
    Overlay,
}

/// A declared dependency of one stage on an earlier stage.
///
/// All variants carry the index of the referenced stage, which must be
/// strictly smaller than the index of the stage declaring the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageLink {
    /// Reuse the referenced stage's render target wholesale (same
    /// attachments and formats; no new target is created). At most one per
    /// stage.
    Target {
        /// The earlier stage whose target is reused.
        stage: usize,
    },
    /// Alias one of this stage's attachment slots to an attachment of the
    /// referenced stage's target. No new backing image: the same underlying
    /// resource is bound again (e.g. continuing into an already-open depth
    /// buffer).
    AttachmentToAttachment {
        /// The earlier stage whose attachment is aliased.
        stage: usize,
        /// Attachment index in the referenced stage's target.
        their_attachment: usize,
        /// Attachment index in this stage's own attachment list.
        our_attachment: usize,
    },
    /// Expose an attachment of the referenced stage's target as a
    /// sampled-texture binding to this stage.
    AttachmentToTexture {
        /// The earlier stage whose attachment is sampled.
        stage: usize,
        /// Attachment index in the referenced stage's target.
        attachment: usize,
    },
}

impl StageLink {
    /// Index of the referenced (earlier) stage.
    pub fn stage(&self) -> usize {
        match *self {
            Self::Target { stage }
            | Self::AttachmentToAttachment { stage, .. }
            | Self::AttachmentToTexture { stage, .. } => stage,
        }
    }
}

/// Declarative description of one render stage.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderStageDesc {
    /// How the stage sources its draw work.
    pub kind: StageKind,
    /// Ordered attachment list. A depth-stencil attachment, if present,
    /// must be last.
    pub attachments: Vec<AttachmentDesc>,
    /// Whether the stage clears its attachments on load.
    pub clear: bool,
    /// Multisample count for the stage's target.
    pub samples: SampleCount,
    /// Dependencies on earlier stages.
    pub links: Vec<StageLink>,
}

impl RenderStageDesc {
    /// Create a new stage description with no attachments or links.
    pub fn new(kind: StageKind) -> Self {
        Self {
            kind,
            attachments: Vec::new(),
            clear: false,
            samples: SampleCount::X1,
            links: Vec::new(),
        }
    }

    /// Append an attachment.
    pub fn with_attachment(mut self, attachment: AttachmentDesc) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Append a color attachment.
    pub fn with_color(self, format: TextureFormat) -> Self {
        self.with_attachment(AttachmentDesc::color(format))
    }

    /// Append a depth-stencil attachment.
    pub fn with_depth_stencil(self, format: TextureFormat) -> Self {
        self.with_attachment(AttachmentDesc::depth_stencil(format))
    }

    /// Clear all attachments at the start of the stage.
    pub fn with_clear(mut self) -> Self {
        self.clear = true;
        self
    }

    /// Set the multisample count.
    pub fn with_samples(mut self, samples: SampleCount) -> Self {
        self.samples = samples;
        self
    }

    /// Reuse `stage`'s render target wholesale.
    pub fn with_target_link(mut self, stage: usize) -> Self {
        self.links.push(StageLink::Target { stage });
        self
    }

    /// Alias attachment `our_attachment` of this stage to attachment
    /// `their_attachment` of `stage`'s target.
    pub fn with_attachment_link(
        mut self,
        stage: usize,
        their_attachment: usize,
        our_attachment: usize,
    ) -> Self {
        self.links.push(StageLink::AttachmentToAttachment {
            stage,
            their_attachment,
            our_attachment,
        });
        self
    }

    /// Sample attachment `attachment` of `stage`'s target from this stage.
    pub fn with_texture_link(mut self, stage: usize, attachment: usize) -> Self {
        self.links
            .push(StageLink::AttachmentToTexture { stage, attachment });
        self
    }

    /// The target link of this stage, if it declares one.
    pub fn target_link(&self) -> Option<usize> {
        self.links.iter().find_map(|link| match link {
            StageLink::Target { stage } => Some(*stage),
            _ => None,
        })
    }
}

/// Declarative description of the whole multi-stage back buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct BackBufferDesc {
    /// Pixel dimensions of every stage target.
    pub dimensions: Extent2d,
    /// Stage descriptions in declaration (and execution) order.
    pub stages: Vec<RenderStageDesc>,
    /// Index of the stage whose target is presented.
    pub present_stage: usize,
}

impl BackBufferDesc {
    /// Create an empty back buffer description.
    ///
    /// The present link defaults to stage 0; use
    /// [`with_present_stage`](Self::with_present_stage) to point it at a
    /// later stage.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            dimensions: Extent2d::new(width, height),
            stages: Vec::new(),
            present_stage: 0,
        }
    }

    /// Append a stage, returning its index.
    pub fn add_stage(&mut self, stage: RenderStageDesc) -> usize {
        self.stages.push(stage);
        self.stages.len() - 1
    }

    /// Append a stage (builder form).
    pub fn with_stage(mut self, stage: RenderStageDesc) -> Self {
        self.stages.push(stage);
        self
    }

    /// Set the presented stage.
    pub fn with_present_stage(mut self, stage: usize) -> Self {
        self.present_stage = stage;
        self
    }

    /// Number of declared stages.
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_builder() {
        let stage = RenderStageDesc::new(StageKind::Scene)
            .with_color(TextureFormat::Rgba16Float)
            .with_depth_stencil(TextureFormat::Depth32Float)
            .with_clear()
            .with_samples(SampleCount::X4);

        assert_eq!(stage.attachments.len(), 2);
        assert!(stage.clear);
        assert_eq!(stage.samples, SampleCount::X4);
        assert!(stage.links.is_empty());
    }

    #[test]
    fn test_target_link_lookup() {
        let stage = RenderStageDesc::new(StageKind::Overlay)
            .with_texture_link(0, 1)
            .with_target_link(2);

        assert_eq!(stage.target_link(), Some(2));
        assert_eq!(stage.links.len(), 2);
    }

    #[test]
    fn test_link_stage_accessor() {
        assert_eq!(StageLink::Target { stage: 3 }.stage(), 3);
        assert_eq!(
            StageLink::AttachmentToAttachment {
                stage: 1,
                their_attachment: 0,
                our_attachment: 0
            }
            .stage(),
            1
        );
        assert_eq!(
            StageLink::AttachmentToTexture {
                stage: 2,
                attachment: 0
            }
            .stage(),
            2
        );
    }

    #[test]
    fn test_back_buffer_builder() {
        let mut desc = BackBufferDesc::new(1920, 1080);
        let first = desc.add_stage(
            RenderStageDesc::new(StageKind::Scene).with_color(TextureFormat::Rgba8Unorm),
        );
        let second = desc.add_stage(
            RenderStageDesc::new(StageKind::Overlay).with_target_link(first),
        );
        let desc = desc.with_present_stage(second);

        assert_eq!(first, 0);
        assert_eq!(second, 1);
        assert_eq!(desc.stage_count(), 2);
        assert_eq!(desc.present_stage, 1);
    }
}
