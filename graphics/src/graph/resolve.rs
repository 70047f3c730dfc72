//! Stage graph resolution.
//!
//! [`StagePipeline::resolve`] consumes a [`BackBufferDesc`] and produces the
//! ordered, synchronized list of [`RenderStage`]s the frame submission code
//! walks. Resolution is atomic with respect to authoring mistakes: the whole
//! description is validated before any backend call, so a structural error
//! leaves the previously resolved graph untouched.
//!
//! Re-resolving (e.g. after a window resize) releases every previously
//! created backend target exactly once, in reverse stage order, before
//! creating replacements. Targets shared between stages through
//! [`StageLink::Target`] are reference counted at the arena level: the handle
//! is copied, not duplicated, and the backend object is destroyed only when
//! the last stage holding a copy has released it.

use std::sync::Arc;

use lantern_core::{Arena, Handle};

use crate::backend::{GpuImage, GpuRenderTarget, RenderBackend};
use crate::error::GraphicsError;
use crate::types::{Extent2d, SampleCount};

use super::stage::{BackBufferDesc, RenderStageDesc, StageKind, StageLink};
use super::target::{AttachmentDesc, AttachmentKind};

/// Opaque synchronization handle produced by a resolved stage.
///
/// A stage's wait-list is the set of sync handles of every stage it links
/// to; submission code maps each handle to the backend's semaphore for that
/// stage. Ids are unique across re-resolves of the same pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SyncHandle(u64);

impl SyncHandle {
    /// Numeric id of the handle.
    pub fn id(self) -> u64 {
        self.0
    }
}

/// One attachment slot aliased to an earlier stage's attachment.
#[derive(Debug, Clone)]
pub struct AttachmentAlias {
    /// Attachment index in the owning stage's target.
    pub our_attachment: usize,
    /// The earlier stage the image comes from.
    pub source_stage: usize,
    /// Attachment index in the source stage's target.
    pub source_attachment: usize,
    /// The shared backing image.
    pub image: GpuImage,
}

/// A resolved render target tracked by the pipeline's arena.
#[derive(Debug)]
pub struct TargetEntry {
    native: GpuRenderTarget,
    dimensions: Extent2d,
    samples: SampleCount,
    attachments: Vec<AttachmentDesc>,
    aliases: Vec<AttachmentAlias>,
    /// Number of resolved stages holding this target.
    refs: u32,
}

impl TargetEntry {
    /// The backend render target.
    pub fn native(&self) -> &GpuRenderTarget {
        &self.native
    }

    /// Pixel dimensions of the target.
    pub fn dimensions(&self) -> Extent2d {
        self.dimensions
    }

    /// Multisample count of the target.
    pub fn samples(&self) -> SampleCount {
        self.samples
    }

    /// Attachment descriptions, in declaration order.
    pub fn attachments(&self) -> &[AttachmentDesc] {
        &self.attachments
    }

    /// Attachment slots aliased to earlier stages' attachments.
    pub fn aliases(&self) -> &[AttachmentAlias] {
        &self.aliases
    }

    /// The image bound at attachment `index`: the aliased source image if
    /// the slot is aliased, otherwise the target's own image.
    pub fn attachment_image(&self, index: usize) -> Option<&GpuImage> {
        self.aliases
            .iter()
            .find(|alias| alias.our_attachment == index)
            .map(|alias| &alias.image)
            .or_else(|| self.native.attachment(index))
    }
}

/// One resolved stage of the pipeline.
#[derive(Debug)]
pub struct RenderStage {
    index: usize,
    clear: bool,
    target: Handle<TargetEntry>,
    sync: SyncHandle,
    wait_list: Vec<SyncHandle>,
    desc: RenderStageDesc,
}

impl RenderStage {
    /// Position of the stage in execution order.
    pub fn index(&self) -> usize {
        self.index
    }

    /// How the stage sources its draw work.
    pub fn kind(&self) -> StageKind {
        self.desc.kind
    }

    /// Whether the stage clears its attachments on load.
    pub fn clear(&self) -> bool {
        self.clear
    }

    /// Handle to the stage's render target.
    pub fn target(&self) -> Handle<TargetEntry> {
        self.target
    }

    /// Sync handle this stage signals on completion.
    pub fn sync(&self) -> SyncHandle {
        self.sync
    }

    /// Sync handles of every stage this stage must wait for.
    pub fn wait_list(&self) -> &[SyncHandle] {
        &self.wait_list
    }

    /// The original authored description.
    pub fn desc(&self) -> &RenderStageDesc {
        &self.desc
    }
}

/// A sampled-texture binding produced by a
/// [`StageLink::AttachmentToTexture`] link.
///
/// These are surfaced to the base-material system to build descriptor
/// bindings; they are not stored on the stage itself.
#[derive(Debug, Clone)]
pub struct SampledAttachment {
    /// The stage consuming the texture.
    pub stage: usize,
    /// The earlier stage producing it.
    pub source_stage: usize,
    /// Attachment index in the source stage's target.
    pub source_attachment: usize,
    /// The sampled backing image.
    pub image: GpuImage,
}

/// Owner of a resolved stage graph and its render targets.
pub struct StagePipeline {
    backend: Arc<dyn RenderBackend>,
    targets: Arena<TargetEntry>,
    stages: Vec<RenderStage>,
    sampled: Vec<SampledAttachment>,
    next_sync: u64,
}

impl StagePipeline {
    /// Create an empty pipeline backed by `backend`.
    pub fn new(backend: Arc<dyn RenderBackend>) -> Self {
        Self {
            backend,
            targets: Arena::new(),
            stages: Vec::new(),
            sampled: Vec::new(),
            next_sync: 0,
        }
    }

    /// The resolved stages, in execution order. Empty before the first
    /// successful [`resolve`](Self::resolve).
    pub fn stages(&self) -> &[RenderStage] {
        &self.stages
    }

    /// Sampled-texture bindings resolved from
    /// [`StageLink::AttachmentToTexture`] links, for the base-material
    /// system.
    pub fn sampled_attachments(&self) -> &[SampledAttachment] {
        &self.sampled
    }

    /// Look up a resolved target.
    pub fn target(&self, handle: Handle<TargetEntry>) -> Result<&TargetEntry, GraphicsError> {
        Ok(self.targets.get(handle)?)
    }

    /// Resolve `desc` into an ordered stage list.
    ///
    /// Validates the whole description first; on a structural error
    /// ([`GraphicsError::InvalidLinkReference`], [`GraphicsError::EmptyStage`],
    /// [`GraphicsError::MisplacedDepthStencil`],
    /// [`GraphicsError::InvalidPresentTarget`]) the previously resolved graph
    /// is left untouched. On success the previous graph has been torn down in
    /// reverse stage order and replaced.
    pub fn resolve(&mut self, desc: &BackBufferDesc) -> Result<&[RenderStage], GraphicsError> {
        validate(desc)?;

        self.release();

        match self.build_stages(desc) {
            Ok(()) => {
                log::debug!(
                    "resolved {} stages ({}x{})",
                    self.stages.len(),
                    desc.dimensions.width,
                    desc.dimensions.height
                );
                Ok(&self.stages)
            }
            Err(error) => {
                // A backend failure mid-build must not leave a partial graph.
                self.release();
                Err(error)
            }
        }
    }

    /// Tear down the resolved graph.
    ///
    /// Stages release their targets in reverse stage order, so a target
    /// reused by a later stage is released by that stage before the earlier
    /// stage that created it releases the last reference and the backend
    /// object is destroyed, exactly once per distinct target.
    pub fn release(&mut self) {
        if self.stages.is_empty() {
            return;
        }
        for stage in self.stages.drain(..).rev() {
            match self.targets.try_get_mut(stage.target) {
                Some(entry) => {
                    entry.refs -= 1;
                    if entry.refs == 0 {
                        if let Ok(entry) = self.targets.free(stage.target) {
                            self.backend.destroy_render_target(&entry.native);
                        }
                    }
                }
                None => {
                    log::warn!("stage {}: target already released", stage.index);
                }
            }
        }
        self.sampled.clear();
        log::debug!("released stage graph");
    }

    fn build_stages(&mut self, desc: &BackBufferDesc) -> Result<(), GraphicsError> {
        for (index, stage_desc) in desc.stages.iter().enumerate() {
            // Wait on every linked stage: this stage must not start writing
            // before its sources have finished producing what it consumes.
            let mut wait_stages: Vec<usize> = Vec::new();
            for link in &stage_desc.links {
                if !wait_stages.contains(&link.stage()) {
                    wait_stages.push(link.stage());
                }
            }
            let wait_list = wait_stages
                .iter()
                .map(|&stage| self.stages[stage].sync)
                .collect();

            let sync = SyncHandle(self.next_sync);
            self.next_sync += 1;

            let target = match stage_desc.target_link() {
                Some(previous) => {
                    if !stage_desc.attachments.is_empty() {
                        log::warn!(
                            "stage {index}: attachments are ignored when a target link is present"
                        );
                    }
                    let target = self.stages[previous].target;
                    self.targets.get_mut(target)?.refs += 1;
                    target
                }
                None => {
                    let native = self.backend.create_render_target(
                        desc.dimensions,
                        &stage_desc.attachments,
                        stage_desc.samples,
                    )?;
                    self.targets.allocate(TargetEntry {
                        native,
                        dimensions: desc.dimensions,
                        samples: stage_desc.samples,
                        attachments: stage_desc.attachments.clone(),
                        aliases: Vec::new(),
                        refs: 1,
                    })?
                }
            };

            self.stages.push(RenderStage {
                index,
                clear: stage_desc.clear,
                target,
                sync,
                wait_list,
                desc: stage_desc.clone(),
            });

            for link in &stage_desc.links {
                match *link {
                    StageLink::AttachmentToAttachment {
                        stage: source_stage,
                        their_attachment,
                        our_attachment,
                    } => {
                        let image = self.source_image(source_stage, their_attachment)?;
                        self.targets.get_mut(target)?.aliases.push(AttachmentAlias {
                            our_attachment,
                            source_stage,
                            source_attachment: their_attachment,
                            image,
                        });
                    }
                    StageLink::AttachmentToTexture {
                        stage: source_stage,
                        attachment,
                    } => {
                        let image = self.source_image(source_stage, attachment)?;
                        self.sampled.push(SampledAttachment {
                            stage: index,
                            source_stage,
                            source_attachment: attachment,
                            image,
                        });
                    }
                    StageLink::Target { .. } => {}
                }
            }
        }
        Ok(())
    }

    /// The image bound at `attachment` of `stage`'s resolved target.
    fn source_image(&self, stage: usize, attachment: usize) -> Result<GpuImage, GraphicsError> {
        let entry = self.targets.get(self.stages[stage].target)?;
        entry
            .attachment_image(attachment)
            .cloned()
            .ok_or_else(|| GraphicsError::InvalidLinkReference {
                stage,
                reason: format!("attachment {attachment} does not exist"),
            })
    }
}

impl Drop for StagePipeline {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for StagePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagePipeline")
            .field("backend", &self.backend.name())
            .field("stages", &self.stages.len())
            .field("targets", &self.targets.len())
            .finish()
    }
}

/// Validate a back buffer description before any backend work.
fn validate(desc: &BackBufferDesc) -> Result<(), GraphicsError> {
    if desc.stages.is_empty() {
        return Err(GraphicsError::InvalidPresentTarget {
            reason: "back buffer declares no stages".to_string(),
        });
    }

    for (index, stage) in desc.stages.iter().enumerate() {
        validate_stage(desc, index, stage)?;
    }

    // The present link must name a stage whose (effective) target carries a
    // color attachment that can be handed to the swapchain.
    if desc.present_stage >= desc.stages.len() {
        return Err(GraphicsError::InvalidPresentTarget {
            reason: format!("present stage {} does not exist", desc.present_stage),
        });
    }
    let presented = effective_attachments(desc, desc.present_stage);
    if !presented
        .iter()
        .any(|attachment| attachment.kind == AttachmentKind::Color)
    {
        return Err(GraphicsError::InvalidPresentTarget {
            reason: format!(
                "present stage {} has no color attachment",
                desc.present_stage
            ),
        });
    }

    Ok(())
}

fn validate_stage(
    desc: &BackBufferDesc,
    index: usize,
    stage: &RenderStageDesc,
) -> Result<(), GraphicsError> {
    // Links may only point backwards; this is what keeps the graph a DAG.
    for link in &stage.links {
        if link.stage() >= index {
            return Err(GraphicsError::InvalidLinkReference {
                stage: index,
                reason: format!("link references stage {}, which is not earlier", link.stage()),
            });
        }
    }

    let target_links = stage
        .links
        .iter()
        .filter(|link| matches!(link, StageLink::Target { .. }))
        .count();
    if target_links > 1 {
        return Err(GraphicsError::InvalidLinkReference {
            stage: index,
            reason: "more than one target link".to_string(),
        });
    }

    let has_target_link = target_links == 1;
    if !has_target_link {
        if stage.attachments.is_empty() {
            return Err(GraphicsError::EmptyStage { stage: index });
        }
        // Depth-stencil, when present, is required to close the attachment
        // list. (Render pass encoding relies on this ordering.)
        let depth_count = stage
            .attachments
            .iter()
            .filter(|attachment| attachment.kind == AttachmentKind::DepthStencil)
            .count();
        if depth_count > 1 {
            return Err(GraphicsError::MisplacedDepthStencil { stage: index });
        }
        if let Some(position) = stage
            .attachments
            .iter()
            .position(|attachment| attachment.kind == AttachmentKind::DepthStencil)
        {
            if position != stage.attachments.len() - 1 {
                return Err(GraphicsError::MisplacedDepthStencil { stage: index });
            }
        }
        for attachment in &stage.attachments {
            let format_matches = match attachment.kind {
                AttachmentKind::Color => attachment.format.is_color(),
                AttachmentKind::DepthStencil => attachment.format.is_depth_stencil(),
            };
            if !format_matches {
                return Err(GraphicsError::InvalidParameter(format!(
                    "stage {index}: attachment kind {:?} does not match format {:?}",
                    attachment.kind, attachment.format
                )));
            }
        }
    }

    for link in &stage.links {
        match *link {
            StageLink::AttachmentToAttachment {
                stage: source,
                their_attachment,
                our_attachment,
            } => {
                if has_target_link {
                    return Err(GraphicsError::InvalidLinkReference {
                        stage: index,
                        reason: "attachment links cannot be combined with a target link"
                            .to_string(),
                    });
                }
                let theirs = effective_attachments(desc, source);
                let Some(their_desc) = theirs.get(their_attachment) else {
                    return Err(GraphicsError::InvalidLinkReference {
                        stage: index,
                        reason: format!(
                            "stage {source} has no attachment {their_attachment}"
                        ),
                    });
                };
                let Some(our_desc) = stage.attachments.get(our_attachment) else {
                    return Err(GraphicsError::InvalidLinkReference {
                        stage: index,
                        reason: format!("no local attachment {our_attachment}"),
                    });
                };
                if their_desc != our_desc {
                    return Err(GraphicsError::InvalidLinkReference {
                        stage: index,
                        reason: format!(
                            "aliased attachments differ: {their_desc:?} vs {our_desc:?}"
                        ),
                    });
                }
            }
            StageLink::AttachmentToTexture {
                stage: source,
                attachment,
            } => {
                let theirs = effective_attachments(desc, source);
                if attachment >= theirs.len() {
                    return Err(GraphicsError::InvalidLinkReference {
                        stage: index,
                        reason: format!("stage {source} has no attachment {attachment}"),
                    });
                }
            }
            StageLink::Target { .. } => {}
        }
    }

    Ok(())
}

/// The attachment list a stage's target effectively has, following target
/// links back to the stage that creates the target.
///
/// Callers must have validated that links point strictly backwards; the walk
/// terminates because every hop decreases the index.
fn effective_attachments(desc: &BackBufferDesc, mut index: usize) -> &[AttachmentDesc] {
    loop {
        match desc.stages[index].target_link() {
            Some(previous) => index = previous,
            None => return &desc.stages[index].attachments,
        }
    }
}
