//! Render stage graph.
//!
//! The stage graph turns a declarative multi-stage pipeline description into
//! an ordered, synchronized execution plan:
//!
//! - [`BackBufferDesc`] / [`RenderStageDesc`] - the authored description:
//!   stages, their attachments, and [`StageLink`]s between them
//! - [`StagePipeline`] - resolves a description into [`RenderStage`]s with
//!   backend targets and per-stage wait-lists
//!
//! Links may only reference strictly earlier stages, so the dependency
//! structure is a DAG by construction and declaration order is execution
//! order.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use lantern_graphics::backend::DummyBackend;
//! use lantern_graphics::graph::{BackBufferDesc, RenderStageDesc, StageKind, StagePipeline};
//! use lantern_graphics::types::TextureFormat;
//!
//! let desc = BackBufferDesc::new(1920, 1080)
//!     .with_stage(
//!         RenderStageDesc::new(StageKind::Scene)
//!             .with_color(TextureFormat::Rgba16Float)
//!             .with_depth_stencil(TextureFormat::Depth32Float)
//!             .with_clear(),
//!     )
//!     .with_stage(
//!         RenderStageDesc::new(StageKind::Fullscreen)
//!             .with_color(TextureFormat::Bgra8Unorm)
//!             .with_texture_link(0, 0),
//!     )
//!     .with_present_stage(1);
//!
//! let mut pipeline = StagePipeline::new(Arc::new(DummyBackend::new()));
//! let stages = pipeline.resolve(&desc)?;
//! assert_eq!(stages.len(), 2);
//! # Ok::<(), lantern_graphics::GraphicsError>(())
//! ```

mod resolve;
mod stage;
mod target;

pub use resolve::{
    AttachmentAlias, RenderStage, SampledAttachment, StagePipeline, SyncHandle, TargetEntry,
};
pub use stage::{BackBufferDesc, RenderStageDesc, StageKind, StageLink};
pub use target::{AttachmentDesc, AttachmentKind};
