//! Graphics error types.

use lantern_core::ArenaError;
use thiserror::Error;

/// Errors that can occur in the graphics system.
///
/// Every fallible operation returns one of these to its immediate caller;
/// nothing is swallowed. [`GraphicsError::OutOfSpace`] is recoverable (the
/// caller may release reservations and retry), while the graph-resolution
/// variants indicate structural authoring mistakes and fail the whole
/// resolution atomically.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphicsError {
    /// A handle lookup failed.
    #[error(transparent)]
    Arena(#[from] ArenaError),
    /// An invalid parameter was provided.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    /// No free block is large enough for the requested reservation and the
    /// backing buffer cannot grow.
    #[error("out of space: no free block large enough for the reservation")]
    OutOfSpace,
    /// The reservation's block handle no longer resolves.
    #[error("unknown reservation: block handle no longer valid")]
    UnknownReservation,
    /// A stage link does not point at a strictly earlier stage, or names an
    /// attachment slot that does not exist.
    #[error("stage {stage}: invalid link reference: {reason}")]
    InvalidLinkReference {
        /// Index of the stage declaring the link.
        stage: usize,
        /// What was wrong with the link.
        reason: String,
    },
    /// A stage ends up with no attachments at all.
    #[error("stage {stage} has no attachments")]
    EmptyStage {
        /// Index of the offending stage.
        stage: usize,
    },
    /// A depth-stencil attachment is declared anywhere but last.
    #[error("stage {stage}: the depth-stencil attachment must be the last attachment")]
    MisplacedDepthStencil {
        /// Index of the offending stage.
        stage: usize,
    },
    /// The present link does not name a presentable stage.
    #[error("invalid present target: {reason}")]
    InvalidPresentTarget {
        /// Why the named stage cannot be presented.
        reason: String,
    },
    /// The backend collaborator failed.
    #[error("backend error: {0}")]
    Backend(String),
}
