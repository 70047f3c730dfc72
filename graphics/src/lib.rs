//! # Lantern Graphics
//!
//! Resource management core for the Lantern renderer.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`graph`] - Declarative stage descriptions resolved into an ordered,
//!   synchronized stage list
//! - [`resources`] - Partitioned buffer sub-allocation with exclusive and
//!   shared reservations
//! - [`materials`] - Descriptor binding descriptions and the deduplicating
//!   layout cache
//! - [`backend`] - Trait for the native GPU backend, with a dummy
//!   implementation for tests
//!
//! Everything that owns GPU-visible resources hands out generation-checked
//! handles from [`lantern_core::Arena`], so stale references fail loudly
//! instead of touching freed memory.

pub mod backend;
pub mod error;
pub mod graph;
pub mod materials;
pub mod resources;
pub mod types;

// Re-export main types for convenience
pub use backend::{DummyBackend, RenderBackend};
pub use error::GraphicsError;
pub use graph::{BackBufferDesc, RenderStage, RenderStageDesc, StageKind, StagePipeline};
pub use materials::{DescriptorLayoutCache, DescriptorSetLayoutDesc};
pub use resources::{BufferReservation, PartitionedBuffer};
pub use types::{
    BufferDescriptor, BufferSharing, BufferUsage, Extent2d, ReservationRequest, SampleCount,
    TextureFormat,
};

/// Graphics library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the graphics subsystem.
///
/// This should be called before using any graphics functionality.
pub fn init() {
    lantern_core::init();
    log::info!("Lantern Graphics v{} initialized", VERSION);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_dummy_backend_name() {
        let backend = DummyBackend::new();
        assert_eq!(RenderBackend::name(&backend), "Dummy");
    }
}
