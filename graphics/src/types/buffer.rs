//! Buffer types and descriptors.

use bitflags::bitflags;

bitflags! {
    /// Usage flags for buffers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        /// Buffer can be used as a vertex buffer.
        const VERTEX = 1 << 0;
        /// Buffer can be used as an index buffer.
        const INDEX = 1 << 1;
        /// Buffer can be used as a uniform buffer.
        const UNIFORM = 1 << 2;
        /// Buffer can be used as a storage buffer.
        const STORAGE = 1 << 3;
        /// Buffer can be copied from.
        const COPY_SRC = 1 << 4;
        /// Buffer can be copied to.
        const COPY_DST = 1 << 5;
    }
}

impl Default for BufferUsage {
    fn default() -> Self {
        Self::empty()
    }
}

/// Descriptor for creating a buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct BufferDescriptor {
    /// Debug label for the buffer.
    pub label: Option<String>,
    /// Size in bytes.
    pub size: u64,
    /// Usage flags.
    pub usage: BufferUsage,
}

impl BufferDescriptor {
    /// Create a new buffer descriptor.
    pub fn new(size: u64, usage: BufferUsage) -> Self {
        Self {
            label: None,
            size,
            usage,
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// How a reservation shares its block with other reservations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BufferSharing {
    /// The reservation owns its block; no other reservation may overlap it.
    #[default]
    Exclusive,
    /// Multiple reservations co-reside in one block at bump-allocated
    /// offsets. The block is only returned to the free set once every
    /// co-resident reservation has been released.
    Shared,
}

/// A request for a sub-range of a partitioned buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReservationRequest {
    /// Requested size in bytes. The granted size is rounded up to the
    /// buffer's partition granularity.
    pub size: u64,
    /// How the reservation will be used. Must be a subset of the backing
    /// buffer's usage flags.
    pub usage: BufferUsage,
    /// Sharing semantics for the reservation's block.
    pub sharing: BufferSharing,
}

impl ReservationRequest {
    /// Create an exclusive reservation request.
    pub fn exclusive(size: u64, usage: BufferUsage) -> Self {
        Self {
            size,
            usage,
            sharing: BufferSharing::Exclusive,
        }
    }

    /// Create a shared reservation request.
    pub fn shared(size: u64, usage: BufferUsage) -> Self {
        Self {
            size,
            usage,
            sharing: BufferSharing::Shared,
        }
    }
}
