//! GPU backend abstraction layer.
//!
//! This module provides a trait-based abstraction over the native graphics
//! API. The core never allocates GPU memory, creates native images, or
//! records command buffers itself; it calls into a [`RenderBackend`]
//! implementation for all of that, and only tracks the returned opaque
//! handles.
//!
//! # Available Backends
//!
//! - [`DummyBackend`](dummy::DummyBackend): no-op backend for tests and
//!   development. Records every create/destroy call so tests can assert on
//!   teardown ordering.
//!
//! Real backends (Vulkan, wgpu) add their own variants to the `Gpu*` handle
//! enums and live behind feature gates in their own crates.

pub mod dummy;

use crate::error::GraphicsError;
use crate::graph::AttachmentDesc;
use crate::materials::DescriptorSetLayoutDesc;
use crate::types::{BufferDescriptor, Extent2d, ImageDescriptor, SampleCount};

pub use dummy::{BackendEvent, DummyBackend};

/// Handle to a backend buffer resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GpuBuffer {
    /// Dummy backend (no GPU allocation).
    Dummy {
        /// Backend-assigned id.
        id: u64,
        /// Size in bytes the backend allocated.
        size: u64,
    },
}

impl GpuBuffer {
    /// Backend-assigned id of the buffer.
    pub fn id(&self) -> u64 {
        match self {
            Self::Dummy { id, .. } => *id,
        }
    }
}

/// Handle to a backend image resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GpuImage {
    /// Dummy backend (no GPU allocation).
    Dummy {
        /// Backend-assigned id.
        id: u64,
    },
}

impl GpuImage {
    /// Backend-assigned id of the image.
    pub fn id(&self) -> u64 {
        match self {
            Self::Dummy { id } => *id,
        }
    }
}

/// Handle to a backend descriptor-set layout object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GpuLayout {
    /// Dummy backend (no native layout object).
    Dummy {
        /// Backend-assigned id.
        id: u64,
    },
}

impl GpuLayout {
    /// Backend-assigned id of the layout object.
    pub fn id(&self) -> u64 {
        match self {
            Self::Dummy { id } => *id,
        }
    }
}

/// Handle to a backend render target.
///
/// A render target bundles one native image per attachment; the per-attachment
/// images are exposed so resolved sampled-texture bindings can reference them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GpuRenderTarget {
    /// Dummy backend (no GPU allocation).
    Dummy {
        /// Backend-assigned id.
        id: u64,
        /// One image per attachment, in declaration order.
        attachments: Vec<GpuImage>,
    },
}

impl GpuRenderTarget {
    /// Backend-assigned id of the target.
    pub fn id(&self) -> u64 {
        match self {
            Self::Dummy { id, .. } => *id,
        }
    }

    /// Get the native image backing attachment `index`, if it exists.
    pub fn attachment(&self, index: usize) -> Option<&GpuImage> {
        match self {
            Self::Dummy { attachments, .. } => attachments.get(index),
        }
    }

    /// Number of attachments in the target.
    pub fn attachment_count(&self) -> usize {
        match self {
            Self::Dummy { attachments, .. } => attachments.len(),
        }
    }
}

/// Backend collaborator trait.
///
/// Implementations own all native GPU object creation and destruction. The
/// core calls these synchronously from its coordinating thread; a backend may
/// dispatch GPU work asynchronously (multiple frames in flight) behind them.
/// [`wait_idle`](Self::wait_idle) is the only call that may block for
/// arbitrarily long.
pub trait RenderBackend: Send + Sync + 'static {
    /// Get the backend name.
    fn name(&self) -> &'static str;

    /// Create a buffer resource.
    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<GpuBuffer, GraphicsError>;

    /// Create an image resource.
    fn create_image(&self, descriptor: &ImageDescriptor) -> Result<GpuImage, GraphicsError>;

    /// Destroy an image resource.
    fn destroy_image(&self, image: &GpuImage);

    /// Create a native descriptor-set layout object.
    fn create_layout(
        &self,
        description: &DescriptorSetLayoutDesc,
    ) -> Result<GpuLayout, GraphicsError>;

    /// Create a render target with one attachment image per descriptor.
    fn create_render_target(
        &self,
        dimensions: Extent2d,
        attachments: &[AttachmentDesc],
        samples: SampleCount,
    ) -> Result<GpuRenderTarget, GraphicsError>;

    /// Destroy a render target and its attachment images.
    fn destroy_render_target(&self, target: &GpuRenderTarget);

    /// Block until all in-flight GPU work has completed.
    fn wait_idle(&self);

    /// Check whether the object with backend id `id` is no longer referenced
    /// by any in-flight GPU command and may be freed.
    fn signal_safe_to_free(&self, id: u64) -> bool;
}

// Handle types travel between threads alongside the resources they name.
static_assertions::assert_impl_all!(GpuBuffer: Send, Sync);
static_assertions::assert_impl_all!(GpuImage: Send, Sync);
static_assertions::assert_impl_all!(GpuLayout: Send, Sync);
static_assertions::assert_impl_all!(GpuRenderTarget: Send, Sync);
