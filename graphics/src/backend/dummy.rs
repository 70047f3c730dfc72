//! Dummy GPU backend for testing and development.
//!
//! This backend performs no GPU work but hands out valid handles, so the
//! resource-management core can run without GPU hardware. Every create and
//! destroy call is appended to an event log that tests can inspect to verify
//! teardown ordering and exactly-once destruction.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::error::GraphicsError;
use crate::graph::AttachmentDesc;
use crate::materials::DescriptorSetLayoutDesc;
use crate::types::{BufferDescriptor, Extent2d, ImageDescriptor, SampleCount};

use super::{GpuBuffer, GpuImage, GpuLayout, GpuRenderTarget, RenderBackend};

/// One recorded backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendEvent {
    /// A buffer was created.
    CreateBuffer {
        /// Backend-assigned id.
        id: u64,
        /// Requested size in bytes.
        size: u64,
    },
    /// An image was created.
    CreateImage {
        /// Backend-assigned id.
        id: u64,
    },
    /// An image was destroyed.
    DestroyImage {
        /// Backend-assigned id.
        id: u64,
    },
    /// A descriptor-set layout object was created.
    CreateLayout {
        /// Backend-assigned id.
        id: u64,
        /// Number of bindings in the description.
        bindings: usize,
    },
    /// A render target was created.
    CreateRenderTarget {
        /// Backend-assigned id.
        id: u64,
        /// Number of attachments.
        attachments: usize,
    },
    /// A render target was destroyed.
    DestroyRenderTarget {
        /// Backend-assigned id.
        id: u64,
    },
}

/// Dummy GPU backend.
#[derive(Debug, Default)]
pub struct DummyBackend {
    next_id: AtomicU64,
    events: Mutex<Vec<BackendEvent>>,
}

impl DummyBackend {
    /// Create a new dummy backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a snapshot of the recorded events.
    pub fn events(&self) -> Vec<BackendEvent> {
        self.events.lock().clone()
    }

    /// Clear the recorded events.
    pub fn clear_events(&self) {
        self.events.lock().clear();
    }

    /// Number of layout objects created so far.
    pub fn layouts_created(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|event| matches!(event, BackendEvent::CreateLayout { .. }))
            .count()
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn record(&self, event: BackendEvent) {
        self.events.lock().push(event);
    }
}

impl RenderBackend for DummyBackend {
    fn name(&self) -> &'static str {
        "Dummy"
    }

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<GpuBuffer, GraphicsError> {
        let id = self.next_id();
        log::trace!(
            "DummyBackend: creating buffer {:?} (size: {})",
            descriptor.label,
            descriptor.size
        );
        self.record(BackendEvent::CreateBuffer {
            id,
            size: descriptor.size,
        });
        Ok(GpuBuffer::Dummy {
            id,
            size: descriptor.size,
        })
    }

    fn create_image(&self, descriptor: &ImageDescriptor) -> Result<GpuImage, GraphicsError> {
        let id = self.next_id();
        log::trace!(
            "DummyBackend: creating image {:?} ({}x{})",
            descriptor.label,
            descriptor.size.width,
            descriptor.size.height
        );
        self.record(BackendEvent::CreateImage { id });
        Ok(GpuImage::Dummy { id })
    }

    fn destroy_image(&self, image: &GpuImage) {
        log::trace!("DummyBackend: destroying image {}", image.id());
        self.record(BackendEvent::DestroyImage { id: image.id() });
    }

    fn create_layout(
        &self,
        description: &DescriptorSetLayoutDesc,
    ) -> Result<GpuLayout, GraphicsError> {
        let id = self.next_id();
        log::trace!(
            "DummyBackend: creating layout with {} bindings",
            description.bindings().len()
        );
        self.record(BackendEvent::CreateLayout {
            id,
            bindings: description.bindings().len(),
        });
        Ok(GpuLayout::Dummy { id })
    }

    fn create_render_target(
        &self,
        dimensions: Extent2d,
        attachments: &[AttachmentDesc],
        samples: SampleCount,
    ) -> Result<GpuRenderTarget, GraphicsError> {
        let id = self.next_id();
        log::trace!(
            "DummyBackend: creating render target {}x{} with {} attachments, {} samples",
            dimensions.width,
            dimensions.height,
            attachments.len(),
            samples.samples()
        );
        let images = attachments
            .iter()
            .map(|_| GpuImage::Dummy { id: self.next_id() })
            .collect();
        self.record(BackendEvent::CreateRenderTarget {
            id,
            attachments: attachments.len(),
        });
        Ok(GpuRenderTarget::Dummy {
            id,
            attachments: images,
        })
    }

    fn destroy_render_target(&self, target: &GpuRenderTarget) {
        log::trace!("DummyBackend: destroying render target {}", target.id());
        self.record(BackendEvent::DestroyRenderTarget { id: target.id() });
    }

    fn wait_idle(&self) {
        log::trace!("DummyBackend: wait_idle");
    }

    fn signal_safe_to_free(&self, _id: u64) -> bool {
        // No GPU work is ever in flight, so everything is always safe.
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BufferUsage;

    #[test]
    fn test_ids_are_unique() {
        let backend = DummyBackend::new();
        let a = backend
            .create_buffer(&BufferDescriptor::new(64, BufferUsage::UNIFORM))
            .unwrap();
        let b = backend
            .create_buffer(&BufferDescriptor::new(64, BufferUsage::UNIFORM))
            .unwrap();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_event_log_records_calls() {
        let backend = DummyBackend::new();
        let buffer = backend
            .create_buffer(&BufferDescriptor::new(128, BufferUsage::VERTEX))
            .unwrap();

        assert_eq!(
            backend.events(),
            vec![BackendEvent::CreateBuffer {
                id: buffer.id(),
                size: 128
            }]
        );

        backend.clear_events();
        assert!(backend.events().is_empty());
    }

    #[test]
    fn test_render_target_has_per_attachment_images() {
        use crate::graph::AttachmentDesc;
        use crate::types::TextureFormat;

        let backend = DummyBackend::new();
        let target = backend
            .create_render_target(
                Extent2d::new(640, 480),
                &[
                    AttachmentDesc::color(TextureFormat::Rgba8Unorm),
                    AttachmentDesc::depth_stencil(TextureFormat::Depth32Float),
                ],
                SampleCount::X1,
            )
            .unwrap();

        assert_eq!(target.attachment_count(), 2);
        assert!(target.attachment(0).is_some());
        assert!(target.attachment(2).is_none());
    }

    #[test]
    fn test_image_create_destroy_round_trip() {
        use crate::types::{TextureFormat, TextureUsage};

        let backend = DummyBackend::new();
        let image = backend
            .create_image(&ImageDescriptor::new_2d(
                128,
                128,
                TextureFormat::Rgba8Unorm,
                TextureUsage::SAMPLED,
            ))
            .unwrap();
        backend.destroy_image(&image);

        assert_eq!(
            backend.events(),
            vec![
                BackendEvent::CreateImage { id: image.id() },
                BackendEvent::DestroyImage { id: image.id() },
            ]
        );
    }

    #[test]
    fn test_always_safe_to_free() {
        let backend = DummyBackend::new();
        assert!(backend.signal_safe_to_free(1));
    }
}
