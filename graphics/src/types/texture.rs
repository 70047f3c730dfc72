//! Image formats and descriptors.

use bitflags::bitflags;

use super::Extent2d;

/// Pixel format of an image or attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureFormat {
    /// 8-bit RGBA, unsigned normalized.
    #[default]
    Rgba8Unorm,
    /// 8-bit BGRA, unsigned normalized. Common swapchain format.
    Bgra8Unorm,
    /// 16-bit float RGBA. Used for HDR intermediate targets.
    Rgba16Float,
    /// 32-bit float depth.
    Depth32Float,
    /// 24-bit depth with 8-bit stencil.
    Depth24PlusStencil8,
}

impl TextureFormat {
    /// Check whether this is a depth or depth-stencil format.
    pub fn is_depth_stencil(self) -> bool {
        matches!(self, Self::Depth32Float | Self::Depth24PlusStencil8)
    }

    /// Check whether this is a color format.
    pub fn is_color(self) -> bool {
        !self.is_depth_stencil()
    }
}

bitflags! {
    /// Usage flags for images.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureUsage: u32 {
        /// Image can be bound as a render target attachment.
        const RENDER_ATTACHMENT = 1 << 0;
        /// Image can be sampled in shaders.
        const SAMPLED = 1 << 1;
        /// Image can be copied from.
        const COPY_SRC = 1 << 2;
        /// Image can be copied to.
        const COPY_DST = 1 << 3;
    }
}

impl Default for TextureUsage {
    fn default() -> Self {
        Self::empty()
    }
}

/// Descriptor for creating an image.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ImageDescriptor {
    /// Debug label for the image.
    pub label: Option<String>,
    /// Image dimensions in pixels.
    pub size: Extent2d,
    /// Pixel format.
    pub format: TextureFormat,
    /// Usage flags.
    pub usage: TextureUsage,
}

impl ImageDescriptor {
    /// Create a new 2D image descriptor.
    pub fn new_2d(width: u32, height: u32, format: TextureFormat, usage: TextureUsage) -> Self {
        Self {
            label: None,
            size: Extent2d::new(width, height),
            format,
            usage,
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}
