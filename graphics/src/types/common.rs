//! Common types shared across the graphics system.

/// Two-dimensional extent in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Extent2d {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Extent2d {
    /// Create a new extent.
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Total number of pixels covered by the extent.
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

/// Multisample count for a render target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SampleCount {
    /// No multisampling.
    #[default]
    X1,
    /// 2x MSAA.
    X2,
    /// 4x MSAA.
    X4,
    /// 8x MSAA.
    X8,
}

impl SampleCount {
    /// Number of samples per pixel.
    pub fn samples(self) -> u32 {
        match self {
            Self::X1 => 1,
            Self::X2 => 2,
            Self::X4 => 4,
            Self::X8 => 8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extent_area() {
        assert_eq!(Extent2d::new(1920, 1080).area(), 2_073_600);
        assert_eq!(Extent2d::default().area(), 0);
    }

    #[test]
    fn test_sample_count() {
        assert_eq!(SampleCount::default(), SampleCount::X1);
        assert_eq!(SampleCount::X4.samples(), 4);
    }
}
