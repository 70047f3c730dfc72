//! Common types and descriptors for graphics resources.
//!
//! This module contains format enums, usage flags, and descriptor structs
//! used throughout the graphics system.

mod buffer;
mod common;
mod texture;

pub use buffer::{BufferDescriptor, BufferSharing, BufferUsage, ReservationRequest};
pub use common::{Extent2d, SampleCount};
pub use texture::{ImageDescriptor, TextureFormat, TextureUsage};
