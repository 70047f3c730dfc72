//! # Lantern Core
//!
//! Core crate for the Lantern renderer: generation-checked handle storage
//! shared by every resource-owning subsystem.

pub mod arena;

pub use arena::{Arena, ArenaError, Handle};

/// Core library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Log the core library version at startup.
pub fn init() {
    log::info!("Lantern Core v{} initialized", VERSION);
}
