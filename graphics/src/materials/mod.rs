//! Material-facing binding descriptions and layout caching.

mod bindings;
mod layout_cache;

pub use bindings::{BindingDesc, BindingKind, DescriptorSetLayoutDesc, ShaderStageFlags};
pub use layout_cache::{DescriptorLayoutCache, DescriptorSetLayout};
