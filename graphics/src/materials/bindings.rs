//! Descriptor binding definitions.
//!
//! A [`DescriptorSetLayoutDesc`] describes what resources a shader expects as
//! an ordered sequence of bindings. Descriptions are cheap value types;
//! the layout cache deduplicates the native layout objects behind them.

use bitflags::bitflags;

/// Kind of resource a binding slot holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingKind {
    /// Uniform buffer (read-only, small, frequently updated).
    UniformBuffer,
    /// Storage buffer (read-write, larger data).
    StorageBuffer,
    /// Sampled texture (for reading in shaders).
    Texture,
    /// Texture sampler.
    Sampler,
    /// Combined texture and sampler.
    CombinedTextureSampler,
}

bitflags! {
    /// Shader stages that can access a binding.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShaderStageFlags: u32 {
        /// Vertex shader stage.
        const VERTEX = 1 << 0;
        /// Fragment shader stage.
        const FRAGMENT = 1 << 1;
        /// Compute shader stage.
        const COMPUTE = 1 << 2;
    }
}

/// Describes a single binding slot in a layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingDesc {
    /// Kind of resource expected at this binding.
    pub kind: BindingKind,
    /// Shader stages that can access this binding.
    pub visibility: ShaderStageFlags,
    /// Number of descriptors in the binding (array size; 1 for scalars).
    pub count: u32,
}

impl BindingDesc {
    /// Create a new binding with the given kind and count, visible to the
    /// vertex and fragment stages.
    pub fn new(kind: BindingKind, count: u32) -> Self {
        Self {
            kind,
            visibility: ShaderStageFlags::VERTEX | ShaderStageFlags::FRAGMENT,
            count,
        }
    }

    /// Set the shader stage visibility.
    pub fn with_visibility(mut self, visibility: ShaderStageFlags) -> Self {
        self.visibility = visibility;
        self
    }
}

/// Ordered sequence of bindings describing one descriptor-set layout.
///
/// Two descriptions with the same ordered (kind, count) sequence are
/// considered equivalent by the layout cache; visibility does not
/// participate in the cache key.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DescriptorSetLayoutDesc {
    bindings: Vec<BindingDesc>,
}

impl DescriptorSetLayoutDesc {
    /// Create a new empty description.
    pub fn new() -> Self {
        Self::default()
    }

    /// The ordered bindings of this description.
    pub fn bindings(&self) -> &[BindingDesc] {
        &self.bindings
    }

    /// Append a binding.
    pub fn with_binding(mut self, binding: BindingDesc) -> Self {
        self.bindings.push(binding);
        self
    }

    /// Append a single uniform buffer binding.
    pub fn with_uniform_buffer(self) -> Self {
        self.with_binding(BindingDesc::new(BindingKind::UniformBuffer, 1))
    }

    /// Append a storage buffer binding.
    pub fn with_storage_buffer(self) -> Self {
        self.with_binding(BindingDesc::new(BindingKind::StorageBuffer, 1))
    }

    /// Append an array of `count` sampled textures.
    pub fn with_textures(self, count: u32) -> Self {
        self.with_binding(BindingDesc::new(BindingKind::Texture, count))
    }

    /// Append an array of `count` combined texture-samplers.
    pub fn with_combined_samplers(self, count: u32) -> Self {
        self.with_binding(BindingDesc::new(BindingKind::CombinedTextureSampler, count))
    }

    /// The ordered (kind, count) sequence that keys the layout cache.
    pub(crate) fn cache_key(&self) -> impl Iterator<Item = (BindingKind, u32)> + '_ {
        self.bindings.iter().map(|b| (b.kind, b.count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_desc_builder() {
        let desc = DescriptorSetLayoutDesc::new()
            .with_uniform_buffer()
            .with_combined_samplers(4);

        assert_eq!(desc.bindings().len(), 2);
        assert_eq!(desc.bindings()[0].kind, BindingKind::UniformBuffer);
        assert_eq!(desc.bindings()[1].count, 4);
    }

    #[test]
    fn test_binding_visibility() {
        let binding = BindingDesc::new(BindingKind::StorageBuffer, 1)
            .with_visibility(ShaderStageFlags::COMPUTE);

        assert_eq!(binding.visibility, ShaderStageFlags::COMPUTE);
        assert!(!binding.visibility.contains(ShaderStageFlags::FRAGMENT));
    }

    #[test]
    fn test_cache_key_ignores_visibility() {
        let a = DescriptorSetLayoutDesc::new().with_binding(
            BindingDesc::new(BindingKind::Texture, 2).with_visibility(ShaderStageFlags::VERTEX),
        );
        let b = DescriptorSetLayoutDesc::new().with_binding(
            BindingDesc::new(BindingKind::Texture, 2).with_visibility(ShaderStageFlags::FRAGMENT),
        );

        assert!(a.cache_key().eq(b.cache_key()));
    }
}
