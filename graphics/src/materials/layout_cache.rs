//! Descriptor-set layout deduplication.
//!
//! Native layout objects are expensive enough to be worth sharing: materials
//! across a scene overwhelmingly repeat the same binding sequences ("one
//! uniform buffer, then N samplers"). The cache deduplicates them behind a
//! prefix tree keyed one (kind, count) pair at a time, so sequences that
//! share a prefix share the interior nodes and only the deepest
//! distinguishing binding adds a node. Sequences are short (single-digit
//! length) and created at setup time, so the extra pointer hop per binding
//! versus hashing the whole sequence does not matter.

use std::sync::Arc;

use lantern_core::{Arena, Handle};
use parking_lot::Mutex;

use crate::backend::{GpuLayout, RenderBackend};
use crate::error::GraphicsError;

use super::{BindingDesc, BindingKind, DescriptorSetLayoutDesc};

/// A cached descriptor-set layout.
///
/// Cheap to clone: the native object handle and the binding list are shared.
#[derive(Debug, Clone)]
pub struct DescriptorSetLayout {
    native: GpuLayout,
    bindings: Arc<[BindingDesc]>,
}

impl DescriptorSetLayout {
    /// The backend layout object.
    pub fn native(&self) -> &GpuLayout {
        &self.native
    }

    /// The ordered bindings this layout was created from.
    pub fn bindings(&self) -> &[BindingDesc] {
        &self.bindings
    }
}

#[derive(Default)]
struct TrieNode {
    /// Cached layout for the sequence ending at this node.
    layout: Option<Handle<DescriptorSetLayout>>,
    /// Children keyed by the next (kind, count) pair. Linear scan: binding
    /// sequences are short and fan-out per node is small.
    children: Vec<((BindingKind, u32), TrieNode)>,
}

impl TrieNode {
    fn child_mut(&mut self, key: (BindingKind, u32)) -> &mut TrieNode {
        let position = self.children.iter().position(|(k, _)| *k == key);
        let index = match position {
            Some(index) => index,
            None => {
                self.children.push((key, TrieNode::default()));
                self.children.len() - 1
            }
        };
        &mut self.children[index].1
    }
}

struct CacheInner {
    root: TrieNode,
    layouts: Arena<DescriptorSetLayout>,
}

/// Deduplicating cache of descriptor-set layouts.
///
/// `get_or_create` creates the backend layout object only on the first visit
/// of a binding sequence; later calls (and racing concurrent calls) observe
/// the same handle. The cache belongs to its owning pipeline or resource
/// manager; it is deliberately not a global singleton.
pub struct DescriptorLayoutCache {
    backend: Arc<dyn RenderBackend>,
    inner: Mutex<CacheInner>,
}

impl DescriptorLayoutCache {
    /// Create an empty cache backed by `backend`.
    pub fn new(backend: Arc<dyn RenderBackend>) -> Self {
        Self {
            backend,
            inner: Mutex::new(CacheInner {
                root: TrieNode::default(),
                layouts: Arena::new(),
            }),
        }
    }

    /// Resolve `description` to its cached layout, creating the backend
    /// object on first visit.
    ///
    /// The cache lock is held across backend creation: when two threads race
    /// on a not-yet-cached sequence, exactly one backend layout object is
    /// created and both observe the same handle.
    pub fn get_or_create(
        &self,
        description: &DescriptorSetLayoutDesc,
    ) -> Result<Handle<DescriptorSetLayout>, GraphicsError> {
        let mut inner = self.inner.lock();

        let mut node = &mut inner.root;
        for key in description.cache_key() {
            node = node.child_mut(key);
        }

        if let Some(handle) = node.layout {
            return Ok(handle);
        }

        log::trace!(
            "layout cache miss: creating layout with {} bindings",
            description.bindings().len()
        );
        let native = self.backend.create_layout(description)?;
        let layout = DescriptorSetLayout {
            native,
            bindings: description.bindings().into(),
        };

        // Second walk under the same lock; the allocation needs `inner` too.
        let handle = inner.layouts.allocate(layout)?;
        let mut node = &mut inner.root;
        for key in description.cache_key() {
            node = node.child_mut(key);
        }
        node.layout = Some(handle);
        Ok(handle)
    }

    /// Get the cached layout behind `handle`.
    pub fn get(
        &self,
        handle: Handle<DescriptorSetLayout>,
    ) -> Result<DescriptorSetLayout, GraphicsError> {
        let inner = self.inner.lock();
        Ok(inner.layouts.get(handle)?.clone())
    }

    /// Number of distinct layouts cached so far.
    pub fn len(&self) -> usize {
        self.inner.lock().layouts.len()
    }

    /// Check whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for DescriptorLayoutCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DescriptorLayoutCache")
            .field("backend", &self.backend.name())
            .field("layouts", &self.len())
            .finish()
    }
}

static_assertions::assert_impl_all!(DescriptorLayoutCache: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DummyBackend;
    use crate::materials::ShaderStageFlags;

    fn create_cache() -> (Arc<DummyBackend>, DescriptorLayoutCache) {
        let backend = Arc::new(DummyBackend::new());
        let cache = DescriptorLayoutCache::new(backend.clone());
        (backend, cache)
    }

    #[test]
    fn test_identical_sequences_share_a_layout() {
        let (backend, cache) = create_cache();
        let desc = DescriptorSetLayoutDesc::new()
            .with_uniform_buffer()
            .with_combined_samplers(3);

        let a = cache.get_or_create(&desc).unwrap();
        let b = cache.get_or_create(&desc.clone()).unwrap();

        assert_eq!(a, b);
        assert_eq!(backend.layouts_created(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_different_sequences_get_different_layouts() {
        let (backend, cache) = create_cache();
        let a = cache
            .get_or_create(&DescriptorSetLayoutDesc::new().with_uniform_buffer())
            .unwrap();
        let b = cache
            .get_or_create(&DescriptorSetLayoutDesc::new().with_storage_buffer())
            .unwrap();

        assert_ne!(a, b);
        assert_eq!(backend.layouts_created(), 2);
    }

    #[test]
    fn test_prefix_is_a_distinct_sequence() {
        let (_, cache) = create_cache();
        let long = DescriptorSetLayoutDesc::new()
            .with_uniform_buffer()
            .with_combined_samplers(2);
        let prefix = DescriptorSetLayoutDesc::new().with_uniform_buffer();

        let a = cache.get_or_create(&long).unwrap();
        let b = cache.get_or_create(&prefix).unwrap();

        assert_ne!(a, b);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_count_distinguishes_sequences() {
        let (_, cache) = create_cache();
        let a = cache
            .get_or_create(&DescriptorSetLayoutDesc::new().with_textures(2))
            .unwrap();
        let b = cache
            .get_or_create(&DescriptorSetLayoutDesc::new().with_textures(3))
            .unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_visibility_does_not_split_the_cache() {
        let (backend, cache) = create_cache();
        let vertex = DescriptorSetLayoutDesc::new().with_binding(
            BindingDesc::new(BindingKind::UniformBuffer, 1)
                .with_visibility(ShaderStageFlags::VERTEX),
        );
        let fragment = DescriptorSetLayoutDesc::new().with_binding(
            BindingDesc::new(BindingKind::UniformBuffer, 1)
                .with_visibility(ShaderStageFlags::FRAGMENT),
        );

        let a = cache.get_or_create(&vertex).unwrap();
        let b = cache.get_or_create(&fragment).unwrap();

        assert_eq!(a, b);
        assert_eq!(backend.layouts_created(), 1);
    }

    #[test]
    fn test_empty_description_caches_at_root() {
        let (backend, cache) = create_cache();
        let a = cache.get_or_create(&DescriptorSetLayoutDesc::new()).unwrap();
        let b = cache.get_or_create(&DescriptorSetLayoutDesc::new()).unwrap();

        assert_eq!(a, b);
        assert_eq!(backend.layouts_created(), 1);
    }

    #[test]
    fn test_get_returns_bindings() {
        let (_, cache) = create_cache();
        let desc = DescriptorSetLayoutDesc::new().with_textures(4);
        let handle = cache.get_or_create(&desc).unwrap();

        let layout = cache.get(handle).unwrap();
        assert_eq!(layout.bindings(), desc.bindings());
    }

    #[test]
    fn test_racing_creation_yields_one_object() {
        let (backend, cache) = create_cache();
        let cache = &cache;
        let desc = DescriptorSetLayoutDesc::new()
            .with_uniform_buffer()
            .with_combined_samplers(8);

        let handles: Vec<_> = std::thread::scope(|scope| {
            let threads: Vec<_> = (0..4)
                .map(|_| {
                    let desc = desc.clone();
                    scope.spawn(move || cache.get_or_create(&desc).unwrap())
                })
                .collect();
            threads.into_iter().map(|t| t.join().unwrap()).collect()
        });

        assert!(handles.windows(2).all(|pair| pair[0] == pair[1]));
        assert_eq!(backend.layouts_created(), 1);
    }
}
