//! Lazily allocated frame buffers keyed by size and slot

use std::collections::HashMap;

use crate::backend::*;

/// Identity of a cached frame buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameBufferKey {
    pub width: u32,
    pub height: u32,
    /// Small discriminator separating buffers of equal size within one mode
    pub slot: u8,
}

impl FrameBufferKey {
    pub fn new(width: u32, height: u32, slot: u8) -> Self {
        Self {
            width,
            height,
            slot,
        }
    }
}

/// Frame buffers owned by one render mode
///
/// A key resolves to the same buffer until the cache is disposed or the entry evicted.
#[derive(Debug, Default)]
pub struct FrameBufferCache {
    label: &'static str,
    buffers: HashMap<FrameBufferKey, FrameBufferHandle>,
}

impl FrameBufferCache {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            buffers: HashMap::new(),
        }
    }

    /// Buffer for `key`, created on first use
    pub fn get(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        key: FrameBufferKey,
    ) -> BackendResult<FrameBufferHandle> {
        if let Some(handle) = self.buffers.get(&key) {
            return Ok(*handle);
        }
        let label = format!("{} {}x{}#{}", self.label, key.width, key.height, key.slot);
        let handle = backend.create_frame_buffer(&FrameBufferDescriptor::new(
            label,
            key.width,
            key.height,
        ))?;
        log::debug!("{}: allocated {:?} for {:?}", self.label, handle, key);
        self.buffers.insert(key, handle);
        Ok(handle)
    }

    /// Buffer for `key` if it was already created
    pub fn peek(&self, key: &FrameBufferKey) -> Option<FrameBufferHandle> {
        self.buffers.get(key).copied()
    }

    pub fn contains(&self, key: &FrameBufferKey) -> bool {
        self.buffers.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Destroy every buffer whose key is not in `keep`
    pub fn retain_only(&mut self, backend: &mut dyn GraphicsBackend, keep: &[FrameBufferKey]) {
        let mut evicted = 0;
        self.buffers.retain(|key, handle| {
            let kept = keep.contains(key);
            if !kept {
                backend.destroy_frame_buffer(*handle);
                evicted += 1;
            }
            kept
        });
        if evicted > 0 {
            log::debug!("{}: disposed {} frame buffers", self.label, evicted);
        }
    }

    /// Destroy every buffer
    pub fn dispose(&mut self, backend: &mut dyn GraphicsBackend) {
        self.retain_only(backend, &[]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_same_key_same_buffer() {
        let mut backend = DummyBackend::default();
        let mut cache = FrameBufferCache::new("test");
        let a = cache.get(&mut backend, FrameBufferKey::new(64, 64, 0)).unwrap();
        let b = cache.get(&mut backend, FrameBufferKey::new(64, 64, 0)).unwrap();
        assert_eq!(a, b);
        assert_eq!(backend.live_frame_buffers(), 1);
    }

    #[test]
    fn test_keys_distinct_over_mode_slots() {
        // Sizes chosen so that a w*100 + h*10 + slot style hash would collide
        let sizes = [(1, 10), (2, 0), (10, 1), (11, 0), (1920, 1080), (1080, 1920), (960, 1080), (1500, 1500), (750, 750)];
        let mut keys = HashSet::new();
        for (w, h) in sizes {
            for slot in 0..=13u8 {
                assert!(keys.insert(FrameBufferKey::new(w, h, slot)));
            }
        }
        assert_eq!(keys.len(), sizes.len() * 14);
    }

    #[test]
    fn test_distinct_keys_distinct_buffers() {
        let mut backend = DummyBackend::default();
        let mut cache = FrameBufferCache::new("test");
        let mut handles = HashSet::new();
        for slot in 0..=13u8 {
            handles.insert(cache.get(&mut backend, FrameBufferKey::new(32, 32, slot)).unwrap());
        }
        handles.insert(cache.get(&mut backend, FrameBufferKey::new(32, 16, 0)).unwrap());
        assert_eq!(handles.len(), 15);
    }

    #[test]
    fn test_retain_only_disposes_the_rest() {
        let mut backend = DummyBackend::default();
        let mut cache = FrameBufferCache::new("test");
        let keep = FrameBufferKey::new(960, 1080, 0);
        cache.get(&mut backend, keep).unwrap();
        cache.get(&mut backend, FrameBufferKey::new(1920, 1080, 1)).unwrap();
        cache.get(&mut backend, FrameBufferKey::new(800, 600, 0)).unwrap();

        cache.retain_only(&mut backend, &[keep]);

        assert_eq!(cache.len(), 1);
        assert!(cache.contains(&keep));
        assert_eq!(backend.live_frame_buffers(), 1);
    }

    #[test]
    fn test_dispose() {
        let mut backend = DummyBackend::default();
        let mut cache = FrameBufferCache::new("test");
        cache.get(&mut backend, FrameBufferKey::new(8, 8, 0)).unwrap();
        cache.dispose(&mut backend);
        assert!(cache.is_empty());
        assert_eq!(backend.live_frame_buffers(), 0);
    }
}
