use crate::core::constants::TEXTURE_HINT_RESOLVED;
use crate::pyramid::node::NodeId;
use crate::rendering::texture::TextureResource;
use crate::traits::CacheStats;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Identifies a tile texture across pyramids sharing one cache
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub uri: Arc<str>,
    pub id: NodeId,
}

impl CacheKey {
    pub fn new(uri: Arc<str>, id: NodeId) -> Self {
        Self { uri, id }
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{}", self.uri, self.id)
    }
}

#[derive(Debug)]
pub struct CacheEntry {
    pub texture: TextureResource,
    pub hints: u32,
    /// Tile version the texture was loaded at
    pub version: u64,
}

impl CacheEntry {
    pub fn has_hint(&self, hint: u32) -> bool {
        self.hints & hint == hint
    }

    pub fn is_resolved(&self) -> bool {
        self.has_hint(TEXTURE_HINT_RESOLVED)
    }
}

/// Textures released by nodes that may be needed again soon
///
/// Bounded by entry count and by texture bytes; least recently used entries
/// go first. The cache owns its textures but never touches the GPU: anything
/// it lets go of is handed back to the caller to destroy.
#[derive(Debug)]
pub struct TextureCache {
    entries: LruCache<CacheKey, CacheEntry>,
    max_bytes: usize,
    bytes: usize,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl TextureCache {
    pub fn new(capacity: usize, max_bytes: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
            max_bytes,
            bytes: 0,
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    /// Looks up an entry and marks it recently used
    pub fn get(&mut self, key: &CacheKey) -> Option<&CacheEntry> {
        let entry = self.entries.get(key);
        if entry.is_some() {
            self.hits += 1;
        } else {
            self.misses += 1;
        }
        entry
    }

    /// Looks up an entry without touching recency or statistics
    pub fn peek(&self, key: &CacheKey) -> Option<&CacheEntry> {
        self.entries.peek(key)
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.contains(key)
    }

    /// Takes an entry out of the cache, handing its texture to the caller
    pub fn remove(&mut self, key: &CacheKey) -> Option<CacheEntry> {
        match self.entries.pop(key) {
            Some(entry) => {
                self.hits += 1;
                self.bytes -= entry.texture.byte_size();
                Some(entry)
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Parks `texture` under `key`. Returns the textures that no longer fit,
    /// which the caller must destroy.
    pub fn put(
        &mut self,
        key: CacheKey,
        texture: TextureResource,
        hints: u32,
        version: u64,
    ) -> Vec<TextureResource> {
        let mut evicted = Vec::new();
        let size = texture.byte_size();

        if let Some(old) = self.entries.pop(&key) {
            self.bytes -= old.texture.byte_size();
            evicted.push(old.texture);
        }
        if size > self.max_bytes {
            log::trace!("{} is larger than the whole cache, not cached", key);
            evicted.push(texture);
            return evicted;
        }

        while self.entries.len() >= self.entries.cap().get() || self.bytes + size > self.max_bytes {
            let Some((old_key, old)) = self.entries.pop_lru() else {
                break;
            };
            log::trace!("evicted {} from texture cache", old_key);
            self.bytes -= old.texture.byte_size();
            self.evictions += 1;
            evicted.push(old.texture);
        }

        self.bytes += size;
        if let Some((_, displaced)) = self.entries.push(
            key,
            CacheEntry {
                texture,
                hints,
                version,
            },
        ) {
            self.bytes -= displaced.texture.byte_size();
            evicted.push(displaced.texture);
        }
        evicted
    }

    /// Empties the cache, returning every texture it held
    pub fn clear(&mut self) -> Vec<TextureResource> {
        let mut out = Vec::with_capacity(self.entries.len());
        while let Some((_, entry)) = self.entries.pop_lru() {
            out.push(entry.texture);
        }
        self.bytes = 0;
        out
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }

    pub fn bytes(&self) -> usize {
        self.bytes
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
            size: self.entries.len(),
            bytes: self.bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rendering::headless::HeadlessSurface;
    use crate::rendering::surface::FilterMode;

    fn key(level: u32, row: u32, col: u32) -> CacheKey {
        CacheKey::new(Arc::from("test://tiles"), NodeId::new(level, row, col))
    }

    fn texture(surface: &mut HeadlessSurface, size: u32) -> TextureResource {
        TextureResource::create(surface, size, size, FilterMode::Linear).unwrap()
    }

    fn destroy(surface: &mut HeadlessSurface, textures: Vec<TextureResource>) {
        for t in textures {
            t.release(surface);
        }
    }

    #[test]
    fn test_put_remove_transfers_ownership() {
        let mut surface = HeadlessSurface::new(8, 8);
        let mut cache = TextureCache::new(4, 1 << 20);
        let tex = texture(&mut surface, 4);
        let id = tex.id();

        assert!(cache.put(key(1, 0, 0), tex, TEXTURE_HINT_RESOLVED, 3).is_empty());
        assert_eq!(cache.bytes(), 64);
        assert!(cache.get(&key(1, 0, 0)).map_or(false, |e| e.is_resolved()));

        let entry = cache.remove(&key(1, 0, 0)).unwrap();
        assert_eq!(entry.texture.id(), id);
        assert_eq!(entry.version, 3);
        assert!(cache.is_empty());
        assert_eq!(cache.bytes(), 0);
        assert!(cache.remove(&key(1, 0, 0)).is_none());

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses), (2, 1));
        entry.texture.release(&mut surface);
    }

    #[test]
    fn test_count_bound_evicts_lru() {
        let mut surface = HeadlessSurface::new(8, 8);
        let mut cache = TextureCache::new(2, 1 << 20);
        let a = texture(&mut surface, 2);
        let b = texture(&mut surface, 2);
        let c = texture(&mut surface, 2);
        let a_id = a.id();

        assert!(cache.put(key(1, 0, 0), a, 0, 0).is_empty());
        assert!(cache.put(key(1, 0, 1), b, 0, 0).is_empty());
        let evicted = cache.put(key(1, 1, 0), c, 0, 0);
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].id(), a_id);
        assert!(!cache.contains(&key(1, 0, 0)));
        assert_eq!(cache.stats().evictions, 1);

        destroy(&mut surface, evicted);
        destroy(&mut surface, cache.clear());
        assert_eq!(surface.live_textures(), 0);
    }

    #[test]
    fn test_byte_bound() {
        let mut surface = HeadlessSurface::new(8, 8);
        // room for two 4x4 textures
        let mut cache = TextureCache::new(16, 128);
        assert!(cache.put(key(2, 0, 0), texture(&mut surface, 4), 0, 0).is_empty());
        assert!(cache.put(key(2, 0, 1), texture(&mut surface, 4), 0, 0).is_empty());
        let evicted = cache.put(key(2, 0, 2), texture(&mut surface, 4), 0, 0);
        assert_eq!(evicted.len(), 1);
        assert_eq!(cache.bytes(), 128);

        // larger than the whole budget
        let too_big = cache.put(key(0, 0, 0), texture(&mut surface, 8), 0, 0);
        assert_eq!(too_big.len(), 1);
        assert_eq!(cache.len(), 2);

        destroy(&mut surface, evicted);
        destroy(&mut surface, too_big);
        destroy(&mut surface, cache.clear());
    }

    #[test]
    fn test_replacing_key_returns_old_texture() {
        let mut surface = HeadlessSurface::new(8, 8);
        let mut cache = TextureCache::new(4, 1 << 20);
        let first = texture(&mut surface, 2);
        let first_id = first.id();
        assert!(cache.put(key(0, 0, 0), first, 0, 1).is_empty());
        let displaced = cache.put(key(0, 0, 0), texture(&mut surface, 2), TEXTURE_HINT_RESOLVED, 2);
        assert_eq!(displaced.len(), 1);
        assert_eq!(displaced[0].id(), first_id);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.bytes(), 16);

        destroy(&mut surface, displaced);
        destroy(&mut surface, cache.clear());
    }
}
