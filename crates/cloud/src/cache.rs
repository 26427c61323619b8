//! LRU cache of decoded COG tiles.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;

/// Key for cached tiles: (IFD index, tile index).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileKey {
    pub ifd_idx: usize,
    pub tile_idx: usize,
}

/// Decoded tile samples, row-major, `tile_width * tile_height` values.
pub type TileSamples = Arc<Vec<f32>>;

/// LRU cache scoped to one reader.
pub struct TileCache {
    inner: LruCache<TileKey, TileSamples>,
}

impl TileCache {
    /// Cache holding at most `capacity` tiles (at least one).
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: LruCache::new(cap),
        }
    }

    pub fn get(&mut self, key: &TileKey) -> Option<TileSamples> {
        self.inner.get(key).cloned()
    }

    pub fn insert(&mut self, key: TileKey, samples: TileSamples) {
        self.inner.put(key, samples);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cached_tile_is_returned() {
        let mut cache = TileCache::new(2);
        let key = TileKey {
            ifd_idx: 1,
            tile_idx: 5,
        };
        cache.insert(key, Arc::new(vec![0.1, 0.2]));
        assert_eq!(cache.get(&key).as_deref(), Some(&vec![0.1, 0.2]));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn least_recent_tile_is_evicted() {
        let mut cache = TileCache::new(2);
        let k1 = TileKey { ifd_idx: 0, tile_idx: 0 };
        let k2 = TileKey { ifd_idx: 0, tile_idx: 1 };
        let k3 = TileKey { ifd_idx: 2, tile_idx: 0 };

        cache.insert(k1, Arc::new(vec![1.0]));
        cache.insert(k2, Arc::new(vec![2.0]));
        cache.insert(k3, Arc::new(vec![3.0]));

        assert!(cache.get(&k1).is_none());
        assert!(cache.get(&k2).is_some());
        assert!(cache.get(&k3).is_some());
    }

    #[test]
    fn zero_capacity_still_caches_one() {
        let mut cache = TileCache::new(0);
        cache.insert(TileKey { ifd_idx: 0, tile_idx: 0 }, Arc::new(vec![]));
        assert_eq!(cache.len(), 1);
    }
}
