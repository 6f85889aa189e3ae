use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::{BlockStore, MemoryRecord};

/// Bounded most-recently-used view over the block store.
pub struct CacheLayer {
    block_store: Arc<BlockStore>,
    capacity: usize,
    entries: Mutex<VecDeque<MemoryRecord>>,
}

impl CacheLayer {
    /// Create a cache in front of `block_store` holding at most `capacity` blocks.
    pub fn create(block_store: Arc<BlockStore>, capacity: usize) -> Self {
        Self {
            block_store,
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Pull the blocks matching `query` to the front of the cache; returns the cached ids.
    pub fn update(&self, query: &str, limit: usize) -> Vec<String> {
        let hits = self.block_store.search(query, limit.min(self.capacity));
        let mut entries = self.guard();
        for record in hits.into_iter().rev() {
            entries.retain(|cached| cached.id != record.id);
            entries.push_front(record);
        }
        entries.truncate(self.capacity);
        entries.iter().map(|record| record.id.clone()).collect()
    }

    /// Snapshot of cached blocks, most recent first.
    pub fn cached(&self) -> Vec<MemoryRecord> {
        self.guard().iter().cloned().collect()
    }

    /// Maximum number of cached blocks.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Block store this cache reads from.
    pub fn block_store(&self) -> &Arc<BlockStore> {
        &self.block_store
    }

    fn guard(&self) -> std::sync::MutexGuard<'_, VecDeque<MemoryRecord>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_keeps_most_recent_hits_within_capacity() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(BlockStore::create(dir.path(), None).unwrap());
        let alpha = store.add("alpha topic", 0.5).unwrap();
        let beta = store.add("beta topic", 0.5).unwrap();
        let gamma = store.add("gamma topic", 0.5).unwrap();

        let cache = CacheLayer::create(store, 2);
        cache.update("alpha", 5);
        let ids = cache.update("topic", 5);

        assert_eq!(ids, vec![gamma, beta]);
        assert!(!cache.cached().iter().any(|record| record.id == alpha));
    }

    #[test]
    fn repeated_hits_are_not_duplicated() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(BlockStore::create(dir.path(), None).unwrap());
        store.add("same", 0.5).unwrap();

        let cache = CacheLayer::create(store, 4);
        cache.update("same", 4);
        cache.update("same", 4);
        assert_eq!(cache.cached().len(), 1);
    }
}
