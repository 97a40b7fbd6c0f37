use std::collections::HashMap;
use std::sync::{Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use cairn_types::{Chunk, Hash};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::traits::ChunkStore;

/// In-memory, HashMap-based chunk store.
///
/// Intended for tests, embedding, and `cairn serve`. Chunks are held behind
/// a `RwLock`; the root pointer has its own lock so the CAS is atomic.
pub struct MemoryStore {
    chunks: RwLock<HashMap<Hash, Chunk>>,
    root: Mutex<Hash>,
    put_limit: Option<usize>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            chunks: RwLock::new(HashMap::new()),
            root: Mutex::new(Hash::empty()),
            put_limit: None,
        }
    }

    /// A store whose `put_many` accepts at most `limit` chunks per call and
    /// reports the rest as backpressure.
    pub fn with_put_limit(limit: usize) -> Self {
        Self {
            put_limit: Some(limit),
            ..Self::new()
        }
    }

    /// Number of chunks currently stored.
    pub fn len(&self) -> usize {
        self.chunks.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns `true` if the store holds no chunks.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return a sorted list of all chunk hashes in the store.
    pub fn all_hashes(&self) -> Vec<Hash> {
        let map = self.chunks.read().unwrap_or_else(PoisonError::into_inner);
        let mut hashes: Vec<Hash> = map.keys().copied().collect();
        hashes.sort();
        hashes
    }

    fn insert(&self, chunk: Chunk) -> StoreResult<()> {
        if !chunk.verify() {
            return Err(StoreError::HashMismatch {
                expected: chunk.hash(),
                computed: Hash::of(chunk.data()),
            });
        }
        let mut map = self.chunks.write().unwrap_or_else(PoisonError::into_inner);
        map.entry(chunk.hash()).or_insert(chunk);
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChunkStore for MemoryStore {
    async fn get(&self, hash: &Hash) -> StoreResult<Option<Chunk>> {
        let map = self.chunks.read().unwrap_or_else(PoisonError::into_inner);
        Ok(map.get(hash).cloned())
    }

    async fn has(&self, hash: &Hash) -> StoreResult<bool> {
        let map = self.chunks.read().unwrap_or_else(PoisonError::into_inner);
        Ok(map.contains_key(hash))
    }

    async fn put(&self, chunk: Chunk) -> StoreResult<()> {
        self.insert(chunk)
    }

    async fn put_many(&self, chunks: Vec<Chunk>) -> StoreResult<()> {
        let limit = self.put_limit.unwrap_or(usize::MAX);
        let mut rejected = Vec::new();
        for (i, chunk) in chunks.into_iter().enumerate() {
            if i < limit {
                self.insert(chunk)?;
            } else {
                rejected.push(chunk.hash());
            }
        }
        if rejected.is_empty() {
            Ok(())
        } else {
            debug!(count = rejected.len(), "memory store applying backpressure");
            Err(StoreError::Backpressure(rejected))
        }
    }

    async fn root(&self) -> StoreResult<Hash> {
        Ok(*self.root.lock().unwrap_or_else(PoisonError::into_inner))
    }

    async fn update_root(&self, current: Hash, last: Hash) -> StoreResult<bool> {
        let mut root = self.root.lock().unwrap_or_else(PoisonError::into_inner);
        if *root != last {
            return Ok(false);
        }
        *root = current;
        Ok(true)
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("chunk_count", &self.len())
            .finish()
    }
}
