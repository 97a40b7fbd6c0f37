use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use cairn_types::{Chunk, Hash};

use crate::error::StoreResult;
use crate::traits::ChunkStore;

/// Wraps a [`ChunkStore`] and counts the calls made through it.
pub struct CountingStore {
    inner: Arc<dyn ChunkStore>,
    reads: AtomicUsize,
    writes: AtomicUsize,
    root_updates: AtomicUsize,
}

impl CountingStore {
    pub fn new(inner: Arc<dyn ChunkStore>) -> Self {
        Self {
            inner,
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
            root_updates: AtomicUsize::new(0),
        }
    }

    /// Calls to `get` and `has`.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Chunks passed to `put` or `put_many`.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Calls to `update_root`.
    pub fn root_updates(&self) -> usize {
        self.root_updates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChunkStore for CountingStore {
    async fn get(&self, hash: &Hash) -> StoreResult<Option<Chunk>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.get(hash).await
    }

    async fn has(&self, hash: &Hash) -> StoreResult<bool> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.has(hash).await
    }

    async fn put(&self, chunk: Chunk) -> StoreResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.put(chunk).await
    }

    async fn put_many(&self, chunks: Vec<Chunk>) -> StoreResult<()> {
        self.writes.fetch_add(chunks.len(), Ordering::SeqCst);
        self.inner.put_many(chunks).await
    }

    async fn root(&self) -> StoreResult<Hash> {
        self.inner.root().await
    }

    async fn update_root(&self, current: Hash, last: Hash) -> StoreResult<bool> {
        self.root_updates.fetch_add(1, Ordering::SeqCst);
        self.inner.update_root(current, last).await
    }

    async fn close(&self) -> StoreResult<()> {
        self.inner.close().await
    }
}
