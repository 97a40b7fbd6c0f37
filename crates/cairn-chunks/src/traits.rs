use std::collections::BTreeSet;

use async_trait::async_trait;
use cairn_types::{Chunk, Hash};

use crate::error::StoreResult;

/// Hashes of already-validated ancestor chunks, sent alongside a write batch.
pub type Hints = BTreeSet<Hash>;

/// Content-addressed chunk storage with a single atomic root pointer.
///
/// All implementations must satisfy these invariants:
/// - Chunks are immutable once written. Writing a chunk that already exists
///   is a no-op.
/// - `update_root` is an atomic compare-and-swap: it succeeds only if the
///   current root equals `last`.
/// - The store never interprets chunk contents.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Read a chunk by hash. Returns `Ok(None)` if it does not exist.
    async fn get(&self, hash: &Hash) -> StoreResult<Option<Chunk>>;

    /// Check whether a chunk exists.
    async fn has(&self, hash: &Hash) -> StoreResult<bool>;

    /// Write a single chunk.
    async fn put(&self, chunk: Chunk) -> StoreResult<()>;

    /// Write many chunks.
    ///
    /// May fail with [`StoreError::Backpressure`](crate::StoreError::Backpressure)
    /// naming the chunks that were not stored; every other chunk was stored.
    async fn put_many(&self, chunks: Vec<Chunk>) -> StoreResult<()> {
        for chunk in chunks {
            self.put(chunk).await?;
        }
        Ok(())
    }

    /// The current root hash, or the empty hash if none has been set.
    async fn root(&self) -> StoreResult<Hash>;

    /// Set the root to `current` if it is still `last`.
    async fn update_root(&self, current: Hash, last: Hash) -> StoreResult<bool>;

    /// Release resources. Further calls may fail with `StoreError::Closed`.
    async fn close(&self) -> StoreResult<()> {
        Ok(())
    }
}

/// A chunk store whose writes are batched.
///
/// Writes scheduled with [`schedule_put`](BatchStore::schedule_put) are not
/// guaranteed durable until [`flush`](BatchStore::flush) or
/// [`close`](BatchStore::close) returns, but `get` and `has` observe them
/// immediately.
#[async_trait]
pub trait BatchStore: Send + Sync {
    async fn get(&self, hash: &Hash) -> StoreResult<Option<Chunk>>;

    async fn has(&self, hash: &Hash) -> StoreResult<bool>;

    /// Queue a chunk for writing, along with the hints that let the receiver
    /// validate its references.
    async fn schedule_put(&self, chunk: Chunk, hints: Hints) -> StoreResult<()>;

    /// Block until every scheduled write is durable.
    async fn flush(&self) -> StoreResult<()>;

    async fn root(&self) -> StoreResult<Hash>;

    /// Flush, then compare-and-swap the root.
    async fn update_root(&self, current: Hash, last: Hash) -> StoreResult<bool>;

    async fn close(&self) -> StoreResult<()>;
}
