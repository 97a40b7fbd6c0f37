use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use cairn_types::{Chunk, Hash};

use crate::error::{StoreError, StoreResult};
use crate::traits::{BatchStore, ChunkStore, Hints};

/// Presents a local [`ChunkStore`] as a [`BatchStore`].
///
/// Writes go straight to the backing store, so `flush` has nothing to do.
/// Hints are ignored: the local store validates nothing.
pub struct LocalBatchStore {
    store: Arc<dyn ChunkStore>,
    closed: AtomicBool,
}

impl LocalBatchStore {
    pub fn new(store: Arc<dyn ChunkStore>) -> Self {
        Self {
            store,
            closed: AtomicBool::new(false),
        }
    }

    /// The wrapped chunk store.
    pub fn inner(&self) -> &Arc<dyn ChunkStore> {
        &self.store
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl BatchStore for LocalBatchStore {
    async fn get(&self, hash: &Hash) -> StoreResult<Option<Chunk>> {
        self.ensure_open()?;
        self.store.get(hash).await
    }

    async fn has(&self, hash: &Hash) -> StoreResult<bool> {
        self.ensure_open()?;
        self.store.has(hash).await
    }

    async fn schedule_put(&self, chunk: Chunk, _hints: Hints) -> StoreResult<()> {
        self.ensure_open()?;
        self.store.put(chunk).await
    }

    async fn flush(&self) -> StoreResult<()> {
        self.ensure_open()
    }

    async fn root(&self) -> StoreResult<Hash> {
        self.ensure_open()?;
        self.store.root().await
    }

    async fn update_root(&self, current: Hash, last: Hash) -> StoreResult<bool> {
        self.ensure_open()?;
        self.store.update_root(current, last).await
    }

    async fn close(&self) -> StoreResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.store.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    #[tokio::test]
    async fn scheduled_puts_are_immediately_visible() {
        let mem = Arc::new(MemoryStore::new());
        let batch = LocalBatchStore::new(mem.clone());
        let c = Chunk::new(b"chunk".to_vec());
        batch.schedule_put(c.clone(), Hints::new()).await.unwrap();
        assert!(batch.has(&c.hash()).await.unwrap());
        assert_eq!(mem.len(), 1);
    }

    #[tokio::test]
    async fn root_passes_through() {
        let batch = LocalBatchStore::new(Arc::new(MemoryStore::new()));
        let h = Hash::of(b"root");
        assert!(batch.update_root(h, Hash::empty()).await.unwrap());
        assert_eq!(batch.root().await.unwrap(), h);
    }

    #[tokio::test]
    async fn closed_store_refuses_work() {
        let batch = LocalBatchStore::new(Arc::new(MemoryStore::new()));
        batch.close().await.unwrap();
        batch.close().await.unwrap();
        assert!(matches!(batch.root().await, Err(StoreError::Closed)));
    }
}
