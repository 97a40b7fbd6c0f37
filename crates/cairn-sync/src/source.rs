use std::sync::Arc;

use async_trait::async_trait;
use cairn_chunks::{BatchStore, ChunkStore};
use cairn_types::{Chunk, Hash};

use crate::error::SyncResult;

/// Where a walk reads chunks from.
#[async_trait]
pub trait ChunkSource: Send + Sync {
    async fn get_chunk(&self, hash: &Hash) -> SyncResult<Option<Chunk>>;
}

/// A [`BatchStore`] as a walk source.
pub struct StoreSource {
    store: Arc<dyn BatchStore>,
}

impl StoreSource {
    pub fn new(store: Arc<dyn BatchStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ChunkSource for StoreSource {
    async fn get_chunk(&self, hash: &Hash) -> SyncResult<Option<Chunk>> {
        Ok(self.store.get(hash).await?)
    }
}

/// A [`ChunkStore`] as a walk source.
pub struct ChunkStoreSource {
    store: Arc<dyn ChunkStore>,
}

impl ChunkStoreSource {
    pub fn new(store: Arc<dyn ChunkStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ChunkSource for ChunkStoreSource {
    async fn get_chunk(&self, hash: &Hash) -> SyncResult<Option<Chunk>> {
        Ok(self.store.get(hash).await?)
    }
}
