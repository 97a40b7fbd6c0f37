use std::collections::HashSet;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use cairn_chunks::{BatchStore, Hints};
use cairn_types::{Chunk, Hash, Ref, Value};
use tracing::debug;

use crate::error::{SyncError, SyncResult};
use crate::types::CopyStats;
use crate::walk::WalkVisitor;

/// Where a copying walk stops descending.
pub(crate) enum Boundary {
    /// Stop at chunks the sink already has.
    SinkHas(std::sync::Arc<dyn BatchStore>),
    /// Stop at chunks in this set.
    Excluded(HashSet<Hash>),
}

/// Bytes of chunk data a [`Tee`] keeps in memory before spilling the rest
/// to a temporary file.
pub const STAGE_MEMORY_LIMIT: usize = 64 * 1024 * 1024;

enum Slot {
    Memory(Chunk),
    Spilled { hash: Hash, offset: u64, len: usize },
}

/// Chunks waiting for release, with their heights. Data past the memory
/// limit is appended to an anonymous temporary file.
struct Staging {
    entries: Vec<(u64, Slot)>,
    in_memory: usize,
    memory_limit: usize,
    spill: Option<File>,
    spill_len: u64,
}

impl Staging {
    fn new(memory_limit: usize) -> Self {
        Self {
            entries: Vec::new(),
            in_memory: 0,
            memory_limit,
            spill: None,
            spill_len: 0,
        }
    }

    fn push(&mut self, height: u64, chunk: &Chunk) -> std::io::Result<()> {
        if self.in_memory + chunk.len() <= self.memory_limit {
            self.in_memory += chunk.len();
            self.entries.push((height, Slot::Memory(chunk.clone())));
            return Ok(());
        }
        let file = match self.spill.take() {
            Some(file) => file,
            None => tempfile::tempfile()?,
        };
        let file = self.spill.insert(file);
        file.write_all(chunk.data())?;
        self.entries.push((
            height,
            Slot::Spilled {
                hash: chunk.hash(),
                offset: self.spill_len,
                len: chunk.len(),
            },
        ));
        self.spill_len += chunk.len() as u64;
        Ok(())
    }

    fn spilled(&self) -> usize {
        self.entries
            .iter()
            .filter(|(_, slot)| matches!(slot, Slot::Spilled { .. }))
            .count()
    }
}

fn read_spilled(file: &mut File, offset: u64, len: usize) -> std::io::Result<Vec<u8>> {
    let mut data = vec![0u8; len];
    file.seek(SeekFrom::Start(offset))?;
    file.read_exact(&mut data)?;
    Ok(data)
}

/// A visitor that stages every chunk it sees for the sink.
///
/// The walk discovers parents before children, while a validating sink
/// must see children first, so chunks are held until [`Tee::release`]
/// writes them in ascending height.
pub(crate) struct Tee {
    boundary: Boundary,
    staged: Mutex<Staging>,
}

impl Tee {
    pub(crate) fn new(boundary: Boundary) -> Self {
        Self::with_memory_limit(boundary, STAGE_MEMORY_LIMIT)
    }

    pub(crate) fn with_memory_limit(boundary: Boundary, memory_limit: usize) -> Self {
        Self {
            boundary,
            staged: Mutex::new(Staging::new(memory_limit)),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Staging> {
        self.staged.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write everything staged to `sink`, leaves first, then flush it.
    pub(crate) async fn release(&self, sink: &dyn BatchStore) -> SyncResult<CopyStats> {
        let mut staged = {
            let mut guard = self.lock();
            let fresh = Staging::new(guard.memory_limit);
            std::mem::replace(&mut *guard, fresh)
        };
        if staged.spill.is_some() {
            debug!(spilled = staged.spilled(), "reading back spilled chunks");
        }
        let mut entries = std::mem::take(&mut staged.entries);
        entries.sort_by_key(|(height, _)| *height);

        let mut stats = CopyStats::default();
        for (_, slot) in entries {
            let chunk = match (slot, staged.spill.as_mut()) {
                (Slot::Memory(chunk), _) => chunk,
                (Slot::Spilled { hash, offset, len }, Some(file)) => {
                    Chunk::with_hash(hash, read_spilled(file, offset, len)?)
                }
                (Slot::Spilled { hash, .. }, None) => {
                    return Err(SyncError::Walk(format!("staged chunk {hash} has no spill file")))
                }
            };
            stats.chunks_copied += 1;
            stats.bytes_copied += chunk.len() as u64;
            sink.schedule_put(chunk, Hints::new()).await?;
        }
        sink.flush().await?;
        debug!(chunks = stats.chunks_copied, bytes = stats.bytes_copied, "released staged chunks");
        Ok(stats)
    }
}

#[async_trait]
impl WalkVisitor for Tee {
    async fn stop(&self, hash: &Hash) -> SyncResult<bool> {
        match &self.boundary {
            Boundary::SinkHas(sink) => Ok(sink.has(hash).await?),
            Boundary::Excluded(excluded) => Ok(excluded.contains(hash)),
        }
    }

    async fn visit(&self, r: &Ref, chunk: &Chunk, _value: &Value) -> SyncResult<()> {
        self.lock().push(r.height(), chunk)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_chunks::{ChunkStore, MemoryStore, StoreResult};
    use cairn_types::encode_value;

    /// Remembers the order chunks arrive in.
    #[derive(Default)]
    struct OrderSink {
        inner: MemoryStore,
        order: std::sync::Mutex<Vec<Hash>>,
    }

    #[async_trait]
    impl BatchStore for OrderSink {
        async fn get(&self, hash: &Hash) -> StoreResult<Option<Chunk>> {
            self.inner.get(hash).await
        }
        async fn has(&self, hash: &Hash) -> StoreResult<bool> {
            self.inner.has(hash).await
        }
        async fn schedule_put(&self, chunk: Chunk, _hints: Hints) -> StoreResult<()> {
            self.order.lock().unwrap().push(chunk.hash());
            self.inner.put(chunk).await
        }
        async fn flush(&self) -> StoreResult<()> {
            Ok(())
        }
        async fn root(&self) -> StoreResult<Hash> {
            self.inner.root().await
        }
        async fn update_root(&self, current: Hash, last: Hash) -> StoreResult<bool> {
            self.inner.update_root(current, last).await
        }
        async fn close(&self) -> StoreResult<()> {
            Ok(())
        }
    }

    /// A three-level chain, root first, as a walk would find it.
    fn chain() -> Vec<(Ref, Chunk, Value)> {
        let leaf = Value::from("leaf");
        let mid = Value::list([Value::Ref(Ref::new(&leaf))]);
        let top = Value::list([Value::Ref(Ref::new(&mid)), Value::from("top")]);
        [top, mid, leaf]
            .into_iter()
            .map(|v| (Ref::new(&v), encode_value(&v).unwrap(), v))
            .collect()
    }

    async fn stage_and_release(tee: &Tee) -> (OrderSink, Vec<(Ref, Chunk, Value)>) {
        let chain = chain();
        for (r, chunk, value) in &chain {
            tee.visit(r, chunk, value).await.unwrap();
        }
        let sink = OrderSink::default();
        let stats = tee.release(&sink).await.unwrap();
        assert_eq!(stats.chunks_copied, 3);
        (sink, chain)
    }

    #[tokio::test]
    async fn release_writes_leaves_first() {
        let tee = Tee::new(Boundary::Excluded(HashSet::new()));
        let (sink, chain) = stage_and_release(&tee).await;
        let expected: Vec<Hash> = chain.iter().rev().map(|(_, c, _)| c.hash()).collect();
        assert_eq!(*sink.order.lock().unwrap(), expected);
    }

    #[tokio::test]
    async fn spilled_chunks_come_back_intact_and_ordered() {
        let tee = Tee::with_memory_limit(Boundary::Excluded(HashSet::new()), 0);
        let (sink, chain) = stage_and_release(&tee).await;
        let expected: Vec<Hash> = chain.iter().rev().map(|(_, c, _)| c.hash()).collect();
        assert_eq!(*sink.order.lock().unwrap(), expected);
        for (_, chunk, _) in &chain {
            let stored = sink.inner.get(&chunk.hash()).await.unwrap().unwrap();
            assert_eq!(stored.data(), chunk.data());
        }
    }

    #[tokio::test]
    async fn staging_spills_only_past_the_memory_limit() {
        let chain = chain();
        let first = chain[0].1.len();
        let tee = Tee::with_memory_limit(Boundary::Excluded(HashSet::new()), first);
        for (r, chunk, value) in &chain {
            tee.visit(r, chunk, value).await.unwrap();
        }
        assert_eq!(tee.lock().spilled(), 2);
        assert_eq!(tee.lock().in_memory, first);
    }

    #[tokio::test]
    async fn release_empties_the_staging_area() {
        let tee = Tee::with_memory_limit(Boundary::Excluded(HashSet::new()), 0);
        stage_and_release(&tee).await;
        let sink = OrderSink::default();
        let stats = tee.release(&sink).await.unwrap();
        assert_eq!(stats.chunks_copied, 0);
        assert!(tee.lock().spill.is_none());
    }
}
