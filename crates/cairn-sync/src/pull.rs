//! Copying chunk graphs between stores and pulling datasets.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use cairn_chunks::BatchStore;
use cairn_datas::Database;
use cairn_types::{Chunk, Hash, Ref, Value};
use tracing::info;

use crate::error::SyncResult;
use crate::source::{ChunkSource, StoreSource};
use crate::tee::{Boundary, Tee};
use crate::types::{CopyStats, PullResult, PullStatus};
use crate::walk::{some_chunks_p, WalkVisitor};

/// Copy every chunk reachable from `root` that `sink` does not already
/// have. Subtrees whose root the sink has are not walked.
pub async fn copy_missing_chunks_p(
    source: Arc<dyn BatchStore>,
    sink: Arc<dyn BatchStore>,
    root: &Ref,
    concurrency: usize,
) -> SyncResult<CopyStats> {
    let tee = Arc::new(Tee::new(Boundary::SinkHas(sink.clone())));
    some_chunks_p(
        root.target(),
        Arc::new(StoreSource::new(source)),
        tee.clone(),
        concurrency,
    )
    .await?;
    tee.release(sink.as_ref()).await
}

/// Copy every chunk reachable from `root` but not from `exclude`.
///
/// Nothing is asked of the sink, so this suits sinks where `has` is
/// expensive and the caller knows what the sink already holds.
pub async fn copy_reachable_chunks_p(
    source: Arc<dyn BatchStore>,
    sink: Arc<dyn BatchStore>,
    root: &Ref,
    exclude: &Ref,
    concurrency: usize,
) -> SyncResult<CopyStats> {
    let source: Arc<dyn ChunkSource> = Arc::new(StoreSource::new(source));
    let excluded = reachable_hashes(source.clone(), exclude.target(), concurrency).await?;
    let tee = Arc::new(Tee::new(Boundary::Excluded(excluded)));
    some_chunks_p(root.target(), source, tee.clone(), concurrency).await?;
    tee.release(sink.as_ref()).await
}

/// Every hash reachable from `root`, including `root` itself.
pub async fn reachable_hashes(
    source: Arc<dyn ChunkSource>,
    root: Hash,
    concurrency: usize,
) -> SyncResult<HashSet<Hash>> {
    struct Collect(Mutex<HashSet<Hash>>);

    #[async_trait]
    impl WalkVisitor for Collect {
        async fn visit(&self, r: &Ref, _chunk: &Chunk, _value: &Value) -> SyncResult<()> {
            self.0
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(r.target());
            Ok(())
        }
    }

    let collect = Arc::new(Collect(Mutex::new(HashSet::new())));
    some_chunks_p(root, source, collect.clone(), concurrency).await?;
    let hashes = std::mem::take(&mut *collect.0.lock().unwrap_or_else(PoisonError::into_inner));
    Ok(hashes)
}

/// The chunks reachable from `root` but not from `exclude`, ordered so
/// that every chunk comes after the chunks it references.
pub async fn reachable_chunks(
    source: Arc<dyn ChunkSource>,
    root: Hash,
    exclude: Hash,
    concurrency: usize,
) -> SyncResult<Vec<Chunk>> {
    struct Gather {
        excluded: HashSet<Hash>,
        chunks: Mutex<Vec<(u64, Chunk)>>,
    }

    #[async_trait]
    impl WalkVisitor for Gather {
        async fn stop(&self, hash: &Hash) -> SyncResult<bool> {
            Ok(self.excluded.contains(hash))
        }

        async fn visit(&self, r: &Ref, chunk: &Chunk, _value: &Value) -> SyncResult<()> {
            self.chunks
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push((r.height(), chunk.clone()));
            Ok(())
        }
    }

    let excluded = reachable_hashes(source.clone(), exclude, concurrency).await?;
    let gather = Arc::new(Gather {
        excluded,
        chunks: Mutex::new(Vec::new()),
    });
    some_chunks_p(root, source, gather.clone(), concurrency).await?;
    let mut chunks =
        std::mem::take(&mut *gather.chunks.lock().unwrap_or_else(PoisonError::into_inner));
    chunks.sort_by_key(|(height, _)| *height);
    Ok(chunks.into_iter().map(|(_, chunk)| chunk).collect())
}

/// Bring dataset `id` in `sink` up to its head in `source`.
///
/// Copies the missing chunks, then fast-forwards the sink's dataset (or
/// creates it). Fails with `MergeNeeded` if the sink has diverged.
pub async fn pull_dataset(
    source: &Database,
    sink: &Database,
    id: &str,
    concurrency: usize,
) -> SyncResult<(Database, PullResult)> {
    let head = source.head_ref(id).await?;
    let stats = copy_missing_chunks_p(
        source.value_store().batch_store().clone(),
        sink.value_store().batch_store().clone(),
        &head,
        concurrency,
    )
    .await?;

    let current = sink.rebase().await?;
    let (db, status) = match current.maybe_head_ref(id).await? {
        None => (current.set_head(id, head.clone()).await?, PullStatus::Created),
        Some(existing) if existing.target() == head.target() => (current, PullStatus::UpToDate),
        Some(_) => (current.fast_forward(id, head.clone()).await?, PullStatus::FastForward),
    };

    info!(
        dataset = id,
        head = %head.target(),
        chunks = stats.chunks_copied,
        status = ?status,
        "pulled dataset"
    );
    Ok((db, PullResult { status, stats }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_chunks::{ChunkStore, CountingStore, LocalBatchStore, MemoryStore};
    use cairn_datas::{CommitOptions, DatasError};
    use crate::error::SyncError;

    fn batch(store: Arc<dyn ChunkStore>) -> Arc<dyn BatchStore> {
        Arc::new(LocalBatchStore::new(store))
    }

    async fn commit(db: &Database, id: &str, value: &str) -> Database {
        db.commit_value(id, Value::from(value), CommitOptions::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn pull_copies_exactly_the_missing_chunks() {
        let a_mem = Arc::new(MemoryStore::new());
        let db = Database::new(batch(a_mem.clone()));
        let db = commit(&db, "ds", "a").await;
        let db = commit(&db, "ds", "b").await;
        let head = db.head_ref("ds").await.unwrap();

        let reachable = reachable_hashes(
            Arc::new(StoreSource::new(db.value_store().batch_store().clone())),
            head.target(),
            4,
        )
        .await
        .unwrap();

        let counting = Arc::new(CountingStore::new(Arc::new(MemoryStore::new())));
        let sink = Database::new(batch(counting.clone()));
        let (sink, result) = pull_dataset(&db, &sink, "ds", 4).await.unwrap();

        assert_eq!(result.status, PullStatus::Created);
        assert_eq!(result.stats.chunks_copied, reachable.len());
        // The copied commits plus the sink's new dataset map.
        assert_eq!(counting.writes(), reachable.len() + 1);
        assert_eq!(sink.head_ref("ds").await.unwrap().target(), head.target());
        assert_eq!(sink.head("ds").await.unwrap().value(), &Value::from("b"));
    }

    #[tokio::test]
    async fn pull_fast_forwards_and_copies_only_the_new_commit() {
        let src = Database::new(batch(Arc::new(MemoryStore::new())));
        let src = commit(&src, "ds", "a").await;

        let sink = Database::new(batch(Arc::new(MemoryStore::new())));
        let (sink, first) = pull_dataset(&src, &sink, "ds", 2).await.unwrap();
        assert_eq!(first.status, PullStatus::Created);

        let src = commit(&src, "ds", "b").await;
        let (sink, second) = pull_dataset(&src, &sink, "ds", 2).await.unwrap();
        assert_eq!(second.status, PullStatus::FastForward);
        assert_eq!(second.stats.chunks_copied, 1);

        let (_, third) = pull_dataset(&src, &sink, "ds", 2).await.unwrap();
        assert_eq!(third.status, PullStatus::UpToDate);
        assert_eq!(third.stats.chunks_copied, 0);
    }

    #[tokio::test]
    async fn pull_into_diverged_sink_needs_merge() {
        let src = Database::new(batch(Arc::new(MemoryStore::new())));
        let src = commit(&src, "ds", "theirs").await;
        let sink = Database::new(batch(Arc::new(MemoryStore::new())));
        let sink = commit(&sink, "ds", "ours").await;

        let err = pull_dataset(&src, &sink, "ds", 2).await.unwrap_err();
        assert!(matches!(err, SyncError::Datas(DatasError::MergeNeeded { .. })));
    }

    #[tokio::test]
    async fn pull_of_missing_dataset_fails() {
        let src = Database::new(batch(Arc::new(MemoryStore::new())));
        let sink = Database::new(batch(Arc::new(MemoryStore::new())));
        let err = pull_dataset(&src, &sink, "nope", 2).await.unwrap_err();
        assert!(matches!(err, SyncError::Datas(DatasError::DatasetNotFound(_))));
    }

    #[tokio::test]
    async fn copy_reachable_skips_the_excluded_graph() {
        let src = Database::new(batch(Arc::new(MemoryStore::new())));
        let src = commit(&src, "ds", "a").await;
        let a = src.head_ref("ds").await.unwrap();
        let src = commit(&src, "ds", "b").await;
        let b = src.head_ref("ds").await.unwrap();
        let src = commit(&src, "ds", "c").await;
        let c = src.head_ref("ds").await.unwrap();

        let sink_mem = Arc::new(MemoryStore::new());
        let stats = copy_reachable_chunks_p(
            src.value_store().batch_store().clone(),
            batch(sink_mem.clone()),
            &c,
            &a,
            2,
        )
        .await
        .unwrap();

        assert_eq!(stats.chunks_copied, 2);
        let mut copied = sink_mem.all_hashes();
        copied.sort();
        let mut expected = vec![b.target(), c.target()];
        expected.sort();
        assert_eq!(copied, expected);
    }

    #[tokio::test]
    async fn reachable_chunks_orders_leaves_first() {
        let mem = Arc::new(MemoryStore::new());
        let db = Database::new(batch(mem.clone()));
        let db = commit(&db, "ds", "a").await;
        let db = commit(&db, "ds", "b").await;
        let head = db.head_ref("ds").await.unwrap();

        let source: Arc<dyn ChunkSource> = Arc::new(crate::source::ChunkStoreSource::new(mem));
        let chunks = reachable_chunks(source, head.target(), Hash::empty(), 2)
            .await
            .unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].hash(), head.target());
    }

    /// Runs every incoming chunk through the value store's integrity
    /// checks before storing it, the way the HTTP server does.
    struct ValidatingSink {
        mem: Arc<MemoryStore>,
        vs: cairn_values::ValueStore,
    }

    #[async_trait]
    impl BatchStore for ValidatingSink {
        async fn get(&self, hash: &Hash) -> cairn_chunks::StoreResult<Option<Chunk>> {
            self.mem.get(hash).await
        }
        async fn has(&self, hash: &Hash) -> cairn_chunks::StoreResult<bool> {
            self.mem.has(hash).await
        }
        async fn schedule_put(&self, chunk: Chunk, _hints: cairn_chunks::Hints) -> cairn_chunks::StoreResult<()> {
            self.vs
                .validate_chunk(&chunk)
                .await
                .map_err(|e| cairn_chunks::StoreError::Remote(Box::new(e)))?;
            self.mem.put(chunk).await
        }
        async fn flush(&self) -> cairn_chunks::StoreResult<()> {
            Ok(())
        }
        async fn root(&self) -> cairn_chunks::StoreResult<Hash> {
            self.mem.root().await
        }
        async fn update_root(&self, current: Hash, last: Hash) -> cairn_chunks::StoreResult<bool> {
            self.mem.update_root(current, last).await
        }
        async fn close(&self) -> cairn_chunks::StoreResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn copy_writes_children_before_parents() {
        let src = Database::new(batch(Arc::new(MemoryStore::new())));
        let src = commit(&src, "ds", "a").await;
        let src = commit(&src, "ds", "b").await;
        let src = commit(&src, "ds", "c").await;
        let head = src.head_ref("ds").await.unwrap();

        let mem = Arc::new(MemoryStore::new());
        let sink = Arc::new(ValidatingSink {
            mem: mem.clone(),
            vs: cairn_values::ValueStore::new(batch(mem.clone())),
        });
        let stats = copy_missing_chunks_p(src.value_store().batch_store().clone(), sink, &head, 4)
            .await
            .unwrap();
        assert_eq!(stats.chunks_copied, 3);
        assert!(mem.has(&head.target()).await.unwrap());
    }
}
