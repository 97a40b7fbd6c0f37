//! Concurrent traversal of the chunk graph.
//!
//! The walk is level by level: every chunk of the current frontier is
//! fetched concurrently (bounded by a semaphore), and the refs they contain
//! form the next frontier. Each hash is visited at most once.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use cairn_types::{decode_chunk, Chunk, Hash, Ref, Value};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::debug;

use crate::error::{SyncError, SyncResult};
use crate::source::ChunkSource;

/// Decides where a walk goes and observes what it finds.
#[async_trait]
pub trait WalkVisitor: Send + Sync {
    /// Return `true` to skip `hash` and everything below it. Called before
    /// the chunk is fetched.
    async fn stop(&self, _hash: &Hash) -> SyncResult<bool> {
        Ok(false)
    }

    /// Called once for every chunk the walk fetches. `r` is the ref the
    /// chunk would be reached by, with its real type and height.
    async fn visit(&self, r: &Ref, chunk: &Chunk, value: &Value) -> SyncResult<()>;
}

/// Counters from one walk.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WalkStats {
    pub visited: usize,
    pub pruned: usize,
    pub levels: usize,
}

/// Walk every chunk reachable from `root` that `visitor` does not stop at.
///
/// A chunk missing from `source` fails the walk with
/// [`SyncError::MissingChunk`]. The empty hash is an empty graph.
pub async fn some_chunks_p(
    root: Hash,
    source: Arc<dyn ChunkSource>,
    visitor: Arc<dyn WalkVisitor>,
    concurrency: usize,
) -> SyncResult<WalkStats> {
    let permits = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut visited = HashSet::new();
    let mut stats = WalkStats::default();
    let mut frontier = if root.is_empty() { Vec::new() } else { vec![root] };

    while !frontier.is_empty() {
        let mut tasks = JoinSet::new();
        for hash in frontier.drain(..) {
            if !visited.insert(hash) {
                continue;
            }
            let source = source.clone();
            let visitor = visitor.clone();
            let permits = permits.clone();
            tasks.spawn(async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|e| SyncError::Walk(e.to_string()))?;
                visit_one(hash, source.as_ref(), visitor.as_ref()).await
            });
        }

        let mut next = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined.map_err(|e| SyncError::Walk(e.to_string()))?? {
                Some(children) => {
                    stats.visited += 1;
                    next.extend(children);
                }
                None => stats.pruned += 1,
            }
        }
        stats.levels += 1;
        frontier = next;
    }

    debug!(root = %root, visited = stats.visited, pruned = stats.pruned, levels = stats.levels, "walk complete");
    Ok(stats)
}

/// Fetch and visit one chunk, returning its children, or `None` if the
/// visitor pruned it.
async fn visit_one(
    hash: Hash,
    source: &dyn ChunkSource,
    visitor: &dyn WalkVisitor,
) -> SyncResult<Option<Vec<Hash>>> {
    if visitor.stop(&hash).await? {
        return Ok(None);
    }
    let chunk = source
        .get_chunk(&hash)
        .await?
        .ok_or(SyncError::MissingChunk(hash))?;
    let value = decode_chunk(&chunk)?;
    let r = Ref::with_target(hash, &value);
    visitor.visit(&r, &chunk, &value).await?;
    Ok(Some(value.chunks().iter().map(Ref::target).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::ChunkStoreSource;
    use cairn_chunks::{ChunkStore, MemoryStore};
    use cairn_types::encode_value;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        stop_at: HashSet<Hash>,
        seen: Mutex<Vec<(Hash, u64)>>,
    }

    #[async_trait]
    impl WalkVisitor for Recorder {
        async fn stop(&self, hash: &Hash) -> SyncResult<bool> {
            Ok(self.stop_at.contains(hash))
        }

        async fn visit(&self, r: &Ref, _chunk: &Chunk, _value: &Value) -> SyncResult<()> {
            self.seen.lock().unwrap().push((r.target(), r.height()));
            Ok(())
        }
    }

    async fn put(store: &MemoryStore, v: &Value) -> Ref {
        store.put(encode_value(v).unwrap()).await.unwrap();
        Ref::new(v)
    }

    /// A diamond: top -> {left, right} -> bottom.
    async fn diamond(store: &MemoryStore) -> (Ref, Ref, Ref, Ref) {
        let bottom = put(store, &Value::from("bottom")).await;
        let left = put(store, &Value::list([Value::from("l"), Value::Ref(bottom.clone())])).await;
        let right = put(store, &Value::list([Value::from("r"), Value::Ref(bottom.clone())])).await;
        let top = put(store, &Value::set([Value::Ref(left.clone()), Value::Ref(right.clone())])).await;
        (top, left, right, bottom)
    }

    #[tokio::test]
    async fn visits_each_chunk_once() {
        let store = Arc::new(MemoryStore::new());
        let (top, _, _, bottom) = diamond(&store).await;
        let recorder = Arc::new(Recorder::default());
        let stats = some_chunks_p(
            top.target(),
            Arc::new(ChunkStoreSource::new(store)),
            recorder.clone(),
            4,
        )
        .await
        .unwrap();
        assert_eq!(stats.visited, 4);
        assert_eq!(stats.levels, 3);
        let seen = recorder.seen.lock().unwrap();
        assert_eq!(seen.iter().filter(|(h, _)| *h == bottom.target()).count(), 1);
    }

    #[tokio::test]
    async fn visit_sees_real_heights() {
        let store = Arc::new(MemoryStore::new());
        let (top, _, _, bottom) = diamond(&store).await;
        let recorder = Arc::new(Recorder::default());
        some_chunks_p(top.target(), Arc::new(ChunkStoreSource::new(store)), recorder.clone(), 1)
            .await
            .unwrap();
        let seen = recorder.seen.lock().unwrap();
        assert!(seen.contains(&(top.target(), 3)));
        assert!(seen.contains(&(bottom.target(), 1)));
    }

    #[tokio::test]
    async fn stop_prunes_subtrees() {
        let store = Arc::new(MemoryStore::new());
        let (top, left, right, _) = diamond(&store).await;
        let recorder = Arc::new(Recorder {
            stop_at: [left.target(), right.target()].into_iter().collect(),
            ..Default::default()
        });
        let stats = some_chunks_p(top.target(), Arc::new(ChunkStoreSource::new(store)), recorder.clone(), 2)
            .await
            .unwrap();
        assert_eq!(stats.visited, 1);
        assert_eq!(stats.pruned, 2);
    }

    #[tokio::test]
    async fn missing_chunk_fails_the_walk() {
        let store = Arc::new(MemoryStore::new());
        let ghost = Ref::new(&Value::from("never stored"));
        let top = put(&store, &Value::list([Value::Ref(ghost.clone())])).await;
        let err = some_chunks_p(
            top.target(),
            Arc::new(ChunkStoreSource::new(store)),
            Arc::new(Recorder::default()),
            2,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SyncError::MissingChunk(h) if h == ghost.target()));
    }

    #[tokio::test]
    async fn empty_root_is_an_empty_walk() {
        let stats = some_chunks_p(
            Hash::empty(),
            Arc::new(ChunkStoreSource::new(Arc::new(MemoryStore::new()))),
            Arc::new(Recorder::default()),
            2,
        )
        .await
        .unwrap();
        assert_eq!(stats, WalkStats::default());
    }
}
