use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use cairn_chunks::{BatchStore, Hints, StoreError, StoreResult};
use cairn_types::{Chunk, Hash};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cancel::CancelToken;
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::http::Remote;
use crate::worker::{read_loop, write_loop, ReadRequest, Shared, WriteCommand};

struct Workers {
    reads: mpsc::Sender<ReadRequest>,
    writes: mpsc::Sender<WriteCommand>,
    handles: Vec<JoinHandle<()>>,
}

/// A [`BatchStore`] backed by a Cairn server.
///
/// Reads are queued and fetched in batches by a read worker; scheduled
/// writes are queued and sent as gzipped, hinted batches by a write
/// worker. Reads observe writes that are still queued. Must be created
/// inside a tokio runtime.
pub struct HttpBatchStore {
    shared: Arc<Shared>,
    workers: Mutex<Option<Workers>>,
    closed: AtomicBool,
}

impl HttpBatchStore {
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        Self::with_cancel(config, CancelToken::new())
    }

    /// A store whose blocking calls give up when `cancel` fires.
    pub fn with_cancel(config: ClientConfig, cancel: CancelToken) -> ClientResult<Self> {
        let (read_tx, read_rx) = mpsc::channel(config.read_queue_capacity.max(1));
        let (write_tx, write_rx) = mpsc::channel(config.write_queue_capacity.max(1));
        let base_url = config.base_url.clone();
        let shared = Arc::new(Shared::new(Remote::new(config)?, cancel));

        let handles = vec![
            tokio::spawn(read_loop(shared.clone(), read_rx)),
            tokio::spawn(write_loop(shared.clone(), write_rx)),
        ];
        debug!(url = %base_url, "http batch store opened");
        Ok(Self {
            shared,
            workers: Mutex::new(Some(Workers {
                reads: read_tx,
                writes: write_tx,
                handles,
            })),
            closed: AtomicBool::new(false),
        })
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.shared.cancel
    }

    /// Presence of each hash, in order. Writes still queued count as
    /// present.
    pub async fn has_many(&self, hashes: &[Hash]) -> ClientResult<Vec<(Hash, bool)>> {
        let (pending, ask): (Vec<Hash>, Vec<Hash>) = {
            let unwritten = self.shared.unwritten();
            hashes.iter().copied().partition(|h| unwritten.contains_key(h))
        };
        let answered = if ask.is_empty() {
            Vec::new()
        } else {
            self.cancellable(self.shared.remote.has_refs(&ask)).await?
        };
        let mut known: std::collections::HashMap<Hash, bool> = answered.into_iter().collect();
        known.extend(pending.into_iter().map(|h| (h, true)));
        Ok(hashes
            .iter()
            .map(|h| (*h, known.get(h).copied().unwrap_or(false)))
            .collect())
    }

    /// Every chunk reachable from `root` but not from `exclude`, children
    /// first. The server does the walk.
    pub async fn get_reachable(&self, root: Hash, exclude: Hash) -> ClientResult<Vec<Chunk>> {
        self.cancellable(self.shared.remote.get_reachable(root, exclude))
            .await
    }

    /// Store `chunks` on the server without validation. Only trusted
    /// servers accept this.
    pub async fn post_refs(&self, chunks: &[Chunk]) -> ClientResult<()> {
        self.cancellable(self.shared.remote.post_refs(chunks)).await
    }

    async fn cancellable<T>(
        &self,
        fut: impl std::future::Future<Output = ClientResult<T>>,
    ) -> ClientResult<T> {
        tokio::select! {
            r = fut => r,
            _ = self.shared.cancel.cancelled() => Err(ClientError::Cancelled),
        }
    }

    fn ensure_open(&self) -> ClientResult<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(ClientError::Closed)
        } else if self.shared.cancel.is_cancelled() {
            Err(ClientError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn senders(&self) -> ClientResult<(mpsc::Sender<ReadRequest>, mpsc::Sender<WriteCommand>)> {
        self.workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|w| (w.reads.clone(), w.writes.clone()))
            .ok_or(ClientError::Closed)
    }

    async fn flush_writes(&self) -> StoreResult<()> {
        let (_, writes) = self.senders()?;
        writes
            .send(WriteCommand::Flush)
            .await
            .map_err(|_| StoreError::Closed)?;

        let mut outstanding = self.shared.outstanding.subscribe();
        tokio::select! {
            r = async { outstanding.wait_for(|n| *n == 0).await.map(|_| ()) } => {
                r.map_err(|_| StoreError::Closed)?
            }
            _ = self.shared.cancel.cancelled() => return Err(StoreError::Cancelled),
        }
        self.take_failure()
    }

    /// Report the first write failure recorded by the workers, if any.
    fn take_failure(&self) -> StoreResult<()> {
        match self.shared.take_failure() {
            Some(e) if matches!(*e, ClientError::Cancelled) => Err(StoreError::Cancelled),
            Some(e) => Err(StoreError::Remote(Box::new(e))),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl BatchStore for HttpBatchStore {
    async fn get(&self, hash: &Hash) -> StoreResult<Option<Chunk>> {
        let pending = self.shared.unwritten().get(hash).cloned();
        if pending.is_some() {
            return Ok(pending);
        }
        self.ensure_open()?;
        let (reads, _) = self.senders()?;
        let (reply, answer) = oneshot::channel();
        reads
            .send(ReadRequest { hash: *hash, reply })
            .await
            .map_err(|_| StoreError::Closed)?;
        tokio::select! {
            r = answer => r.map_err(|_| StoreError::Closed)?,
            _ = self.shared.cancel.cancelled() => Err(StoreError::Cancelled),
        }
    }

    async fn has(&self, hash: &Hash) -> StoreResult<bool> {
        if self.shared.unwritten().contains_key(hash) {
            return Ok(true);
        }
        self.ensure_open()?;
        let answers = self.has_many(std::slice::from_ref(hash)).await?;
        Ok(answers.first().is_some_and(|(_, present)| *present))
    }

    async fn schedule_put(&self, chunk: Chunk, hints: Hints) -> StoreResult<()> {
        self.ensure_open()?;
        let hash = chunk.hash();
        {
            let mut unwritten = self.shared.unwritten();
            if unwritten.contains_key(&hash) {
                return Ok(());
            }
            unwritten.insert(hash, chunk.clone());
        }
        self.shared.outstanding.send_modify(|n| *n += 1);

        let queued = match self.senders() {
            Ok((_, writes)) => writes
                .send(WriteCommand::Put(chunk, hints))
                .await
                .map_err(|_| StoreError::Closed),
            Err(e) => Err(e.into()),
        };
        if queued.is_err() {
            self.shared.unwritten().remove(&hash);
            self.shared
                .outstanding
                .send_modify(|n| *n = n.saturating_sub(1));
        }
        queued
    }

    async fn flush(&self) -> StoreResult<()> {
        self.ensure_open()?;
        self.flush_writes().await
    }

    async fn root(&self) -> StoreResult<Hash> {
        self.ensure_open()?;
        Ok(self.cancellable(self.shared.remote.root()).await?)
    }

    async fn update_root(&self, current: Hash, last: Hash) -> StoreResult<bool> {
        self.flush().await?;
        let moved = self
            .cancellable(self.shared.remote.update_root(current, last))
            .await?;
        if moved {
            info!(root = %current, "remote root updated");
        } else {
            debug!(expected = %last, "remote root moved underneath us");
        }
        Ok(moved)
    }

    async fn close(&self) -> StoreResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let flushed = if self.shared.cancel.is_cancelled() {
            Ok(())
        } else {
            self.flush_writes().await
        };

        let workers = self
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(Workers {
            reads,
            writes,
            handles,
        }) = workers
        {
            drop(reads);
            drop(writes);
            for handle in handles {
                if let Err(e) = handle.await {
                    debug!(error = %e, "worker ended abnormally");
                }
            }
        }
        debug!("http batch store closed");
        // Joined workers have settled every write, including those dropped
        // by cancellation.
        flushed?;
        self.take_failure()
    }
}
