//! The read and write worker loops behind [`HttpBatchStore`].
//!
//! Each worker drains its queue into batches. The read worker dispatches
//! batches concurrently, up to `max_concurrent_requests` at a time. The
//! write worker sends one batch at a time, so a batch that references
//! chunks of an earlier one is only sent once the earlier one is stored.
//!
//! [`HttpBatchStore`]: crate::HttpBatchStore

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use cairn_chunks::{Hints, StoreError, StoreResult};
use cairn_types::{Chunk, Hash};
use tokio::sync::{mpsc, oneshot, watch, Semaphore};
use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::error::ClientError;
use crate::http::Remote;

pub(crate) struct ReadRequest {
    pub(crate) hash: Hash,
    pub(crate) reply: oneshot::Sender<StoreResult<Option<Chunk>>>,
}

pub(crate) enum WriteCommand {
    Put(Chunk, Hints),
    /// Send whatever is pending now.
    Flush,
}

/// State shared by the store and both workers.
pub(crate) struct Shared {
    pub(crate) remote: Remote,
    pub(crate) cancel: CancelToken,
    /// Scheduled but not yet confirmed by the server.
    pub(crate) unwritten: Mutex<HashMap<Hash, Chunk>>,
    /// Scheduled writes not yet settled, one way or the other.
    pub(crate) outstanding: watch::Sender<usize>,
    /// First write failure since the last flush.
    pub(crate) failure: Mutex<Option<Arc<ClientError>>>,
}

impl Shared {
    pub(crate) fn new(remote: Remote, cancel: CancelToken) -> Self {
        Self {
            remote,
            cancel,
            unwritten: Mutex::new(HashMap::new()),
            outstanding: watch::Sender::new(0),
            failure: Mutex::new(None),
        }
    }

    pub(crate) fn unwritten(&self) -> std::sync::MutexGuard<'_, HashMap<Hash, Chunk>> {
        self.unwritten.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn take_failure(&self) -> Option<Arc<ClientError>> {
        self.failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Settle a batch: the chunks leave the unwritten set whether or not
    /// the write succeeded, and a failure is kept for the next flush.
    fn settle(&self, chunks: &[Chunk], result: Result<(), ClientError>) {
        {
            let mut unwritten = self.unwritten();
            for chunk in chunks {
                unwritten.remove(&chunk.hash());
            }
        }
        if let Err(e) = result {
            warn!(chunks = chunks.len(), error = %e, "write batch is not durable");
            self.failure
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get_or_insert_with(|| Arc::new(e));
        }
        self.outstanding
            .send_modify(|n| *n = n.saturating_sub(chunks.len()));
    }
}

pub(crate) async fn read_loop(shared: Arc<Shared>, mut rx: mpsc::Receiver<ReadRequest>) {
    let limit = shared.remote.config.max_concurrent_requests.max(1);
    let permits = Arc::new(Semaphore::new(limit));
    let batch_size = shared.remote.config.read_batch_size.max(1);

    loop {
        let first = tokio::select! {
            req = rx.recv() => req,
            _ = shared.cancel.cancelled() => None,
        };
        let Some(first) = first else { break };

        let mut batch = vec![first];
        while batch.len() < batch_size {
            match rx.try_recv() {
                Ok(req) => batch.push(req),
                Err(_) => break,
            }
        }

        let permit = tokio::select! {
            permit = permits.clone().acquire_owned() => permit.ok(),
            _ = shared.cancel.cancelled() => None,
        };
        let Some(permit) = permit else {
            fail_reads(batch, || StoreError::Cancelled);
            break;
        };
        let shared = shared.clone();
        tokio::spawn(async move {
            let _permit = permit;
            fetch(&shared, batch).await;
        });
    }

    rx.close();
    let mut leftover = Vec::new();
    while let Ok(req) = rx.try_recv() {
        leftover.push(req);
    }
    fail_reads(leftover, || StoreError::Cancelled);

    // Wait for the fetches still in flight.
    let _ = permits.acquire_many(limit as u32).await;
    debug!("read worker stopped");
}

async fn fetch(shared: &Shared, batch: Vec<ReadRequest>) {
    let hashes: Vec<Hash> = batch
        .iter()
        .map(|r| r.hash)
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();

    let result = tokio::select! {
        r = shared.remote.get_refs(&hashes) => r,
        _ = shared.cancel.cancelled() => Err(ClientError::Cancelled),
    };
    match result {
        Ok(chunks) => {
            let found: HashMap<Hash, Chunk> = chunks.into_iter().map(|c| (c.hash(), c)).collect();
            for req in batch {
                let _ = req.reply.send(Ok(found.get(&req.hash).cloned()));
            }
        }
        Err(ClientError::Cancelled) => fail_reads(batch, || StoreError::Cancelled),
        Err(e) => {
            let e = Arc::new(e);
            fail_reads(batch, || StoreError::Remote(Box::new(e.clone())));
        }
    }
}

fn fail_reads(batch: Vec<ReadRequest>, err: impl Fn() -> StoreError) {
    for req in batch {
        let _ = req.reply.send(Err(err()));
    }
}

pub(crate) async fn write_loop(shared: Arc<Shared>, mut rx: mpsc::Receiver<WriteCommand>) {
    let batch_size = shared.remote.config.write_batch_size.max(1);
    let mut pending: Vec<Chunk> = Vec::new();
    let mut hints = Hints::new();

    loop {
        let cmd = tokio::select! {
            cmd = rx.recv() => cmd,
            _ = shared.cancel.cancelled() => None,
        };
        match cmd {
            Some(WriteCommand::Put(chunk, chunk_hints)) => {
                hints.extend(chunk_hints);
                pending.push(chunk);
                if pending.len() >= batch_size {
                    send(&shared, std::mem::take(&mut pending), std::mem::take(&mut hints)).await;
                }
            }
            Some(WriteCommand::Flush) => {
                if !pending.is_empty() {
                    send(&shared, std::mem::take(&mut pending), std::mem::take(&mut hints)).await;
                }
            }
            None => break,
        }
    }

    // Cancelled, or the store was dropped without closing.
    rx.close();
    while let Ok(cmd) = rx.try_recv() {
        if let WriteCommand::Put(chunk, _) = cmd {
            pending.push(chunk);
        }
    }
    if !pending.is_empty() {
        shared.settle(&pending, Err(ClientError::Cancelled));
    }
    debug!("write worker stopped");
}

async fn send(shared: &Shared, chunks: Vec<Chunk>, hints: Hints) {
    let result = tokio::select! {
        r = shared.remote.write_value(&hints, &chunks) => r,
        _ = shared.cancel.cancelled() => Err(ClientError::Cancelled),
    };
    shared.settle(&chunks, result);
}
