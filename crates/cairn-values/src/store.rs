use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use cairn_chunks::{BatchStore, Hints, StoreResult};
use cairn_types::{decode_chunk, encode_value, Chunk, Hash, Ref, Type, Value};
use tracing::{debug, trace, warn};

use crate::cache::{CacheEntry, HintCache};
use crate::error::{IntegrityError, ValuesResult};

/// Reads and writes [`Value`]s over a [`BatchStore`], keeping the chunk
/// graph referentially intact.
///
/// A value may only be written once every ref it contains points at a
/// chunk this store has seen (written or read) or can find in the backing
/// store, and that chunk holds a value of the ref's declared type. The
/// [`HintCache`] lets most of these checks skip I/O.
///
/// A written chunk counts as present once the backing store accepts it. If
/// a later flush, root update, or close fails, every write since the last
/// successful one is forgotten again, since the batch may never have landed.
pub struct ValueStore {
    store: Arc<dyn BatchStore>,
    cache: HintCache,
    unflushed: Mutex<HashSet<Hash>>,
}

impl ValueStore {
    pub fn new(store: Arc<dyn BatchStore>) -> Self {
        Self {
            store,
            cache: HintCache::new(),
            unflushed: Mutex::new(HashSet::new()),
        }
    }

    /// The backing batch store.
    pub fn batch_store(&self) -> &Arc<dyn BatchStore> {
        &self.store
    }

    pub fn cache(&self) -> &HintCache {
        &self.cache
    }

    /// Write `value` and return a ref to it.
    ///
    /// Writing a value this store already knows to be present is a no-op.
    /// The chunk is scheduled on the backing store together with the hints
    /// collected from its refs; it is durable after [`ValueStore::flush`].
    pub async fn write_value(&self, value: &Value) -> ValuesResult<Ref> {
        let chunk = encode_value(value)?;
        let r = Ref::with_target(chunk.hash(), value);
        if self.cache.check(&chunk.hash()).is_some_and(|e| e.is_present()) {
            trace!(hash = %chunk.hash(), "write skipped, already present");
            return Ok(r);
        }

        let hash = chunk.hash();
        let hints = self.check_refs(hash, value).await?;
        debug!(hash = %hash, hints = hints.len(), "scheduling value write");
        self.store.schedule_put(chunk, hints).await?;
        self.cache.set(hash, CacheEntry::present(value.type_of()));
        self.lock_unflushed().insert(hash);
        Ok(r)
    }

    /// Read the value stored at `hash`, or `None` if there is no such chunk.
    ///
    /// Every ref inside the value is recorded in the cache as present, with
    /// `hash` as its hint. A miss is recorded as absent.
    pub async fn read_value(&self, hash: &Hash) -> ValuesResult<Option<Value>> {
        let chunk = match self.store.get(hash).await? {
            Some(chunk) if !chunk.is_empty() => chunk,
            _ => {
                self.cache.set(*hash, CacheEntry::Absent);
                return Ok(None);
            }
        };
        let value = decode_chunk(&chunk)?;
        for child in value.chunks() {
            self.cache.check_and_set(
                child.target(),
                CacheEntry::hinted(child.target_type().clone(), *hash),
            );
        }
        self.cache
            .check_and_set(*hash, CacheEntry::hinted(value.type_of(), *hash));
        Ok(Some(value))
    }

    /// Validate an incoming chunk as if it were being written here.
    ///
    /// The chunk's hash is verified, it is decoded, and its refs are
    /// checked. On success it is marked present so later chunks may
    /// reference it. Nothing is written; the caller decides where the chunk
    /// goes.
    pub async fn validate_chunk(&self, chunk: &Chunk) -> ValuesResult<Value> {
        if !chunk.verify() {
            return Err(IntegrityError::HashMismatch {
                expected: chunk.hash(),
                computed: Hash::of(chunk.data()),
            }
            .into());
        }
        let value = decode_chunk(chunk)?;
        if self.cache.check(&chunk.hash()).is_some_and(|e| e.is_present()) {
            return Ok(value);
        }
        self.check_refs(chunk.hash(), &value).await?;
        self.cache
            .set(chunk.hash(), CacheEntry::present(value.type_of()));
        Ok(value)
    }

    pub async fn flush(&self) -> StoreResult<()> {
        let written = self.take_unflushed();
        let result = self.store.flush().await;
        self.settle(written, result.is_ok());
        result
    }

    pub async fn root(&self) -> StoreResult<Hash> {
        self.store.root().await
    }

    /// Swap the root. The backing store flushes first, so a failure here
    /// also drops the presence of unflushed writes.
    pub async fn update_root(&self, current: Hash, last: Hash) -> StoreResult<bool> {
        let written = self.take_unflushed();
        let result = self.store.update_root(current, last).await;
        self.settle(written, result.is_ok());
        result
    }

    pub async fn close(&self) -> StoreResult<()> {
        let written = self.take_unflushed();
        let result = self.store.close().await;
        self.settle(written, result.is_ok());
        result
    }

    fn lock_unflushed(&self) -> std::sync::MutexGuard<'_, HashSet<Hash>> {
        self.unflushed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn take_unflushed(&self) -> HashSet<Hash> {
        std::mem::take(&mut *self.lock_unflushed())
    }

    fn settle(&self, written: HashSet<Hash>, durable: bool) {
        if durable || written.is_empty() {
            return;
        }
        warn!(chunks = written.len(), "batch failed, forgetting unflushed writes");
        for hash in &written {
            self.cache.forget(hash);
        }
    }

    /// Check every ref in `value` and collect the hints of their targets.
    async fn check_refs(&self, parent: Hash, value: &Value) -> ValuesResult<Hints> {
        let mut hints = Hints::new();
        for r in value.chunks() {
            let target = r.target();
            let entry = match self.cache.check(&target) {
                Some(entry) if entry.is_present() => Some(entry),
                _ => self.load_entry(&target).await?,
            };
            let Some(CacheEntry::Present { ty, hint }) = entry else {
                return Err(IntegrityError::MissingChunk { parent, target }.into());
            };
            if !hint.is_empty() {
                hints.insert(hint);
            }
            self.check_type(&r, ty).await?;
        }
        Ok(hints)
    }

    /// Refs declared as `Value` are not checked. A cached type of `Value`
    /// only says the chunk is present, so the real type is loaded before
    /// comparing.
    async fn check_type(&self, r: &Ref, recorded: Type) -> ValuesResult<()> {
        let declared = r.target_type();
        if declared.is_value() || *declared == recorded {
            return Ok(());
        }
        let recorded = if recorded.is_value() {
            match self.store.get(&r.target()).await? {
                Some(chunk) if !chunk.is_empty() => decode_chunk(&chunk)?.type_of(),
                _ => recorded,
            }
        } else {
            recorded
        };
        if *declared == recorded {
            return Ok(());
        }
        Err(IntegrityError::TypeMismatch {
            target: r.target(),
            declared: declared.clone(),
            recorded,
        }
        .into())
    }

    /// Fall back to the backing store for a hash the cache does not know
    /// to be present.
    async fn load_entry(&self, hash: &Hash) -> ValuesResult<Option<CacheEntry>> {
        let Some(chunk) = self.store.get(hash).await? else {
            self.cache.set(*hash, CacheEntry::Absent);
            return Ok(None);
        };
        if chunk.is_empty() {
            return Ok(None);
        }
        let entry = CacheEntry::present(decode_chunk(&chunk)?.type_of());
        self.cache.check_and_set(*hash, entry.clone());
        Ok(Some(entry))
    }
}

impl std::fmt::Debug for ValueStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValueStore")
            .field("cached", &self.cache.len())
            .finish()
    }
}
