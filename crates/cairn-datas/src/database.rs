//! The database: one root hash naming a map of dataset heads.
//!
//! Every update follows the same cycle: read the current root and dataset
//! map from the store, check the new head against the current one, write
//! the new map, then compare-and-swap the root. Losing the swap surfaces as
//! [`DatasError::OptimisticLockFailed`]; nothing here retries.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use cairn_chunks::BatchStore;
use cairn_types::{Hash, Ref, Struct, Value};
use cairn_values::ValueStore;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::commit::{commit_type, Commit};
use crate::dataset::Dataset;
use crate::error::{DatasError, DatasResult};
use crate::names::validate_dataset_id;

/// Dataset id to head commit.
pub type DatasetMap = BTreeMap<String, Ref>;

/// Optional inputs to [`Database::commit_value`].
#[derive(Clone, Debug, Default)]
pub struct CommitOptions {
    /// Parents of the new commit. Defaults to the dataset's current head.
    pub parents: Option<BTreeSet<Ref>>,
    pub meta: Option<Struct>,
}

#[derive(Clone, Debug)]
struct Snapshot {
    root: Hash,
    datasets: DatasetMap,
}

/// A handle on a versioned database.
///
/// The handle's view of the dataset map is loaded on first use and never
/// changes; successful updates return a new handle. Handles sharing a
/// [`ValueStore`] share its cache.
pub struct Database {
    vs: Arc<ValueStore>,
    snapshot: OnceCell<Snapshot>,
}

impl Database {
    /// Open a database over a batch store.
    pub fn new(store: Arc<dyn BatchStore>) -> Self {
        Self::with_value_store(Arc::new(ValueStore::new(store)))
    }

    pub fn with_value_store(vs: Arc<ValueStore>) -> Self {
        Self {
            vs,
            snapshot: OnceCell::new(),
        }
    }

    pub fn value_store(&self) -> &Arc<ValueStore> {
        &self.vs
    }

    /// The dataset map this handle sees.
    pub async fn datasets(&self) -> DatasResult<DatasetMap> {
        Ok(self.snapshot().await?.datasets.clone())
    }

    /// The root hash this handle sees.
    pub async fn root(&self) -> DatasResult<Hash> {
        Ok(self.snapshot().await?.root)
    }

    pub async fn maybe_head_ref(&self, id: &str) -> DatasResult<Option<Ref>> {
        Ok(self.snapshot().await?.datasets.get(id).cloned())
    }

    pub async fn head_ref(&self, id: &str) -> DatasResult<Ref> {
        self.maybe_head_ref(id)
            .await?
            .ok_or_else(|| DatasError::DatasetNotFound(id.to_string()))
    }

    pub async fn maybe_head(&self, id: &str) -> DatasResult<Option<Commit>> {
        match self.maybe_head_ref(id).await? {
            Some(r) => Ok(Some(self.read_commit(r.target()).await?)),
            None => Ok(None),
        }
    }

    /// The head commit of `id`, or [`DatasError::DatasetNotFound`].
    pub async fn head(&self, id: &str) -> DatasResult<Commit> {
        self.maybe_head(id)
            .await?
            .ok_or_else(|| DatasError::DatasetNotFound(id.to_string()))
    }

    /// A handle on one dataset, pinned to the head this database sees.
    pub async fn dataset(&self, id: &str) -> DatasResult<Dataset> {
        validate_dataset_id(id)?;
        let head = self.maybe_head_ref(id).await?;
        Ok(Dataset::new(self.vs.clone(), id.to_string(), head))
    }

    pub async fn read_value(&self, hash: &Hash) -> DatasResult<Option<Value>> {
        Ok(self.vs.read_value(hash).await?)
    }

    pub async fn write_value(&self, value: &Value) -> DatasResult<Ref> {
        Ok(self.vs.write_value(value).await?)
    }

    /// Make `commit` the head of `id`.
    ///
    /// Succeeds if `commit` is already the head (without writing anything),
    /// if the dataset has no head, or if `commit` descends from the head.
    /// Otherwise fails with [`DatasError::MergeNeeded`].
    pub async fn commit(&self, id: &str, commit: Commit) -> DatasResult<Database> {
        validate_dataset_id(id)?;
        let current = self.load_current().await?;
        let r = self.vs.write_value(&commit.to_value()).await?;

        if let Some(head) = current.datasets.get(id) {
            if head.target() == r.target() {
                debug!(dataset = id, head = %head.target(), "commit is already the head");
                return Ok(self.fresh());
            }
            if !self.descends_from(&commit, head).await? {
                return Err(DatasError::MergeNeeded {
                    dataset: id.to_string(),
                });
            }
        }

        let mut datasets = current.datasets;
        datasets.insert(id.to_string(), r);
        self.swap_root(id, current.root, &datasets).await
    }

    /// Commit `value` to `id` with parents defaulting to the head this
    /// handle sees.
    pub async fn commit_value(
        &self,
        id: &str,
        value: Value,
        opts: CommitOptions,
    ) -> DatasResult<Database> {
        let parents = match opts.parents {
            Some(parents) => parents,
            None => self.maybe_head_ref(id).await?.into_iter().collect(),
        };
        let mut commit = Commit::new(value).with_parents(parents);
        if let Some(meta) = opts.meta {
            commit = commit.with_meta(meta);
        }
        self.commit(id, commit).await
    }

    /// Remove `id` from the dataset map.
    pub async fn delete(&self, id: &str) -> DatasResult<Database> {
        validate_dataset_id(id)?;
        let current = self.load_current().await?;
        let mut datasets = current.datasets;
        if datasets.remove(id).is_none() {
            debug!(dataset = id, "delete of absent dataset");
        }
        self.swap_root(id, current.root, &datasets).await
    }

    /// Point `id` at the commit `head` without a fast-forward check.
    pub async fn set_head(&self, id: &str, head: Ref) -> DatasResult<Database> {
        validate_dataset_id(id)?;
        let head = self.commit_ref(head).await?;
        let current = self.load_current().await?;
        let mut datasets = current.datasets;
        datasets.insert(id.to_string(), head);
        self.swap_root(id, current.root, &datasets).await
    }

    /// Point `id` at the commit `head`, which must be the current head or
    /// descend from it.
    pub async fn fast_forward(&self, id: &str, head: Ref) -> DatasResult<Database> {
        validate_dataset_id(id)?;
        let head = self.commit_ref(head).await?;
        let commit = self.read_commit(head.target()).await?;
        let current = self.load_current().await?;
        if let Some(existing) = current.datasets.get(id) {
            if existing.target() == head.target() {
                return Ok(self.fresh());
            }
            if !self.descends_from(&commit, existing).await? {
                return Err(DatasError::MergeNeeded {
                    dataset: id.to_string(),
                });
            }
        }
        let mut datasets = current.datasets;
        datasets.insert(id.to_string(), head);
        self.swap_root(id, current.root, &datasets).await
    }

    /// A handle on the latest root. Reuses this handle's view if the root
    /// has not moved.
    pub async fn rebase(&self) -> DatasResult<Database> {
        let root = self.vs.root().await?;
        if let Some(snapshot) = self.snapshot.get() {
            if snapshot.root == root {
                return Ok(Self {
                    vs: self.vs.clone(),
                    snapshot: OnceCell::new_with(Some(snapshot.clone())),
                });
            }
        }
        Ok(self.fresh())
    }

    /// Returns `true` if `ancestor` is reachable from `commit`'s parents.
    ///
    /// Breadth-first over the parent graph; each commit is read at most
    /// once.
    pub async fn descends_from(&self, commit: &Commit, ancestor: &Ref) -> DatasResult<bool> {
        let target = ancestor.target();
        let mut seen = HashSet::new();
        let mut frontier: Vec<Ref> = commit.parents().iter().cloned().collect();
        while !frontier.is_empty() {
            if frontier.iter().any(|p| p.target() == target) {
                return Ok(true);
            }
            let mut next = Vec::new();
            for parent in frontier {
                if !seen.insert(parent.target()) {
                    continue;
                }
                let c = self.read_commit(parent.target()).await?;
                next.extend(c.parents().iter().cloned());
            }
            frontier = next;
        }
        Ok(false)
    }

    /// Flush pending writes and close the backing store.
    pub async fn close(&self) -> DatasResult<()> {
        self.vs.flush().await?;
        self.vs.close().await?;
        Ok(())
    }

    async fn read_commit(&self, hash: Hash) -> DatasResult<Commit> {
        let value = self
            .vs
            .read_value(&hash)
            .await?
            .ok_or(DatasError::CommitNotFound(hash))?;
        Commit::from_value(hash, &value)
    }

    /// Check that `r` names a commit and give it the commit ref type.
    async fn commit_ref(&self, r: Ref) -> DatasResult<Ref> {
        self.read_commit(r.target()).await?;
        Ok(r.retyped(commit_type()))
    }

    async fn snapshot(&self) -> DatasResult<&Snapshot> {
        self.snapshot.get_or_try_init(|| self.load_current()).await
    }

    /// Read the current root and dataset map from the store, bypassing
    /// this handle's snapshot.
    async fn load_current(&self) -> DatasResult<Snapshot> {
        let root = self.vs.root().await?;
        if root.is_empty() {
            return Ok(Snapshot {
                root,
                datasets: DatasetMap::new(),
            });
        }
        let value = self
            .vs
            .read_value(&root)
            .await?
            .ok_or(DatasError::CorruptRoot(root))?;
        let map = value.as_map().ok_or(DatasError::CorruptRoot(root))?;
        let mut datasets = DatasetMap::new();
        for (k, v) in map {
            match (k.as_str(), v.as_ref_value()) {
                (Some(id), Some(r)) => {
                    datasets.insert(id.to_string(), r.clone());
                }
                _ => return Err(DatasError::CorruptRoot(root)),
            }
        }
        Ok(Snapshot { root, datasets })
    }

    async fn swap_root(&self, id: &str, last: Hash, datasets: &DatasetMap) -> DatasResult<Database> {
        let map = Value::map(
            datasets
                .iter()
                .map(|(k, r)| (Value::string(k.as_str()), Value::Ref(r.clone()))),
        );
        let new_root = self.vs.write_value(&map).await?.target();
        if !self.vs.update_root(new_root, last).await? {
            info!(dataset = id, last = %last, "root moved, commit rejected");
            return Err(DatasError::OptimisticLockFailed {
                dataset: id.to_string(),
            });
        }
        info!(dataset = id, root = %new_root, "root updated");
        Ok(self.fresh())
    }

    fn fresh(&self) -> Database {
        Self::with_value_store(self.vs.clone())
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("root", &self.snapshot.get().map(|s| s.root))
            .finish()
    }
}
