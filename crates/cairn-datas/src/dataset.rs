use std::sync::Arc;

use cairn_types::{Ref, Value};
use cairn_values::ValueStore;

use crate::commit::Commit;
use crate::error::{DatasError, DatasResult};

/// A named dataset as seen by one [`Database`](crate::Database) handle.
///
/// The head is fixed when the handle is created; committing through the
/// database does not move it.
#[derive(Clone)]
pub struct Dataset {
    vs: Arc<ValueStore>,
    id: String,
    head: Option<Ref>,
}

impl Dataset {
    pub(crate) fn new(vs: Arc<ValueStore>, id: String, head: Option<Ref>) -> Self {
        Self { vs, id, head }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn head_ref(&self) -> Option<&Ref> {
        self.head.as_ref()
    }

    pub fn has_head(&self) -> bool {
        self.head.is_some()
    }

    pub async fn maybe_head(&self) -> DatasResult<Option<Commit>> {
        let Some(r) = &self.head else {
            return Ok(None);
        };
        let value = self
            .vs
            .read_value(&r.target())
            .await?
            .ok_or(DatasError::CommitNotFound(r.target()))?;
        Commit::from_value(r.target(), &value).map(Some)
    }

    pub async fn head(&self) -> DatasResult<Commit> {
        self.maybe_head()
            .await?
            .ok_or_else(|| DatasError::DatasetNotFound(self.id.clone()))
    }

    /// The value of the head commit.
    pub async fn head_value(&self) -> DatasResult<Value> {
        Ok(self.head().await?.value().clone())
    }
}

impl std::fmt::Debug for Dataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dataset")
            .field("id", &self.id)
            .field("head", &self.head.as_ref().map(Ref::target))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::{Commit, Database, DatasError};
    use cairn_chunks::{LocalBatchStore, MemoryStore};
    use cairn_types::Value;
    use std::sync::Arc;

    fn open() -> Database {
        Database::new(Arc::new(LocalBatchStore::new(Arc::new(MemoryStore::new()))))
    }

    #[tokio::test]
    async fn empty_dataset_has_no_head() {
        let ds = open().dataset("ds").await.unwrap();
        assert_eq!(ds.id(), "ds");
        assert!(!ds.has_head());
        assert!(ds.maybe_head().await.unwrap().is_none());
        assert!(matches!(ds.head().await, Err(DatasError::DatasetNotFound(_))));
    }

    #[tokio::test]
    async fn head_is_pinned_at_creation() {
        let db = open();
        let db = db.commit("ds", Commit::new(Value::Number(1))).await.unwrap();
        let pinned = db.dataset("ds").await.unwrap();

        let parent = db.head_ref("ds").await.unwrap();
        let db = db
            .commit("ds", Commit::new(Value::Number(2)).with_parents([parent]))
            .await
            .unwrap();

        assert_eq!(pinned.head_value().await.unwrap(), Value::Number(1));
        let current = db.dataset("ds").await.unwrap();
        assert_eq!(current.head_value().await.unwrap(), Value::Number(2));
    }

    #[tokio::test]
    async fn invalid_id_is_rejected() {
        assert!(open().dataset("no spaces").await.is_err());
    }
}
