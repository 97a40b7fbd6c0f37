//! Commits: a value plus the set of commits it descends from.
//!
//! A commit is stored as an ordinary `Struct "Commit"` value with fields
//! `value`, `parents` (a set of refs to commits), and an optional `meta`
//! struct.

use std::collections::BTreeSet;

use cairn_types::{Hash, Ref, Struct, Type, Value};

use crate::error::{DatasError, DatasResult};

/// Struct name of commit values.
pub const COMMIT_NAME: &str = "Commit";

/// The type of every commit value.
pub fn commit_type() -> Type {
    Type::Struct(COMMIT_NAME.to_string())
}

/// A commit in a dataset's history.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Commit {
    value: Value,
    parents: BTreeSet<Ref>,
    meta: Option<Struct>,
}

impl Commit {
    /// A root commit (no parents) holding `value`.
    pub fn new(value: Value) -> Self {
        Self {
            value,
            parents: BTreeSet::new(),
            meta: None,
        }
    }

    /// Builder-style parent list.
    pub fn with_parents(mut self, parents: impl IntoIterator<Item = Ref>) -> Self {
        self.parents = parents
            .into_iter()
            .map(|p| p.retyped(commit_type()))
            .collect();
        self
    }

    /// Builder-style metadata.
    pub fn with_meta(mut self, meta: Struct) -> Self {
        self.meta = Some(meta);
        self
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn parents(&self) -> &BTreeSet<Ref> {
        &self.parents
    }

    pub fn meta(&self) -> Option<&Struct> {
        self.meta.as_ref()
    }

    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }

    /// Encode as the stored struct value.
    pub fn to_value(&self) -> Value {
        let parents = Value::set(self.parents.iter().cloned().map(Value::Ref));
        let mut s = Struct::new(COMMIT_NAME)
            .with("value", self.value.clone())
            .with("parents", parents);
        if let Some(meta) = &self.meta {
            s = s.with("meta", Value::Struct(meta.clone()));
        }
        Value::Struct(s)
    }

    /// Decode a stored value, which lives at `hash`, as a commit.
    pub fn from_value(hash: Hash, value: &Value) -> DatasResult<Self> {
        let not_a_commit = || DatasError::NotACommit(hash);
        let s = value
            .as_struct()
            .filter(|s| s.name == COMMIT_NAME)
            .ok_or_else(not_a_commit)?;
        let inner = s.get("value").ok_or_else(not_a_commit)?.clone();
        let parents = s
            .get("parents")
            .and_then(Value::as_set)
            .ok_or_else(not_a_commit)?
            .iter()
            .map(|p| p.as_ref_value().cloned().ok_or_else(not_a_commit))
            .collect::<DatasResult<BTreeSet<Ref>>>()?;
        let meta = match s.get("meta") {
            None => None,
            Some(Value::Struct(meta)) => Some(meta.clone()),
            Some(_) => return Err(not_a_commit()),
        };
        Ok(Self {
            value: inner,
            parents,
            meta,
        })
    }
}
