//! Versioned datasets for Cairn.
//!
//! A database's root hash names a map from dataset id to the dataset's head
//! commit. Commits are ordinary values that point at their parents, so
//! history is a DAG of chunks like everything else.
//!
//! # Architecture
//!
//! - **Commits** carry a value, a set of parent commits, and optional
//!   metadata.
//! - **Heads** only move forward: a new head must be the current head or
//!   descend from it, else [`DatasError::MergeNeeded`]. `set_head` is the
//!   explicit escape hatch.
//! - **Updates** are optimistic: each one swaps the root with
//!   compare-and-swap and reports [`DatasError::OptimisticLockFailed`] if
//!   another writer got there first. Callers decide whether to retry.
//!
//! # Modules
//!
//! - [`error`]: error types
//! - [`commit`]: the [`Commit`] value
//! - [`database`]: [`Database`] and its update cycle
//! - [`dataset`]: [`Dataset`], a pinned view of one head
//! - [`names`]: dataset id validation

pub mod commit;
pub mod database;
pub mod dataset;
pub mod error;
pub mod names;

pub use commit::{commit_type, Commit, COMMIT_NAME};
pub use database::{CommitOptions, Database, DatasetMap};
pub use dataset::Dataset;
pub use error::{DatasError, DatasResult};
pub use names::validate_dataset_id;
