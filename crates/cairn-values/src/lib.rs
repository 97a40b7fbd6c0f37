//! Validating value storage for Cairn.
//!
//! [`ValueStore`] turns a [`BatchStore`](cairn_chunks::BatchStore) of raw
//! chunks into a store of typed [`Value`](cairn_types::Value)s whose refs
//! always resolve. [`HintCache`] is its per-handle memory of what it has
//! already seen.

pub mod cache;
pub mod error;
pub mod store;

pub use cache::{CacheEntry, HintCache};
pub use error::{IntegrityError, ValuesError, ValuesResult};
pub use store::ValueStore;
