//! Content-addressed chunk storage for Cairn.
//!
//! A chunk store is a hash-keyed blob store plus one mutable value: the
//! root hash, updated only by compare-and-swap. Everything Cairn persists
//! goes through one of the two traits here:
//!
//! - [`ChunkStore`]: direct reads and writes.
//! - [`BatchStore`]: reads plus batched, hinted writes that become durable
//!   on `flush`. Remote stores implement this one.
//!
//! # Implementations
//!
//! - [`MemoryStore`]: `HashMap`-based store for tests, embedding, and serving
//! - [`CountingStore`]: wrapper that counts calls, for tests
//! - [`LocalBatchStore`]: any `ChunkStore` viewed as a `BatchStore`

pub mod counting;
pub mod error;
pub mod local;
pub mod memory;
pub mod traits;

pub use counting::CountingStore;
pub use error::{StoreError, StoreResult};
pub use local::LocalBatchStore;
pub use memory::MemoryStore;
pub use traits::{BatchStore, ChunkStore, Hints};
