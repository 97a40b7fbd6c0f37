//! Graph walks and synchronization between Cairn stores.
//!
//! [`some_chunks_p`] walks the chunk graph below a root with bounded
//! concurrency. The copy functions build on it to move chunks from one
//! store to another, always writing a chunk after the chunks it
//! references, and [`pull_dataset`] uses that to bring a dataset in one
//! database up to date with another.

pub mod error;
pub mod pull;
pub mod source;
mod tee;
pub mod types;
pub mod walk;

pub use error::{SyncError, SyncResult};
pub use pull::{
    copy_missing_chunks_p, copy_reachable_chunks_p, pull_dataset, reachable_chunks,
    reachable_hashes,
};
pub use source::{ChunkSource, ChunkStoreSource, StoreSource};
pub use types::{CopyStats, PullResult, PullStatus};
pub use walk::{some_chunks_p, WalkStats, WalkVisitor};
