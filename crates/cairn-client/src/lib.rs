//! HTTP client for a Cairn server.
//!
//! [`HttpBatchStore`] implements [`BatchStore`](cairn_chunks::BatchStore)
//! over the server's REST surface, so a `ValueStore` or `Database` can run
//! against a remote database exactly as against a local one.
//!
//! ```no_run
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! use cairn_chunks::BatchStore;
//! use cairn_client::{ClientConfig, HttpBatchStore};
//!
//! let store = HttpBatchStore::new(ClientConfig::new("http://127.0.0.1:8000"))?;
//! println!("root is {}", store.root().await?);
//! store.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod cancel;
pub mod config;
pub mod error;
mod http;
mod retry;
mod store;
mod worker;

pub use cancel::CancelToken;
pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};
pub use store::HttpBatchStore;
