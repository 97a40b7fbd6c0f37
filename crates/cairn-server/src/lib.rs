//! HTTP server for Cairn.
//!
//! Serves one shared chunk store over the batch store REST surface:
//!
//! | Method | Path | Purpose |
//! |---|---|---|
//! | POST | `/getRefs` | fetch chunks by hash |
//! | POST | `/hasRefs` | presence check |
//! | POST | `/writeValue` | validated, hinted batch write |
//! | GET/POST | `/root` | read or compare-and-swap the root |
//! | POST | `/postRefs` | unvalidated bulk import (trusted servers only) |
//! | GET | `/ref/:hash` | one chunk, or its reachable closure with `all=true` |
//!
//! Every response carries the protocol version header.

pub mod config;
pub mod error;
pub mod handler;
pub mod router;
pub mod server;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::AppState;
pub use server::CairnServer;
