use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ServerError, ServerResult};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Optional path prefix, for serving several databases from one host.
    pub namespace: Option<String>,
    /// Allow `/postRefs`, which stores chunks without validating them.
    pub trusted_bulk_import: bool,
    /// How long shutdown waits for open connections before closing them.
    pub shutdown_grace_ms: u64,
    /// Largest accepted request body, compressed or not.
    pub max_body_size: usize,
    /// Concurrency of server-side graph walks.
    pub walk_concurrency: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8000)),
            namespace: None,
            trusted_bulk_import: false,
            shutdown_grace_ms: 5_000,
            max_body_size: cairn_protocol::MAX_BODY_SIZE,
            walk_concurrency: 8,
        }
    }
}

impl ServerConfig {
    /// Load a config from a TOML file. Missing keys take their defaults.
    pub fn from_toml_file(path: impl AsRef<Path>) -> ServerResult<Self> {
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text).map_err(|e| ServerError::Config(e.to_string()))
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// The namespace as a path prefix (`/name`), if one is set.
    pub fn namespace_prefix(&self) -> Option<String> {
        self.namespace
            .as_deref()
            .map(|ns| ns.trim_matches('/'))
            .filter(|ns| !ns.is_empty())
            .map(|ns| format!("/{ns}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config() {
        let c = ServerConfig::default();
        assert_eq!(c.bind_addr, "127.0.0.1:8000".parse::<SocketAddr>().unwrap());
        assert!(!c.trusted_bulk_import);
        assert!(c.namespace_prefix().is_none());
        assert_eq!(c.shutdown_grace(), Duration::from_secs(5));
    }

    #[test]
    fn namespace_prefix_is_normalized() {
        let c = ServerConfig {
            namespace: Some("/photos/".into()),
            ..Default::default()
        };
        assert_eq!(c.namespace_prefix().as_deref(), Some("/photos"));
        let blank = ServerConfig {
            namespace: Some("/".into()),
            ..Default::default()
        };
        assert!(blank.namespace_prefix().is_none());
    }

    #[test]
    fn loads_partial_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "bind_addr = \"0.0.0.0:9999\"\ntrusted_bulk_import = true\nnamespace = \"db1\""
        )
        .unwrap();
        let c = ServerConfig::from_toml_file(file.path()).unwrap();
        assert_eq!(c.bind_addr.port(), 9999);
        assert!(c.trusted_bulk_import);
        assert_eq!(c.namespace_prefix().as_deref(), Some("/db1"));
        assert_eq!(c.walk_concurrency, 8);
    }

    #[test]
    fn bad_toml_is_a_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "bind_addr = 12").unwrap();
        assert!(matches!(
            ServerConfig::from_toml_file(file.path()),
            Err(ServerError::Config(_))
        ));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        assert!(matches!(
            ServerConfig::from_toml_file("/definitely/not/here.toml"),
            Err(ServerError::Io(_))
        ));
    }
}
