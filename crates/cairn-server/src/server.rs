use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use cairn_chunks::ChunkStore;
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use hyper_util::service::TowerToHyperService;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::error::ServerResult;
use crate::handler::AppState;
use crate::router::build_router;

/// Cairn batch store server.
///
/// Connections are tracked so shutdown can first ask them to finish and,
/// once the grace period runs out, close whatever is still open.
pub struct CairnServer {
    config: ServerConfig,
    store: Arc<dyn ChunkStore>,
}

impl CairnServer {
    pub fn new(config: ServerConfig, store: Arc<dyn ChunkStore>) -> Self {
        Self { config, store }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Build the router (useful for testing).
    pub fn router(&self) -> Router {
        build_router(AppState::new(self.store.clone(), self.config.clone()))
    }

    /// Bind the configured address.
    pub async fn bind(&self) -> ServerResult<TcpListener> {
        Ok(TcpListener::bind(self.config.bind_addr).await?)
    }

    /// Serve until Ctrl-C.
    pub async fn serve(self) -> ServerResult<()> {
        let listener = self.bind().await?;
        self.serve_with_shutdown(listener, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "cannot listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Serve connections from `listener` until `signal` resolves.
    pub async fn serve_with_shutdown(
        self,
        listener: TcpListener,
        signal: impl Future<Output = ()> + Send,
    ) -> ServerResult<()> {
        let app = self.router();
        let local: SocketAddr = listener.local_addr()?;
        info!(addr = %local, namespace = ?self.config.namespace_prefix(), "cairn server listening");

        let (closing_tx, closing_rx) = watch::channel(false);
        let mut connections = JoinSet::new();
        tokio::pin!(signal);

        loop {
            tokio::select! {
                _ = &mut signal => break,
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            warn!(error = %e, "accept failed");
                            continue;
                        }
                    };
                    let service = TowerToHyperService::new(app.clone());
                    let mut closing = closing_rx.clone();
                    connections.spawn(async move {
                        let conn = http1::Builder::new()
                            .serve_connection(TokioIo::new(stream), service);
                        tokio::pin!(conn);
                        tokio::select! {
                            res = conn.as_mut() => {
                                if let Err(e) = res {
                                    debug!(peer = %peer, error = %e, "connection ended with error");
                                }
                            }
                            _ = closing.changed() => {
                                conn.as_mut().graceful_shutdown();
                                if let Err(e) = conn.await {
                                    debug!(peer = %peer, error = %e, "connection ended with error");
                                }
                            }
                        }
                    });
                    debug!(peer = %peer, open = connections.len(), "connection accepted");
                }
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }

        info!(open = connections.len(), "shutting down");
        drop(listener);
        let _ = closing_tx.send(true);
        let grace = self.config.shutdown_grace();
        let drained = tokio::time::timeout(grace, async {
            while connections.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(open = connections.len(), "grace period over, closing connections");
            connections.abort_all();
            while connections.join_next().await.is_some() {}
        }
        info!("cairn server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_chunks::MemoryStore;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::sync::oneshot;

    fn server(grace_ms: u64) -> CairnServer {
        let config = ServerConfig {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            shutdown_grace_ms: grace_ms,
            ..Default::default()
        };
        CairnServer::new(config, Arc::new(MemoryStore::new()))
    }

    #[test]
    fn server_construction() {
        let s = server(10);
        assert_eq!(s.config().shutdown_grace_ms, 10);
        let _router = s.router();
    }

    #[tokio::test]
    async fn serves_root_over_tcp_and_stops() {
        let s = server(1_000);
        let listener = s.bind().await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(s.serve_with_shutdown(listener, async {
            let _ = stop_rx.await;
        }));

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /root HTTP/1.1\r\nhost: localhost\r\nconnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains(&"0".repeat(64)));
        assert!(response.to_lowercase().contains("x-cairn-vers: 1"));

        stop_tx.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn idle_connections_do_not_block_shutdown() {
        let s = server(50);
        let listener = s.bind().await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(s.serve_with_shutdown(listener, async {
            let _ = stop_rx.await;
        }));

        // Open a connection and send half a request, then go quiet.
        let mut idle = tokio::net::TcpStream::connect(addr).await.unwrap();
        idle.write_all(b"GET /root HTTP/1.1\r\n").await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        stop_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("server should stop within the grace period")
            .unwrap()
            .unwrap();
    }
}
