// src/status/server.rs
//! WebSocket hub that serves the latest status snapshot.
//!
//! The engine publishes into a `watch` channel holding an `Arc<str>`; every
//! client task reads whole snapshots from it, so a slow client only ever skips
//! to the newest one and never sees a partial write.

use crate::config::StatusConfig;
use crate::status::{StatusError, StatusSink};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_tungstenite::{accept_async, tungstenite::protocol::Message};
use tracing::{debug, info, warn};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Default)]
pub struct HubStats {
    pub connections_accepted: AtomicU64,
    pub active_connections: AtomicUsize,
    pub snapshots_published: AtomicU64,
}

#[derive(Debug, Deserialize)]
struct ClientRequest {
    action: String,
}

pub struct WebSocketHub {
    config: StatusConfig,
    latest_tx: watch::Sender<Arc<str>>,
    shutdown_tx: watch::Sender<bool>,
    stats: Arc<HubStats>,
    local_addr: Option<SocketAddr>,
    accept_task: Option<JoinHandle<()>>,
}

impl WebSocketHub {
    pub fn new(config: StatusConfig) -> Self {
        let (latest_tx, _) = watch::channel(Arc::<str>::from(""));
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            config,
            latest_tx,
            shutdown_tx,
            stats: Arc::new(HubStats::default()),
            local_addr: None,
            accept_task: None,
        }
    }

    /// Address actually bound, available after `start`.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn stats(&self) -> &Arc<HubStats> {
        &self.stats
    }

    pub fn latest(&self) -> Arc<str> {
        self.latest_tx.borrow().clone()
    }
}

#[async_trait]
impl StatusSink for WebSocketHub {
    async fn start(&mut self) -> Result<(), StatusError> {
        if self.accept_task.is_some() {
            return Ok(());
        }
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| StatusError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;
        self.local_addr = Some(local_addr);
        self.shutdown_tx.send_replace(false);

        let task = tokio::spawn(accept_loop(
            listener,
            self.config.max_connections,
            self.latest_tx.subscribe(),
            self.shutdown_tx.subscribe(),
            Arc::clone(&self.stats),
        ));
        self.accept_task = Some(task);

        info!(addr = %local_addr, max_connections = self.config.max_connections, "Status server started");
        Ok(())
    }

    fn broadcast(&self, text: &str) {
        self.latest_tx.send_replace(Arc::from(text));
        self.stats.snapshots_published.fetch_add(1, Ordering::Relaxed);
    }

    async fn cleanup(&mut self) {
        let Some(mut task) = self.accept_task.take() else {
            return;
        };
        self.shutdown_tx.send_replace(true);

        if tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await.is_err() {
            warn!("Status server did not stop in time, aborting");
            task.abort();
        }
        info!(
            accepted = self.stats.connections_accepted.load(Ordering::Relaxed),
            "Status server stopped"
        );
    }
}

async fn accept_loop(
    listener: TcpListener,
    max_connections: usize,
    latest: watch::Receiver<Arc<str>>,
    mut shutdown: watch::Receiver<bool>,
    stats: Arc<HubStats>,
) {
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, addr) = match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!(error = %e, "Failed to accept status connection");
                        continue;
                    }
                };

                let active = stats.active_connections.load(Ordering::Relaxed);
                if active >= max_connections {
                    warn!(%addr, active, max_connections, "Rejecting status client: limit reached");
                    continue;
                }
                stats.active_connections.fetch_add(1, Ordering::Relaxed);

                tokio::spawn(serve_client(
                    stream,
                    addr,
                    latest.clone(),
                    shutdown.clone(),
                    Arc::clone(&stats),
                ));
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    debug!("Status accept loop finished");
}

async fn serve_client(
    stream: TcpStream,
    addr: SocketAddr,
    mut latest: watch::Receiver<Arc<str>>,
    mut shutdown: watch::Receiver<bool>,
    stats: Arc<HubStats>,
) {
    match accept_async(stream).await {
        Ok(ws) => {
            stats.connections_accepted.fetch_add(1, Ordering::Relaxed);
            info!(%addr, "Status client connected");

            let (mut ws_tx, mut ws_rx) = ws.split();

            let initial = latest.borrow_and_update().clone();
            let mut open = initial.is_empty()
                || ws_tx.send(Message::Text(initial.to_string())).await.is_ok();

            while open {
                tokio::select! {
                    changed = latest.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let text = latest.borrow_and_update().clone();
                        open = ws_tx.send(Message::Text(text.to_string())).await.is_ok();
                    }
                    incoming = ws_rx.next() => match incoming {
                        Some(Ok(Message::Text(raw))) => {
                            match serde_json::from_str::<ClientRequest>(&raw) {
                                Ok(req) if req.action == "close" => break,
                                Ok(req) if req.action == "snapshot" => {
                                    let text = latest.borrow().clone();
                                    open = ws_tx.send(Message::Text(text.to_string())).await.is_ok();
                                }
                                Ok(req) => debug!(%addr, action = %req.action, "Ignoring unknown action"),
                                Err(_) => debug!(%addr, "Ignoring malformed client message"),
                            }
                        }
                        Some(Ok(Message::Ping(payload))) => {
                            open = ws_tx.send(Message::Pong(payload)).await.is_ok();
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Err(e)) => {
                            debug!(%addr, error = %e, "Status client error");
                            break;
                        }
                        Some(Ok(_)) => {}
                    },
                    _ = shutdown.changed() => break,
                }
            }

            let _ = ws_tx.send(Message::Close(None)).await;
            info!(%addr, "Status client disconnected");
        }
        Err(e) => {
            warn!(%addr, error = %e, "Status client handshake failed");
        }
    }
    stats.active_connections.fetch_sub(1, Ordering::Relaxed);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback() -> StatusConfig {
        StatusConfig {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: 0,
            max_connections: 4,
        }
    }

    #[tokio::test]
    async fn broadcast_replaces_latest_snapshot() {
        let hub = WebSocketHub::new(loopback());
        hub.broadcast(r#"{"trades":1}"#);
        hub.broadcast(r#"{"trades":2}"#);

        assert_eq!(&*hub.latest(), r#"{"trades":2}"#);
        assert_eq!(hub.stats().snapshots_published.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn start_and_cleanup_are_repeatable() {
        let mut hub = WebSocketHub::new(loopback());
        hub.start().await.unwrap();
        hub.start().await.unwrap();
        assert!(hub.local_addr().is_some());

        hub.cleanup().await;
        hub.cleanup().await;
    }

    #[tokio::test]
    async fn bind_failure_is_reported() {
        let mut first = WebSocketHub::new(loopback());
        first.start().await.unwrap();

        let mut config = loopback();
        config.port = first.local_addr().unwrap().port();
        let mut second = WebSocketHub::new(config);
        assert!(matches!(second.start().await, Err(StatusError::Bind { .. })));

        first.cleanup().await;
    }
}
