//! Core server: accepts WebSocket connections and runs each on its own task.
//!
//! Owns the shared [`ServerContext`] and the shutdown broadcast. Housekeeping
//! (auth rate-limiter GC) runs alongside the accept loop.

use crate::auth::JwtVerifier;
use crate::config::ServerConfig;
use crate::context::ServerContext;
use crate::presence::NotificationBridge;
use crate::store::CircleStore;
use crate::transport::websocket::{self, WebSocketConnection};
use circles_core::CircleResult;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// How long `serve` waits for connection tasks after shutdown.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// How often idle rate-limiter entries are dropped.
const GC_INTERVAL: Duration = Duration::from_secs(60);

/// The circles server instance.
pub struct CircleServer {
    config: ServerConfig,
    ctx: Arc<ServerContext>,
    shutdown_tx: broadcast::Sender<()>,
}

/// Cloneable trigger for graceful shutdown.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: broadcast::Sender<()>,
}

impl ShutdownHandle {
    /// Ask the accept loop and every connection to stop.
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }
}

impl CircleServer {
    /// Build a server whose tokens are verified with the configured secret.
    pub fn new(config: ServerConfig, store: Arc<dyn CircleStore>) -> Self {
        let verifier = Arc::new(JwtVerifier::new(config.access_secret.clone()));
        let ctx = ServerContext::new(store, verifier)
            .with_auth_limit(config.max_auth_attempts_per_minute)
            .with_store_timeout(config.store_timeout);
        Self::with_context(config, Arc::new(ctx))
    }

    pub fn with_context(config: ServerConfig, ctx: Arc<ServerContext>) -> Self {
        Self {
            config,
            ctx,
            shutdown_tx: broadcast::channel(1).0,
        }
    }

    pub fn context(&self) -> Arc<ServerContext> {
        self.ctx.clone()
    }

    /// Entry point for code that pushes to users outside the frame flow.
    pub fn bridge(&self) -> NotificationBridge {
        self.ctx.bridge()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: self.shutdown_tx.clone(),
        }
    }

    /// Bind the WebSocket listener.
    pub async fn listen(self) -> CircleResult<ListeningServer> {
        let (local_addr, conns) = websocket::start_listener(self.config.bind_addr).await?;
        let shutdown_rx = self.shutdown_tx.subscribe();
        Ok(ListeningServer {
            local_addr,
            server: self,
            conns,
            shutdown_rx,
        })
    }
}

/// A bound server that has not started accepting yet.
pub struct ListeningServer {
    local_addr: SocketAddr,
    server: CircleServer,
    conns: mpsc::Receiver<WebSocketConnection>,
    shutdown_rx: broadcast::Receiver<()>,
}

impl ListeningServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept connections until shutdown is triggered, then give open
    /// connections a short window to say goodbye.
    pub async fn serve(self) -> CircleResult<()> {
        let ListeningServer {
            local_addr,
            server,
            mut conns,
            mut shutdown_rx,
        } = self;
        let limits = server.config.transport_limits();

        let gc_ctx = server.ctx.clone();
        let mut gc_shutdown = server.shutdown_tx.subscribe();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(GC_INTERVAL);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let mut limits = gc_ctx.auth_limits.lock().await;
                        limits.gc();
                        debug!(tracked = limits.tracked(), "auth limiter gc");
                    }
                    _ = gc_shutdown.recv() => break,
                }
            }
        });

        info!(
            addr = %local_addr,
            max_frame_bytes = limits.max_frame_bytes,
            ping_interval_secs = limits.ping_interval.as_secs(),
            "circles-server ready"
        );

        let mut tasks = JoinSet::new();
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("shutdown requested, closing connections");
                    break;
                }
                Some(ws_conn) = conns.recv() => {
                    let ctx = server.ctx.clone();
                    let shutdown = server.shutdown_tx.subscribe();
                    tasks.spawn(websocket::run_connection(ctx, ws_conn, limits, shutdown));
                }
                Some(res) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = res {
                        warn!(error = %e, "connection task failed");
                    }
                }
            }
        }

        let open = tasks.len();
        let drained = tokio::time::timeout(DRAIN_TIMEOUT, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(open, "connections still open after drain timeout");
            tasks.abort_all();
        }

        let online = server.ctx.presence.online_users().await.len();
        info!(online, "server stopped");
        Ok(())
    }
}
