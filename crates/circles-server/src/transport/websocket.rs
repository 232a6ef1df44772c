//! WebSocket transport using tokio-tungstenite.
//!
//! Each accepted socket is split into a writer task, fed by the
//! connection's bounded [`Outbound`] queue, and a reader loop that drives
//! the [`Connection`] state machine one frame at a time.

use crate::connection::Connection;
use crate::context::ServerContext;
use crate::presence::{broadcast, ConnectionHandle, Outbound};
use circles_core::{CircleError, CircleResult, ServerFrame};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast as shutdown_channel, mpsc};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

/// Default maximum inbound frame size (1 MiB).
pub const MAX_WS_FRAME_SIZE: usize = 1_048_576;

/// Close code used when the server is going away.
const CLOSE_GOING_AWAY: u16 = 1001;

/// A handle to an accepted WebSocket connection.
pub struct WebSocketConnection {
    pub ws_stream: tokio_tungstenite::WebSocketStream<TcpStream>,
    pub remote_addr: SocketAddr,
}

/// Per-connection transport limits.
#[derive(Debug, Clone, Copy)]
pub struct TransportLimits {
    pub max_frame_bytes: usize,
    /// Depth of each connection's outbound queue.
    pub outbound_buffer: usize,
    /// Zero disables server pings.
    pub ping_interval: Duration,
}

impl Default for TransportLimits {
    fn default() -> Self {
        Self {
            max_frame_bytes: MAX_WS_FRAME_SIZE,
            outbound_buffer: 64,
            ping_interval: Duration::from_secs(30),
        }
    }
}

/// Bind and start accepting WebSocket upgrades.
///
/// Returns the bound address (useful with port 0) and a receiver that yields
/// accepted connections.
pub async fn start_listener(
    bind_addr: SocketAddr,
) -> CircleResult<(SocketAddr, mpsc::Receiver<WebSocketConnection>)> {
    let tcp_listener = TcpListener::bind(bind_addr)
        .await
        .map_err(|e| CircleError::Transport(format!("WS bind failed: {e}")))?;
    let local_addr = tcp_listener.local_addr()?;

    info!(addr = %local_addr, "WebSocket listener started");

    let (tx, rx) = mpsc::channel::<WebSocketConnection>(64);

    tokio::spawn(async move {
        loop {
            match tcp_listener.accept().await {
                Ok((stream, addr)) => {
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        match tokio_tungstenite::accept_async(stream).await {
                            Ok(ws_stream) => {
                                debug!(remote = %addr, "WebSocket connection accepted");
                                let conn = WebSocketConnection {
                                    ws_stream,
                                    remote_addr: addr,
                                };
                                if tx.send(conn).await.is_err() {
                                    warn!("WebSocket connection channel closed");
                                }
                            }
                            Err(e) => {
                                warn!(remote = %addr, error = %e, "WebSocket handshake failed");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "TCP accept failed");
                }
            }
            if tx.is_closed() {
                debug!("WebSocket accept loop stopped");
                break;
            }
        }
    });

    Ok((local_addr, rx))
}

/// Serve one WebSocket connection until either side closes it or the
/// server shuts down. Session cleanup always runs before this returns.
pub async fn run_connection(
    ctx: Arc<ServerContext>,
    ws: WebSocketConnection,
    limits: TransportLimits,
    mut shutdown: shutdown_channel::Receiver<()>,
) {
    let remote = ws.remote_addr;
    let (mut sink, mut stream) = ws.ws_stream.split();
    let (tx, mut rx) = mpsc::channel::<Outbound>(limits.outbound_buffer.max(1));
    let handle = ConnectionHandle::new(ctx.presence.next_connection_id(), tx);
    let conn_id = handle.id();
    let mut connection = Connection::new(ctx, handle.clone(), Some(remote.ip()));

    info!(conn_id, remote = %remote, "connection opened");

    let mut writer = tokio::spawn(async move {
        while let Some(out) = rx.recv().await {
            let msg = match out {
                Outbound::Text(text) => Message::Text(text.to_string().into()),
                Outbound::Ping(payload) => Message::Ping(payload.into()),
                Outbound::Pong(payload) => Message::Pong(payload.into()),
                Outbound::Close { code, reason } => {
                    let frame = CloseFrame {
                        code: CloseCode::from(code),
                        reason: reason.into(),
                    };
                    let _ = sink.send(Message::Close(Some(frame))).await;
                    break;
                }
            };
            if let Err(e) = sink.send(msg).await {
                debug!(conn_id, error = %e, "WS send failed");
                break;
            }
        }
        let _ = sink.close().await;
    });

    let ping_every = limits.ping_interval.max(Duration::from_secs(1));
    // A peer that has sent nothing, not even a pong, for two ping periods is gone.
    let idle_limit = ping_every * 2;
    let mut last_seen = Instant::now();
    let mut ping = tokio::time::interval(ping_every);
    // The first tick completes immediately.
    ping.tick().await;
    let mut writer_done = false;

    loop {
        tokio::select! {
            _ = &mut writer, if !writer_done => {
                writer_done = true;
                debug!(conn_id, "writer stopped, dropping connection");
                break;
            }
            _ = shutdown.recv() => {
                if let Some(text) = broadcast::serialize(&ServerFrame::shutdown("server shutting down")) {
                    handle.deliver(text);
                }
                handle.close(CLOSE_GOING_AWAY, "server shutting down");
                break;
            }
            _ = ping.tick(), if !limits.ping_interval.is_zero() => {
                if last_seen.elapsed() > idle_limit {
                    warn!(conn_id, idle_secs = last_seen.elapsed().as_secs(), "pong timeout, closing connection");
                    handle.close(CLOSE_GOING_AWAY, "pong timeout");
                    break;
                }
                if !handle.send_raw(Outbound::Ping(Vec::new())) {
                    debug!(conn_id, "ping not queued");
                }
            }
            msg = stream.next() => {
                if matches!(msg, Some(Ok(_))) {
                    last_seen = Instant::now();
                }
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if text.len() > limits.max_frame_bytes {
                            connection.reply_error(&frame_too_large(text.len(), limits.max_frame_bytes));
                            continue;
                        }
                        connection.handle_text(&text).await;
                    }
                    Some(Ok(Message::Binary(data))) => {
                        if data.len() > limits.max_frame_bytes {
                            connection.reply_error(&frame_too_large(data.len(), limits.max_frame_bytes));
                            continue;
                        }
                        match std::str::from_utf8(&data) {
                            Ok(text) => connection.handle_text(text).await,
                            Err(_) => connection.reply_error(&CircleError::protocol(
                                "payload",
                                "Binary frames must be UTF-8 JSON",
                            )),
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        handle.send_raw(Outbound::Pong(payload.to_vec()));
                    }
                    Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => {}
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        debug!(conn_id, error = %e, "WS recv failed");
                        break;
                    }
                }
            }
        }
    }

    connection.close().await;
    drop(connection);
    drop(handle);
    if !writer_done {
        let _ = writer.await;
    }
    info!(conn_id, remote = %remote, "connection closed");
}

fn frame_too_large(len: usize, max: usize) -> CircleError {
    debug!(len, max, "inbound frame too large");
    CircleError::protocol("payload", "Frame too large")
}
