//! Echo endpoint
//!
//! Each connection runs three pieces: a writer task that owns the socket sink
//! and drains the outbound queue, the heartbeat task, and the read loop that
//! echoes measurement messages. The connection ends when the peer closes it,
//! on a transport error, or when the heartbeat gives up on the peer.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{close_code, CloseFrame, Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::http::HeaderMap;
use axum::response::Response;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use metrics::{decrement_gauge, increment_counter, increment_gauge};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::api::AppState;
use crate::error::{AppError, AppResult};
use crate::heartbeat::{HeartbeatExit, HeartbeatMonitor, Probe};
use crate::models::EchoMessage;

const OUTBOUND_QUEUE: usize = 64;

/// How long a finished connection may spend flushing its outbound queue.
pub const WRITER_GRACE: Duration = Duration::from_secs(1);

/// Frames queued for the writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
    Ping,
    Close(&'static str),
}

impl From<Probe> for Outbound {
    fn from(probe: Probe) -> Self {
        match probe {
            Probe::Ping => Outbound::Ping,
            Probe::Close { reason } => Outbound::Close(reason),
        }
    }
}

/// Reply for one inbound payload: every field carried back unchanged.
pub fn echo_reply(payload: &[u8]) -> AppResult<String> {
    EchoMessage::parse(payload)?.to_json()
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    remote: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
) -> Response {
    let peer = remote
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    if let Some(forwarded) = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
    {
        info!(%peer, "X-Forwarded-For: {}", forwarded);
    }

    ws.on_upgrade(move |socket| handle_socket(socket, state, peer))
}

enum Ending {
    Read(AppResult<()>),
    Heartbeat(HeartbeatExit),
}

async fn handle_socket(socket: WebSocket, state: AppState, peer: String) {
    let conn_id = Uuid::new_v4();
    increment_counter!("ws_rtt_connections_total");
    increment_gauge!("ws_rtt_active_connections", 1.0);
    info!(%conn_id, %peer, "Client connected");

    let (sink, stream) = socket.split();
    let (tx, rx) = mpsc::channel::<Outbound>(OUTBOUND_QUEUE);
    let writer = tokio::spawn(write_loop(sink, rx, conn_id));

    let monitor = Arc::new(HeartbeatMonitor::new(state.heartbeat));
    let mut heartbeat = tokio::spawn(monitor.clone().run(tx.clone()));

    let ending = {
        let read = read_loop(stream, monitor, tx, conn_id);
        tokio::pin!(read);
        tokio::select! {
            result = &mut read => Ending::Read(result),
            exit = &mut heartbeat => Ending::Heartbeat(exit.unwrap_or(HeartbeatExit::ConnectionClosed)),
        }
    };

    match ending {
        Ending::Read(result) => {
            heartbeat.abort();
            let _ = heartbeat.await;
            match result {
                Ok(()) => debug!(%conn_id, "Read loop finished"),
                Err(e) => warn!(%conn_id, "Error reading message: {}", e),
            }
        }
        Ending::Heartbeat(HeartbeatExit::ProbeTimeout(since_probe)) => {
            increment_counter!("ws_rtt_probe_timeouts_total");
            let err = AppError::ProbeTimeout(since_probe);
            warn!(%conn_id, %peer, "{}", err);
        }
        Ending::Heartbeat(HeartbeatExit::ConnectionClosed) => {}
    }

    // Every sender is gone now; the writer drains what is queued and exits
    // unless the socket is stuck, in which case dropping it ends the
    // connection.
    if !drain_writer(writer).await {
        warn!(%conn_id, %peer, "Writer stuck, dropping connection");
    }
    decrement_gauge!("ws_rtt_active_connections", 1.0);
    info!(%conn_id, %peer, "Client disconnected");
}

/// Wait up to [`WRITER_GRACE`] for the writer, aborting it after that.
/// Returns whether it finished on its own.
async fn drain_writer(mut writer: JoinHandle<()>) -> bool {
    if tokio::time::timeout(WRITER_GRACE, &mut writer).await.is_ok() {
        return true;
    }
    writer.abort();
    let _ = writer.await;
    false
}

async fn read_loop(
    mut stream: SplitStream<WebSocket>,
    monitor: Arc<HeartbeatMonitor>,
    outbound: mpsc::Sender<Outbound>,
    conn_id: Uuid,
) -> AppResult<()> {
    while let Some(frame) = stream.next().await {
        let frame = frame?;
        let now = Instant::now();
        monitor.on_activity(now);

        let payload = match frame {
            WsMessage::Text(text) => text.into_bytes(),
            WsMessage::Binary(data) => data,
            WsMessage::Pong(_) => {
                monitor.on_ack(now);
                continue;
            }
            WsMessage::Ping(_) => continue,
            WsMessage::Close(frame) => {
                debug!(%conn_id, ?frame, "Client sent close");
                break;
            }
        };

        match echo_reply(&payload) {
            Ok(reply) => {
                if outbound.send(Outbound::Text(reply)).await.is_err() {
                    break;
                }
                increment_counter!("ws_rtt_messages_echoed_total");
            }
            Err(e) => {
                increment_counter!("ws_rtt_malformed_messages_total");
                warn!(%conn_id, "Error parsing message: {}", e);
            }
        }
    }
    Ok(())
}

async fn write_loop(
    mut sink: SplitSink<WebSocket, WsMessage>,
    mut outbound: mpsc::Receiver<Outbound>,
    conn_id: Uuid,
) {
    while let Some(item) = outbound.recv().await {
        let frame = match item {
            Outbound::Text(text) => WsMessage::Text(text),
            Outbound::Ping => WsMessage::Ping(Vec::new()),
            Outbound::Close(reason) => {
                let close = WsMessage::Close(Some(CloseFrame {
                    code: close_code::NORMAL,
                    reason: reason.into(),
                }));
                if let Err(e) = sink.send(close).await {
                    debug!(%conn_id, "Failed to send close frame: {}", e);
                }
                break;
            }
        };

        if let Err(e) = sink.send(frame).await {
            warn!(%conn_id, "Error sending response: {}", e);
            break;
        }
    }
    let _ = sink.close().await;
}
