//! Measurement client
//!
//! One session is one WebSocket connection: the sender in [`coordinator`]
//! keeps a single measurement in flight, a spawned task in [`receiver`]
//! matches replies and feeds [`RttStats`]. The session ends on Ctrl-C, when
//! the server closes the connection, or on a transport error.

pub mod connect;
pub mod coordinator;
pub mod receiver;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use rand::Rng;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::log_sink::LogSink;
use crate::snowflake::{Snowflake, MAX_NODE_ID};
use crate::stats::{RttReport, RttStats};

pub use connect::{build_request, connect, WsStream};
pub use coordinator::{ExchangeCoordinator, SingleFlight};
pub use receiver::{receive_loop, ReplyHandler, ReplyOutcome};

/// How long to wait for the server's close after sending ours.
pub const CLOSE_GRACE: Duration = Duration::from_secs(1);

enum Ending {
    Interrupted,
    ServerClosed,
    Failed(AppError),
}

/// Run a session until Ctrl-C.
pub async fn run(config: &Config, log_sink: &LogSink) -> AppResult<RttReport> {
    run_until(config, log_sink, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    })
    .await
}

/// Run a session until `shutdown` resolves, then print and return the
/// report.
pub async fn run_until<F>(config: &Config, log_sink: &LogSink, shutdown: F) -> AppResult<RttReport>
where
    F: Future<Output = ()>,
{
    let node_id = config
        .node_id
        .unwrap_or_else(|| rand::thread_rng().gen_range(0..=MAX_NODE_ID));
    let ids = Snowflake::new(node_id)?;

    let stream = connect(config).await?;
    info!(
        node_id,
        "Connected to WebSocket server at {}",
        config.websocket_url()
    );

    let (mut sink, stream) = stream.split();
    let stats = Arc::new(RttStats::new());
    let flight = Arc::new(SingleFlight::new());
    let mut receiver: JoinHandle<AppResult<()>> = tokio::spawn(receive_loop(
        stream,
        ReplyHandler::new(stats.clone(), flight.clone()),
    ));
    let mut coordinator =
        ExchangeCoordinator::new(ids, flight, config.payload_size, config.interval());

    tokio::pin!(shutdown);
    let ending = loop {
        tokio::select! {
            _ = &mut shutdown => break Ending::Interrupted,
            finished = &mut receiver => {
                break match finished {
                    Ok(Ok(())) => Ending::ServerClosed,
                    Ok(Err(e)) => Ending::Failed(e),
                    Err(e) => Ending::Failed(AppError::internal(&format!("receiver task failed: {}", e))),
                };
            }
            sent = coordinator.exchange(&mut sink) => {
                if let Err(e) = sent {
                    break Ending::Failed(e);
                }
            }
        }
    };

    let report = RttReport {
        snapshot: stats.snapshot(),
        messages_sent: coordinator.messages_sent(),
    };

    match ending {
        Ending::Interrupted => {
            log_sink.flush();
            println!("{}", report);

            let close = WsMessage::Close(Some(CloseFrame {
                code: CloseCode::Normal,
                reason: "".into(),
            }));
            if let Err(e) = sink.send(close).await {
                warn!("Failed to send close frame: {}", e);
            }
            if tokio::time::timeout(CLOSE_GRACE, &mut receiver).await.is_err() {
                info!("Server did not close the connection within {:?}", CLOSE_GRACE);
                receiver.abort();
            }
            Ok(report)
        }
        Ending::ServerClosed => {
            info!("Connection closed by server");
            log_sink.flush();
            println!("{}", report);
            Ok(report)
        }
        Ending::Failed(e) => {
            receiver.abort();
            error!("Session failed: {}", e);
            log_sink.flush();
            if report.snapshot.is_some() {
                println!("{}", report);
            }
            Err(e)
        }
    }
}
