use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tracing::{debug, info, warn};

use super::coordinator::SingleFlight;
use crate::error::{AppError, AppResult};
use crate::models::Message;
use crate::stats::RttStats;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyOutcome {
    Recorded(Duration),
    /// Reply for an ID that is not the outstanding measurement.
    Unmatched,
    Malformed,
    /// The echoed timestamp lies in the future.
    ClockAnomaly,
}

/// Matches replies against the outstanding measurement.
pub struct ReplyHandler {
    stats: Arc<RttStats>,
    flight: Arc<SingleFlight>,
}

impl ReplyHandler {
    pub fn new(stats: Arc<RttStats>, flight: Arc<SingleFlight>) -> Self {
        Self { stats, flight }
    }

    pub fn on_payload(&self, payload: &[u8], received_at: DateTime<Utc>) -> ReplyOutcome {
        let message = match Message::parse(payload) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "Error unmarshalling response");
                return ReplyOutcome::Malformed;
            }
        };

        let matched = message
            .message_id
            .as_deref()
            .map(|id| self.flight.claim(id))
            .unwrap_or(false);
        if !matched {
            warn!(message_id = ?message.message_id, "Ignoring reply for unknown message");
            return ReplyOutcome::Unmatched;
        }

        let outcome = match message.rtt_at(received_at) {
            Some(rtt) => {
                self.stats.record(rtt);
                info!("Round-trip time: {} us", rtt.as_micros());
                ReplyOutcome::Recorded(rtt)
            }
            None => {
                warn!(
                    timestamp = %message.timestamp,
                    "Reply timestamp is in the future, discarding sample"
                );
                ReplyOutcome::ClockAnomaly
            }
        };

        // Stats first, so a report taken right after the release sees them.
        self.flight.release();
        outcome
    }
}

/// Read replies until the server closes the connection.
pub async fn receive_loop<St>(mut stream: St, handler: ReplyHandler) -> AppResult<()>
where
    St: Stream<Item = Result<WsMessage, WsError>> + Unpin,
{
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(WsMessage::Text(text)) => {
                handler.on_payload(text.as_bytes(), Utc::now());
            }
            Ok(WsMessage::Binary(data)) => {
                handler.on_payload(&data, Utc::now());
            }
            Ok(WsMessage::Ping(_)) => debug!("Received ping from server"),
            Ok(WsMessage::Close(frame)) => {
                debug!(?frame, "Server closed the connection");
            }
            Ok(_) => {}
            Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => break,
            Err(e) => return Err(AppError::Connection(e.to_string())),
        }
    }
    Ok(())
}
