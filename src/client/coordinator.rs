//! Send side of a measurement session
//!
//! Exactly one measurement is in flight at any time: the coordinator registers
//! the outgoing ID with [`SingleFlight`] before sending and does not compose
//! the next message until the receiver has matched the reply and released it.

use std::sync::Arc;
use std::time::Duration;

use futures::{Sink, SinkExt};
use parking_lot::Mutex;
use rand::distributions::Alphanumeric;
use rand::Rng;
use tokio::sync::Notify;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tracing::warn;

use crate::error::AppResult;
use crate::models::Message;
use crate::snowflake::{Clock, Snowflake, SystemClock};

/// Hand-off between the sender and the receiver task.
///
/// `release` stores at most one permit, so a reply that arrives before the
/// sender starts waiting is not lost and two replies never release twice.
#[derive(Debug, Default)]
pub struct SingleFlight {
    outstanding: Mutex<Option<String>>,
    released: Notify,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the ID about to be sent.
    pub fn begin(&self, message_id: String) {
        let previous = self.outstanding.lock().replace(message_id);
        if let Some(previous) = previous {
            warn!(message_id = %previous, "Abandoning unanswered measurement");
        }
    }

    /// Take the outstanding slot if `message_id` matches it.
    pub fn claim(&self, message_id: &str) -> bool {
        let mut outstanding = self.outstanding.lock();
        if outstanding.as_deref() == Some(message_id) {
            *outstanding = None;
            true
        } else {
            false
        }
    }

    /// Let the sender compose the next message.
    pub fn release(&self) {
        self.released.notify_one();
    }

    pub async fn wait(&self) {
        self.released.notified().await;
    }

    pub fn outstanding(&self) -> Option<String> {
        self.outstanding.lock().clone()
    }
}

/// After this long without a reply the sender logs that it is still waiting.
pub const REPLY_WARN_AFTER: Duration = Duration::from_secs(5);

pub fn random_content(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

pub struct ExchangeCoordinator<C = SystemClock> {
    ids: Snowflake<C>,
    flight: Arc<SingleFlight>,
    payload_size: usize,
    interval: Duration,
    sent: u64,
}

impl<C: Clock> ExchangeCoordinator<C> {
    pub fn new(
        ids: Snowflake<C>,
        flight: Arc<SingleFlight>,
        payload_size: usize,
        interval: Duration,
    ) -> Self {
        Self {
            ids,
            flight,
            payload_size,
            interval,
            sent: 0,
        }
    }

    pub fn messages_sent(&self) -> u64 {
        self.sent
    }

    /// Build the next measurement message.
    pub fn compose(&self) -> AppResult<Message> {
        let id = self.ids.next_id()?;
        Ok(Message::new(
            random_content(self.payload_size),
            Some(id.to_string()),
        ))
    }

    /// Run one measurement: send, then wait for the matching reply and the
    /// send interval, whichever takes longer.
    ///
    /// A clock regression skips the round instead of failing the session. A
    /// lost reply is never given up on: the session then waits for Ctrl-C or
    /// the server closing the connection.
    pub async fn exchange<S>(&mut self, sink: &mut S) -> AppResult<()>
    where
        S: Sink<WsMessage, Error = WsError> + Unpin,
    {
        let message = match self.compose() {
            Ok(message) => message,
            Err(err) if !err.is_fatal() => {
                warn!(error = %err, "Error generating snowflake ID");
                tokio::time::sleep(self.interval).await;
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        let payload = message.to_json()?;
        if let Some(id) = message.message_id {
            self.flight.begin(id);
        }

        sink.send(WsMessage::Text(payload)).await?;
        self.sent += 1;

        tokio::join!(tokio::time::sleep(self.interval), self.await_reply());
        Ok(())
    }

    async fn await_reply(&self) {
        let released = self.flight.wait();
        tokio::pin!(released);
        if tokio::time::timeout(REPLY_WARN_AFTER, &mut released)
            .await
            .is_err()
        {
            warn!(
                message_id = ?self.flight.outstanding(),
                "No reply after {:?}, still waiting", REPLY_WARN_AFTER
            );
            released.await;
        }
    }
}
