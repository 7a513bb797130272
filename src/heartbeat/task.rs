use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::{self, Instant};
use tracing::{debug, warn};

use super::monitor::{HeartbeatMonitor, TickAction};

/// Close reason sent when a peer fails its liveness check.
pub const IDLE_TIMEOUT_REASON: &str = "Idle timeout";

/// Control frames the heartbeat asks the connection writer to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    Ping,
    Close { reason: &'static str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatExit {
    /// The outbound queue was dropped: the connection already ended.
    ConnectionClosed,
    /// The peer left a probe unanswered for at least `pong_timeout`.
    ProbeTimeout(Duration),
}

impl HeartbeatMonitor {
    /// Drive the monitor until the peer is declared dead or the connection
    /// goes away.
    ///
    /// The task sleeps until the monitor's next deadline instead of polling on
    /// a fixed ticker, so a silent peer is closed exactly
    /// `ping_period + pong_timeout` after its last activity. Probes never wait
    /// for queue space, so a backed-up writer cannot hold the deadline back.
    pub async fn run<T>(self: Arc<Self>, outbound: mpsc::Sender<T>) -> HeartbeatExit
    where
        T: From<Probe> + Send + 'static,
    {
        loop {
            let deadline = self.next_deadline();
            tokio::select! {
                _ = time::sleep_until(deadline) => {}
                _ = outbound.closed() => return HeartbeatExit::ConnectionClosed,
            }

            match self.on_tick(Instant::now()) {
                TickAction::Wait => {}
                TickAction::SendProbe => {
                    debug!("Connection idle, sending ping");
                    match outbound.try_send(Probe::Ping.into()) {
                        Ok(()) => {}
                        // A peer that stops reading backs the queue up; the
                        // probe counts as sent and expires like any other.
                        Err(TrySendError::Full(_)) => {
                            debug!("Outbound queue full, ping not queued")
                        }
                        Err(TrySendError::Closed(_)) => return HeartbeatExit::ConnectionClosed,
                    }
                }
                TickAction::Expire { since_probe } => {
                    warn!(
                        "Peer didn't respond to ping within {:?}. Closing connection.",
                        since_probe
                    );
                    // Best effort: the writer may be gone or stuck.
                    let _ = outbound.try_send(
                        Probe::Close {
                            reason: IDLE_TIMEOUT_REASON,
                        }
                        .into(),
                    );
                    return HeartbeatExit::ProbeTimeout(since_probe);
                }
            }
        }
    }
}
