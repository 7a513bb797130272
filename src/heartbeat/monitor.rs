//! Liveness state machine
//!
//! Two phases:
//! - `Idle`: no probe outstanding, peer considered alive.
//! - `Probing`: a ping was sent and its pong has not arrived yet.
//!
//! Application frames refresh `last_activity` in either phase but only a pong
//! moves `Probing` back to `Idle`.

use std::time::Duration;

use parking_lot::Mutex;
use strum::Display;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// Silence after which a probe is sent.
    pub ping_period: Duration,
    /// Time a probe may stay unanswered before the peer is declared dead.
    pub pong_timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            ping_period: Duration::from_secs(10),
            pong_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Phase {
    Idle,
    Probing,
}

/// What the heartbeat task must do after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickAction {
    Wait,
    SendProbe,
    Expire { since_probe: Duration },
}

#[derive(Debug)]
struct Liveness {
    last_activity: Instant,
    last_probe_sent: Instant,
    probe_acknowledged: bool,
}

#[derive(Debug)]
pub struct HeartbeatMonitor {
    config: HeartbeatConfig,
    liveness: Mutex<Liveness>,
}

impl HeartbeatMonitor {
    pub fn new(config: HeartbeatConfig) -> Self {
        Self::starting_at(config, Instant::now())
    }

    pub fn starting_at(config: HeartbeatConfig, now: Instant) -> Self {
        Self {
            config,
            liveness: Mutex::new(Liveness {
                last_activity: now,
                last_probe_sent: now,
                probe_acknowledged: true,
            }),
        }
    }

    pub fn config(&self) -> HeartbeatConfig {
        self.config
    }

    pub fn phase(&self) -> Phase {
        if self.liveness.lock().probe_acknowledged {
            Phase::Idle
        } else {
            Phase::Probing
        }
    }

    pub fn last_activity(&self) -> Instant {
        self.liveness.lock().last_activity
    }

    /// Any inbound frame.
    pub fn on_activity(&self, now: Instant) {
        let mut liveness = self.liveness.lock();
        if now > liveness.last_activity {
            liveness.last_activity = now;
        }
    }

    /// Pong received.
    pub fn on_ack(&self, now: Instant) {
        let mut liveness = self.liveness.lock();
        liveness.probe_acknowledged = true;
        if now > liveness.last_activity {
            liveness.last_activity = now;
        }
    }

    /// Evaluate the state machine at `now`. A `SendProbe` result has already
    /// moved the monitor into `Probing`.
    pub fn on_tick(&self, now: Instant) -> TickAction {
        let mut liveness = self.liveness.lock();

        if !liveness.probe_acknowledged {
            let since_probe = now.saturating_duration_since(liveness.last_probe_sent);
            if since_probe >= self.config.pong_timeout {
                return TickAction::Expire { since_probe };
            }
            return TickAction::Wait;
        }

        if now.saturating_duration_since(liveness.last_activity) >= self.config.ping_period {
            liveness.probe_acknowledged = false;
            liveness.last_probe_sent = now;
            return TickAction::SendProbe;
        }

        TickAction::Wait
    }

    /// Earliest instant at which [`on_tick`](Self::on_tick) can return
    /// something other than `Wait`.
    pub fn next_deadline(&self) -> Instant {
        let liveness = self.liveness.lock();
        if liveness.probe_acknowledged {
            liveness.last_activity + self.config.ping_period
        } else {
            liveness.last_probe_sent + self.config.pong_timeout
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> HeartbeatConfig {
        HeartbeatConfig {
            ping_period: Duration::from_secs(10),
            pong_timeout: Duration::from_secs(30),
        }
    }

    #[test]
    fn test_starts_idle() {
        let start = Instant::now();
        let monitor = HeartbeatMonitor::starting_at(config(), start);
        assert_eq!(monitor.phase(), Phase::Idle);
        assert_eq!(monitor.last_activity(), start);
        assert_eq!(monitor.next_deadline(), start + Duration::from_secs(10));
    }

    #[test]
    fn test_no_ping_before_ping_period() {
        let start = Instant::now();
        let monitor = HeartbeatMonitor::starting_at(config(), start);
        assert_eq!(monitor.on_tick(start + Duration::from_secs(9)), TickAction::Wait);
        assert_eq!(monitor.phase(), Phase::Idle);
    }

    #[test]
    fn test_ping_after_ping_period() {
        let start = Instant::now();
        let monitor = HeartbeatMonitor::starting_at(config(), start);
        let at = start + Duration::from_secs(10);
        assert_eq!(monitor.on_tick(at), TickAction::SendProbe);
        assert_eq!(monitor.phase(), Phase::Probing);
        assert_eq!(monitor.next_deadline(), at + Duration::from_secs(30));
    }

    #[test]
    fn test_activity_postpones_ping() {
        let start = Instant::now();
        let monitor = HeartbeatMonitor::starting_at(config(), start);
        monitor.on_activity(start + Duration::from_secs(8));
        assert_eq!(monitor.on_tick(start + Duration::from_secs(10)), TickAction::Wait);
        assert_eq!(
            monitor.on_tick(start + Duration::from_secs(18)),
            TickAction::SendProbe
        );
    }

    #[test]
    fn test_ack_returns_to_idle() {
        let start = Instant::now();
        let monitor = HeartbeatMonitor::starting_at(config(), start);
        monitor.on_tick(start + Duration::from_secs(10));

        let acked_at = start + Duration::from_secs(11);
        monitor.on_ack(acked_at);
        assert_eq!(monitor.phase(), Phase::Idle);
        assert_eq!(monitor.last_activity(), acked_at);
        assert_eq!(monitor.on_tick(start + Duration::from_secs(45)), TickAction::SendProbe);
    }

    #[test]
    fn test_data_frames_do_not_clear_probing() {
        let start = Instant::now();
        let monitor = HeartbeatMonitor::starting_at(config(), start);
        monitor.on_tick(start + Duration::from_secs(10));

        monitor.on_activity(start + Duration::from_secs(20));
        assert_eq!(monitor.phase(), Phase::Probing);
        assert_eq!(
            monitor.on_tick(start + Duration::from_secs(40)),
            TickAction::Expire {
                since_probe: Duration::from_secs(30)
            }
        );
    }

    #[test]
    fn test_unanswered_ping_waits_for_timeout() {
        let start = Instant::now();
        let monitor = HeartbeatMonitor::starting_at(config(), start);
        monitor.on_tick(start + Duration::from_secs(10));
        assert_eq!(monitor.on_tick(start + Duration::from_secs(39)), TickAction::Wait);
        assert!(matches!(
            monitor.on_tick(start + Duration::from_secs(41)),
            TickAction::Expire { .. }
        ));
    }

    #[test]
    fn test_stale_timestamps_do_not_rewind_activity() {
        let start = Instant::now();
        let monitor = HeartbeatMonitor::starting_at(config(), start + Duration::from_secs(5));
        monitor.on_activity(start);
        assert_eq!(monitor.last_activity(), start + Duration::from_secs(5));
    }
}
