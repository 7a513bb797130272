//! Connection liveness
//!
//! Every connection owns a [`HeartbeatMonitor`]. The read loop reports inbound
//! frames to it, and a dedicated task ([`HeartbeatMonitor::run`]) probes the
//! peer after `ping_period` of silence and closes the connection when a probe
//! stays unanswered for `pong_timeout`.

mod monitor;
mod task;

pub use monitor::{HeartbeatConfig, HeartbeatMonitor, Phase, TickAction};
pub use task::{HeartbeatExit, Probe, IDLE_TIMEOUT_REASON};
