//! Snowflake-style message identifiers
//!
//! An ID packs three fields into a `u64`:
//!
//! ```text
//! | 0 | 41 bits: ms since EPOCH | 10 bits: node | 12 bits: sequence |
//! ```
//!
//! IDs from one generator are strictly increasing as long as the clock does not
//! move backwards. When the sequence is exhausted within one millisecond the
//! generator spins until the clock ticks over; the wait is at most one
//! millisecond, so a busy spin is used instead of parking the thread.

use chrono::Utc;
use parking_lot::Mutex;

use crate::error::{AppError, AppResult};

pub const NODE_BITS: u32 = 10;
pub const SEQUENCE_BITS: u32 = 12;
pub const TIMESTAMP_SHIFT: u32 = NODE_BITS + SEQUENCE_BITS;
pub const MAX_NODE_ID: u16 = (1 << NODE_BITS) - 1;
pub const SEQUENCE_MASK: u64 = (1 << SEQUENCE_BITS) - 1;

/// 2020-01-01T00:00:00Z in milliseconds since the Unix epoch.
pub const EPOCH_MILLIS: i64 = 1_577_836_800_000;

/// Wall clock in milliseconds since the Unix epoch.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// The three fields of a generated ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdParts {
    pub timestamp: u64,
    pub node_id: u16,
    pub sequence: u16,
}

impl IdParts {
    pub fn decompose(id: u64) -> Self {
        Self {
            timestamp: id >> TIMESTAMP_SHIFT,
            node_id: ((id >> SEQUENCE_BITS) & MAX_NODE_ID as u64) as u16,
            sequence: (id & SEQUENCE_MASK) as u16,
        }
    }
}

#[derive(Debug)]
struct State {
    last_timestamp: Option<u64>,
    sequence: u64,
}

/// Per-session ID generator.
#[derive(Debug)]
pub struct Snowflake<C = SystemClock> {
    node_id: u64,
    clock: C,
    state: Mutex<State>,
}

impl Snowflake {
    pub fn new(node_id: u16) -> AppResult<Self> {
        Self::with_clock(node_id, SystemClock)
    }
}

impl<C: Clock> Snowflake<C> {
    pub fn with_clock(node_id: u16, clock: C) -> AppResult<Self> {
        if node_id > MAX_NODE_ID {
            return Err(AppError::InvalidNodeId {
                node_id: node_id as u64,
                max: MAX_NODE_ID as u64,
            });
        }

        Ok(Self {
            node_id: node_id as u64,
            clock,
            state: Mutex::new(State {
                last_timestamp: None,
                sequence: 0,
            }),
        })
    }

    pub fn node_id(&self) -> u16 {
        self.node_id as u16
    }

    /// Generate the next ID.
    ///
    /// Fails with [`AppError::ClockRegression`] when the clock reads earlier
    /// than the last issued timestamp (or earlier than [`EPOCH_MILLIS`]). The
    /// generator state is left untouched, so callers may retry later.
    pub fn next_id(&self) -> AppResult<u64> {
        let mut state = self.state.lock();
        let mut timestamp = self.elapsed()?;

        let sequence = match state.last_timestamp {
            Some(last) if timestamp < last => {
                return Err(AppError::ClockRegression {
                    millis: last - timestamp,
                });
            }
            Some(last) if timestamp == last => {
                let sequence = (state.sequence + 1) & SEQUENCE_MASK;
                if sequence == 0 {
                    // Sequence exhausted: spin until the next millisecond.
                    while timestamp <= last {
                        std::hint::spin_loop();
                        timestamp = self.elapsed()?;
                        if timestamp < last {
                            return Err(AppError::ClockRegression {
                                millis: last - timestamp,
                            });
                        }
                    }
                }
                sequence
            }
            _ => 0,
        };

        state.last_timestamp = Some(timestamp);
        state.sequence = sequence;

        Ok((timestamp << TIMESTAMP_SHIFT) | (self.node_id << SEQUENCE_BITS) | sequence)
    }

    fn elapsed(&self) -> AppResult<u64> {
        let millis = self.clock.now_millis() - EPOCH_MILLIS;
        u64::try_from(millis).map_err(|_| AppError::ClockRegression {
            millis: millis.unsigned_abs(),
        })
    }
}
