//! Round-trip time statistics

use std::fmt;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;

#[derive(Debug)]
struct Totals {
    count: u64,
    sum: Duration,
    min: Duration,
    max: Duration,
}

impl Default for Totals {
    fn default() -> Self {
        Self {
            count: 0,
            sum: Duration::ZERO,
            min: Duration::MAX,
            max: Duration::ZERO,
        }
    }
}

/// Accumulates RTT samples recorded by the receiver task.
///
/// Every field lives behind one lock; snapshots never observe a half-applied
/// sample.
#[derive(Debug, Default)]
pub struct RttStats {
    totals: Mutex<Totals>,
}

/// Consistent view of the recorded samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RttSnapshot {
    pub count: u64,
    pub min: Duration,
    pub max: Duration,
    pub sum: Duration,
    pub average: Duration,
}

impl RttStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, rtt: Duration) {
        let mut totals = self.totals.lock();
        totals.count += 1;
        totals.sum = totals.sum.saturating_add(rtt);
        if rtt < totals.min {
            totals.min = rtt;
        }
        if rtt > totals.max {
            totals.max = rtt;
        }
    }

    /// `None` until at least one sample has been recorded.
    pub fn snapshot(&self) -> Option<RttSnapshot> {
        let totals = self.totals.lock();
        if totals.count == 0 {
            return None;
        }

        let average = totals.sum.as_nanos() / totals.count as u128;
        Some(RttSnapshot {
            count: totals.count,
            min: totals.min,
            max: totals.max,
            sum: totals.sum,
            average: Duration::from_nanos(average as u64),
        })
    }
}

/// Final summary printed when a client session ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RttReport {
    pub snapshot: Option<RttSnapshot>,
    pub messages_sent: u64,
}

impl fmt::Display for RttReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(snapshot) = self.snapshot else {
            return write!(f, "\nNo messages were exchanged.");
        };

        writeln!(f, "\nApproximate round trip times in micro-seconds:")?;
        writeln!(
            f,
            "    Minimum = {}us, Maximum = {}us, Average = {}us",
            snapshot.min.as_micros(),
            snapshot.max.as_micros(),
            snapshot.average.as_micros()
        )?;
        writeln!(f, "Messages received: {}", snapshot.count)?;
        write!(f, "Messages sent: {}", self.messages_sent)
    }
}
