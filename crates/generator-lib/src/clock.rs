//! Wall-clock abstraction shared by flags, pods and metric phases

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::fmt::Debug;
use std::sync::Arc;

/// Source of the current time
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> DateTime<Utc>;
}

/// Shared handle passed to every component that reads time
pub type SharedClock = Arc<dyn Clock>;

/// Real wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to
///
/// Clones share the same instant, so a test can keep one handle and hand
/// another to the engine.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<RwLock<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(RwLock::new(start)),
        }
    }

    /// Move the clock forward (or backward for negative deltas)
    pub fn advance(&self, delta: chrono::Duration) {
        let mut now = self.now.write();
        *now += delta;
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        *self.now.write() = instant;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read()
    }
}

/// Nanoseconds since the Unix epoch, saturating at zero for pre-epoch instants
pub fn unix_nanos(instant: DateTime<Utc>) -> u64 {
    instant
        .timestamp_nanos_opt()
        .map(|n| n.max(0) as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_manual_clock_clones_share_time() {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        let handle: SharedClock = Arc::new(clock.clone());

        clock.advance(chrono::Duration::minutes(5));

        assert_eq!(
            handle.now(),
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 5, 0).unwrap()
        );
    }

    #[test]
    fn test_unix_nanos() {
        let instant = Utc.timestamp_opt(1, 500).unwrap();
        assert_eq!(unix_nanos(instant), 1_000_000_500);
    }
}
