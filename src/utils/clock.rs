use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use crate::interfaces::clock::Clock;
use crate::types::timestamp::Timestamp;

/// Manually driven clock for deterministic replays and tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    millis: AtomicU64,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        ManualClock {
            millis: AtomicU64::new(start.as_millis()),
        }
    }

    pub fn set(&self, at: Timestamp) {
        self.millis.store(at.as_millis(), Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) -> Timestamp {
        let step = by.as_millis() as u64;
        let previous = self.millis.fetch_add(step, Ordering::SeqCst);
        Timestamp::from_millis(previous + step)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_millis(self.millis.load(Ordering::SeqCst))
    }
}
