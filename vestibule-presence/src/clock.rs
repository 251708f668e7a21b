// SPDX-License-Identifier: MIT OR Apache-2.0

use std::time::{SystemTime, UNIX_EPOCH};

use vestibule_core::Timestamp;

/// Source of the timestamps stamped onto presence transitions.
pub trait Clock {
    /// Milliseconds since the Unix epoch.
    fn now(&self) -> Timestamp;
}

/// The wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as u64)
            .unwrap_or(0)
    }
}

#[cfg(test)]
pub(crate) mod test_clock {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};

    use vestibule_core::Timestamp;

    use super::Clock;

    /// A hand-driven clock for deterministic duration assertions.
    #[derive(Clone, Debug, Default)]
    pub struct ManualClock(Arc<AtomicU64>);

    impl ManualClock {
        pub fn at(now: Timestamp) -> Self {
            Self(Arc::new(AtomicU64::new(now)))
        }

        pub fn advance(&self, by: u64) {
            self.0.fetch_add(by, Ordering::SeqCst);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Timestamp {
            self.0.load(Ordering::SeqCst)
        }
    }
}
