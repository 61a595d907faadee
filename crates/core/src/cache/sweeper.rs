//! Rate limiting for background expiration sweeps.
//!
//! Every cache operation asks the sweeper whether a sweep is due. The check
//! holds the lock only for a timestamp comparison; the caller runs the sweep
//! after the lock is released.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};

use crate::clock::Clock;

/// Last-scan gate for expired-entry deletion.
#[derive(Debug)]
pub struct ExpirationSweeper {
    last_scan: Mutex<Option<DateTime<Utc>>>,
    interval: Duration,
    clock: Arc<dyn Clock>,
}

impl ExpirationSweeper {
    /// The first call to [`try_begin`](Self::try_begin) always starts a sweep.
    pub fn new(interval: Duration, clock: Arc<dyn Clock>) -> Self {
        Self { last_scan: Mutex::new(None), interval, clock }
    }

    /// Returns `true` when the caller should start a sweep now.
    ///
    /// The last-scan timestamp is moved to `now` before returning `true`, so
    /// concurrent callers within the same interval get `false` even while the
    /// sweep is still pending.
    pub fn try_begin(&self) -> bool {
        let mut last_scan = self.last_scan.lock().unwrap_or_else(PoisonError::into_inner);
        let now = self.clock.now();

        if let Some(last) = *last_scan {
            if now - last <= self.interval {
                return false;
            }
        }

        *last_scan = Some(now);
        true
    }

    pub fn last_scan(&self) -> Option<DateTime<Utc>> {
        *self.last_scan.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn sweeper(clock: &Arc<ManualClock>) -> ExpirationSweeper {
        ExpirationSweeper::new(Duration::minutes(30), clock.clone())
    }

    #[test]
    fn test_first_check_triggers() {
        let clock = Arc::new(ManualClock::new());
        let sweeper = sweeper(&clock);
        assert!(sweeper.try_begin());
        assert_eq!(sweeper.last_scan(), Some(clock.now()));
    }

    #[test]
    fn test_within_interval_does_not_trigger() {
        let clock = Arc::new(ManualClock::new());
        let sweeper = sweeper(&clock);
        assert!(sweeper.try_begin());

        clock.advance(Duration::minutes(10));
        assert!(!sweeper.try_begin());

        // exactly one interval later is still within it
        clock.advance(Duration::minutes(20));
        assert!(!sweeper.try_begin());
    }

    #[test]
    fn test_after_interval_triggers_once() {
        let clock = Arc::new(ManualClock::new());
        let sweeper = sweeper(&clock);
        assert!(sweeper.try_begin());

        clock.advance(Duration::minutes(31));
        assert!(sweeper.try_begin());
        assert!(!sweeper.try_begin());
        assert_eq!(sweeper.last_scan(), Some(clock.now()));
    }

    #[test]
    fn test_concurrent_callers_trigger_once() {
        let clock = Arc::new(ManualClock::new());
        let sweeper = Arc::new(sweeper(&clock));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let sweeper = Arc::clone(&sweeper);
                std::thread::spawn(move || sweeper.try_begin())
            })
            .collect();

        let triggered = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|started| *started)
            .count();
        assert_eq!(triggered, 1);
    }
}
