//! Restartable fixed-interval timer.

use std::time::Duration;

use tokio::time::Instant;
use tracing::trace;

/// A repeat-forever timer with explicit `start`/`stop`, polled by the frame
/// loop.
///
/// A cadence first fires one full interval after [`start`](Self::start).
/// When polled late it fires once and skips ahead, keeping its original
/// phase; missed periods are never replayed. A stopped cadence never fires,
/// so callbacks gated on it can't run after `stop`.
///
/// ```rust
/// use std::time::Duration;
/// use cubesync_tick::Cadence;
/// use tokio::time::Instant;
///
/// let t0 = Instant::now();
/// let mut report = Cadence::new(Duration::from_millis(200));
/// report.start(t0);
///
/// assert!(!report.fire(t0 + Duration::from_millis(199)));
/// assert!(report.fire(t0 + Duration::from_millis(200)));
/// // 3.5 periods late: fires once, next due at 1000 ms.
/// assert!(report.fire(t0 + Duration::from_millis(900)));
/// assert!(!report.fire(t0 + Duration::from_millis(999)));
/// assert!(report.fire(t0 + Duration::from_millis(1000)));
/// ```
#[derive(Debug, Clone)]
pub struct Cadence {
    interval: Duration,
    next_due: Option<Instant>,
}

impl Cadence {
    /// A stopped cadence with the given interval.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_due: None,
        }
    }

    /// Starts (or restarts) the cadence. The first fire is due at
    /// `now + interval`.
    pub fn start(&mut self, now: Instant) {
        self.next_due = Some(now + self.interval);
    }

    /// Stops the cadence. Idempotent.
    pub fn stop(&mut self) {
        self.next_due = None;
    }

    pub fn is_running(&self) -> bool {
        self.next_due.is_some()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// When the next fire is due, or `None` while stopped.
    pub fn next_due(&self) -> Option<Instant> {
        self.next_due
    }

    /// Returns `true` if the cadence is due at `now`, and schedules the
    /// next fire.
    pub fn fire(&mut self, now: Instant) -> bool {
        let Some(due) = self.next_due else {
            return false;
        };
        if now < due {
            return false;
        }

        if self.interval.is_zero() {
            self.next_due = Some(now);
            return true;
        }

        let late_by = now.saturating_duration_since(due);
        let missed = late_by.as_nanos() / self.interval.as_nanos();
        let next = u32::try_from(missed + 1)
            .ok()
            .and_then(|periods| self.interval.checked_mul(periods))
            .and_then(|offset| due.checked_add(offset))
            .unwrap_or(now + self.interval);
        if missed > 0 {
            trace!(
                missed = missed as u64,
                interval_ms = self.interval.as_millis() as u64,
                "cadence late, skipping ahead"
            );
        }
        self.next_due = Some(next);
        true
    }
}
