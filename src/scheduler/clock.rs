//! Time sources and the tick timer.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Injectable time source
pub trait Clock: Send {
    /// Monotonic time since the clock was created
    fn elapsed(&self) -> Duration;

    /// Wall-clock time used to stamp published samples
    fn wall_time(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone)]
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    fn wall_time(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Hand-driven clock for tests. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    nanos: Arc<AtomicU64>,
    epoch: DateTime<Utc>,
}

impl ManualClock {
    pub fn new(epoch: DateTime<Utc>) -> Self {
        Self {
            nanos: Arc::new(AtomicU64::new(0)),
            epoch,
        }
    }

    pub fn advance(&self, by: Duration) {
        self.nanos.fetch_add(by.as_nanos() as u64, Ordering::SeqCst);
    }

    pub fn set(&self, elapsed: Duration) {
        self.nanos.store(elapsed.as_nanos() as u64, Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(DateTime::<Utc>::UNIX_EPOCH)
    }
}

impl Clock for ManualClock {
    fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }

    fn wall_time(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.elapsed()).unwrap_or_else(|_| chrono::Duration::zero());
        self.epoch + elapsed
    }
}

/// Fixed-period timer polled by the scheduler.
///
/// When a poll arrives more than one period late the missed ticks are
/// skipped, not replayed, and the next deadline is realigned to the period
/// grid. With `skip_missed` off, late ticks fire back to back until caught up.
#[derive(Debug, Clone)]
pub struct IntervalTimer {
    period: Duration,
    next_due: Option<Duration>,
    skip_missed: bool,
    missed_ticks: u64,
}

impl IntervalTimer {
    pub fn new(period: Duration, skip_missed: bool) -> Self {
        Self {
            period: period.max(Duration::from_millis(1)),
            next_due: None,
            skip_missed,
            missed_ticks: 0,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn set_period(&mut self, period: Duration, now: Duration) {
        self.period = period.max(Duration::from_millis(1));
        if self.next_due.is_some() {
            self.next_due = Some(now + self.period);
        }
    }

    /// Arm the timer; the first tick is due one period from `now`
    pub fn arm(&mut self, now: Duration) {
        self.next_due = Some(now + self.period);
    }

    pub fn disarm(&mut self) {
        self.next_due = None;
    }

    pub fn is_armed(&self) -> bool {
        self.next_due.is_some()
    }

    pub fn missed_ticks(&self) -> u64 {
        self.missed_ticks
    }

    /// Time until the next tick, zero if one is due, `None` when disarmed
    pub fn time_until_due(&self, now: Duration) -> Option<Duration> {
        self.next_due.map(|due| due.saturating_sub(now))
    }

    /// Consume a due tick, if any
    pub fn poll(&mut self, now: Duration) -> bool {
        let Some(due) = self.next_due else {
            return false;
        };
        if now < due {
            return false;
        }

        let late_periods = ((now - due).as_nanos() / self.period.as_nanos()) as u64;
        if self.skip_missed && late_periods > 0 {
            self.missed_ticks += late_periods;
            tracing::debug!("Tick timer skipped {} missed ticks", late_periods);
            self.next_due = Some(due + self.period * (late_periods as u32 + 1));
        } else {
            self.next_due = Some(due + self.period);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MS: Duration = Duration::from_millis(1);

    #[test]
    fn test_fires_once_per_period() {
        let mut timer = IntervalTimer::new(100 * MS, true);
        assert!(!timer.poll(Duration::ZERO));
        timer.arm(Duration::ZERO);
        assert!(!timer.poll(99 * MS));
        assert!(timer.poll(100 * MS));
        assert!(!timer.poll(150 * MS));
        assert!(timer.poll(200 * MS));
    }

    #[test]
    fn test_skips_missed_ticks() {
        let mut timer = IntervalTimer::new(100 * MS, true);
        timer.arm(Duration::ZERO);
        assert!(timer.poll(450 * MS));
        assert_eq!(timer.missed_ticks(), 3);
        // Realigned to the grid: next tick at 500
        assert!(!timer.poll(499 * MS));
        assert!(timer.poll(500 * MS));
    }

    #[test]
    fn test_catch_up_without_skipping() {
        let mut timer = IntervalTimer::new(100 * MS, false);
        timer.arm(Duration::ZERO);
        let fired = (0..5).filter(|_| timer.poll(350 * MS)).count();
        assert_eq!(fired, 3);
        assert_eq!(timer.missed_ticks(), 0);
    }

    #[test]
    fn test_disarm_and_time_until_due() {
        let mut timer = IntervalTimer::new(50 * MS, true);
        assert_eq!(timer.time_until_due(Duration::ZERO), None);
        timer.arm(10 * MS);
        assert_eq!(timer.time_until_due(20 * MS), Some(40 * MS));
        timer.disarm();
        assert!(!timer.poll(1000 * MS));
    }

    #[test]
    fn test_manual_clock_shared() {
        let clock = ManualClock::default();
        let other = clock.clone();
        clock.advance(Duration::from_secs(2));
        assert_eq!(other.elapsed(), Duration::from_secs(2));
        assert_eq!(other.wall_time().timestamp(), 2);
    }
}
