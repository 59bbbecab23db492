//! Idle tracking for one monitored point.
//!
//! The data path calls [`IdleTracker::update`] on every unit; health checks
//! call [`IdleTracker::check`] or [`IdleTracker::is_healthy`] from any
//! thread. The only shared mutable value is the last-activity timestamp,
//! held in a single atomic word. Last write wins: readers tolerate
//! staleness up to the threshold, so ordering between writers and readers
//! does not matter.

use crate::clock::{Clock, SystemClock};
use crossbeam_utils::CachePadded;
use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Result of one staleness evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdleReport {
    /// Time since data was last observed.
    pub idle: Duration,
    /// Threshold the idle time was compared against.
    pub threshold: Duration,
}

impl IdleReport {
    /// True iff the idle time is strictly below the threshold.
    #[inline]
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.idle < self.threshold
    }
}

/// Records when data last passed a monitored point.
///
/// A new tracker starts out exactly one threshold stale, so it reports
/// unhealthy until the first [`update`](IdleTracker::update).
pub struct IdleTracker {
    /// Nanoseconds since the clock origin of the last observed unit.
    /// Negative until the first update when the clock origin is recent.
    last_activity_ns: CachePadded<AtomicI64>,
    /// Idle time computed by the most recent health evaluation.
    last_idle_ns: AtomicU64,
    /// Number of updates since construction.
    updates: AtomicU64,
    threshold: Duration,
    clock: Arc<dyn Clock>,
}

impl IdleTracker {
    /// Create a tracker on the system monotonic clock.
    #[must_use]
    pub fn new(threshold: Duration) -> Self {
        Self::with_clock(threshold, Arc::new(SystemClock::new()))
    }

    /// Create a tracker on an explicit clock.
    #[must_use]
    pub fn with_clock(threshold: Duration, clock: Arc<dyn Clock>) -> Self {
        let now = clock_ns(clock.as_ref());
        Self {
            last_activity_ns: CachePadded::new(AtomicI64::new(
                now.saturating_sub(duration_ns(threshold)),
            )),
            last_idle_ns: AtomicU64::new(0),
            updates: AtomicU64::new(0),
            threshold,
            clock,
        }
    }

    /// Record that data was observed now.
    #[inline]
    pub fn update(&self) {
        self.last_activity_ns
            .store(clock_ns(self.clock.as_ref()), Ordering::Release);
        self.updates.fetch_add(1, Ordering::Relaxed);
    }

    /// Time since data was last observed. Also recorded for diagnostics.
    ///
    /// Never less than the threshold before the first update, even when the
    /// threshold is too large for the nanosecond clock.
    pub fn idle_for(&self) -> Duration {
        let last = self.last_activity_ns.load(Ordering::Acquire);
        let now = clock_ns(self.clock.as_ref());
        let idle_ns = u64::try_from(now.saturating_sub(last)).unwrap_or(0);
        let mut idle = Duration::from_nanos(idle_ns);
        if self.update_count() == 0 {
            idle = idle.max(self.threshold);
        }
        self.last_idle_ns.store(
            u64::try_from(idle.as_nanos()).unwrap_or(u64::MAX),
            Ordering::Relaxed,
        );
        idle
    }

    /// True iff data was observed less than `threshold` ago.
    #[must_use]
    pub fn is_healthy(&self, threshold: Duration) -> bool {
        self.idle_for() < threshold
    }

    /// Evaluate staleness against the tracker's own threshold.
    #[must_use]
    pub fn check(&self) -> IdleReport {
        IdleReport {
            idle: self.idle_for(),
            threshold: self.threshold,
        }
    }

    /// The threshold this tracker was created with.
    #[must_use]
    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    /// Idle time recorded by the most recent evaluation.
    #[must_use]
    pub fn last_idle(&self) -> Duration {
        Duration::from_nanos(self.last_idle_ns.load(Ordering::Relaxed))
    }

    /// Number of updates since construction.
    #[must_use]
    pub fn update_count(&self) -> u64 {
        self.updates.load(Ordering::Relaxed)
    }

    /// Clock reading of the last update, or `None` before the first one.
    #[must_use]
    pub fn last_update_at(&self) -> Option<Duration> {
        if self.update_count() == 0 {
            return None;
        }
        let last = self.last_activity_ns.load(Ordering::Acquire);
        u64::try_from(last).ok().map(Duration::from_nanos)
    }

    /// Human-readable description of the last update, for debug logs.
    #[must_use]
    pub fn describe(&self) -> String {
        match self.last_update_at() {
            Some(at) => format!(
                "last update at {} seconds of the monotonic clock",
                at.as_secs()
            ),
            None => String::from("no update yet"),
        }
    }
}

impl fmt::Debug for IdleTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdleTracker")
            .field("threshold", &self.threshold)
            .field("updates", &self.update_count())
            .field("last_update_at", &self.last_update_at())
            .finish_non_exhaustive()
    }
}

fn duration_ns(d: Duration) -> i64 {
    i64::try_from(d.as_nanos()).unwrap_or(i64::MAX)
}

fn clock_ns(clock: &dyn Clock) -> i64 {
    duration_ns(clock.elapsed())
}
