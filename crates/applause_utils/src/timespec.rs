//! 64-bit second/nanosecond timestamps.
//!
//! The command protocol carries timestamps as two unsigned 64-bit fields
//! regardless of the platform's native `timespec` width, so the engine keeps
//! its own type for them and converts at the edges.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub const NSEC_PER_SEC: u64 = 1_000_000_000;

/// A wall-clock or monotonic timestamp split into whole seconds and
/// nanoseconds, `nsec` always below [`NSEC_PER_SEC`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timespec64 {
    pub sec: u64,
    pub nsec: u64,
}

impl Timespec64 {
    pub const ZERO: Self = Self { sec: 0, nsec: 0 };

    pub fn new(sec: u64, nsec: u64) -> Self {
        Self {
            sec: sec + nsec / NSEC_PER_SEC,
            nsec: nsec % NSEC_PER_SEC,
        }
    }

    /// Samples the system's wall clock.
    pub fn now() -> Self {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(Self::from)
            .unwrap_or(Self::ZERO)
    }

    pub fn is_zero(self) -> bool {
        self.sec == 0 && self.nsec == 0
    }

    /// Difference `self - earlier`, saturating at zero when `earlier` is in
    /// the future.
    pub fn diff(self, earlier: Self) -> Self {
        let a = self.sec * NSEC_PER_SEC + self.nsec;
        let b = earlier.sec * NSEC_PER_SEC + earlier.nsec;
        let d = a.saturating_sub(b);
        Self {
            sec: d / NSEC_PER_SEC,
            nsec: d % NSEC_PER_SEC,
        }
    }

    pub fn as_secs_f64(self) -> f64 {
        self.sec as f64 + self.nsec as f64 / NSEC_PER_SEC as f64
    }
}

impl From<Duration> for Timespec64 {
    fn from(d: Duration) -> Self {
        Self {
            sec: d.as_secs(),
            nsec: d.subsec_nanos() as u64,
        }
    }
}

impl From<Timespec64> for Duration {
    fn from(ts: Timespec64) -> Self {
        Duration::new(ts.sec, ts.nsec as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nanosecond_overflow_normalizes() {
        let ts = Timespec64::new(1, NSEC_PER_SEC + 5);
        assert_eq!(ts.sec, 2);
        assert_eq!(ts.nsec, 5);
    }

    #[test]
    fn diff_borrows_from_seconds() {
        let a = Timespec64::new(3, 100);
        let b = Timespec64::new(1, 200);
        let d = a.diff(b);
        assert_eq!(d.sec, 1);
        assert_eq!(d.nsec, NSEC_PER_SEC - 100);
    }

    #[test]
    fn diff_saturates() {
        let a = Timespec64::new(1, 0);
        let b = Timespec64::new(2, 0);
        assert_eq!(a.diff(b), Timespec64::ZERO);
    }
}
