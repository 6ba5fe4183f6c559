//! Timestamps of the elapsed and the wall clock, and the [`Clock`] reading them.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime};

use serde::{Deserialize, Serialize};

fn duration_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

/// A point on the monotonic elapsed clock, in nanoseconds.
///
/// Elapsed time keeps counting while the device sleeps and never jumps. All bucket boundaries and
/// cooldowns are computed on this clock.
#[derive(Clone, Copy, Default, Eq, Hash, Ord, PartialEq, PartialOrd, Deserialize, Serialize)]
pub struct ElapsedTimestamp(u64);

impl ElapsedTimestamp {
    /// The start of the elapsed clock.
    pub const ZERO: Self = Self(0);

    /// Creates a timestamp from the given number of nanoseconds.
    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    /// Creates a timestamp from the given number of milliseconds.
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis.saturating_mul(1_000_000))
    }

    /// Creates a timestamp from the given number of seconds.
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs.saturating_mul(1_000_000_000))
    }

    /// Returns the number of nanoseconds since the start of the clock.
    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    /// Returns the time passed since an `earlier` timestamp, or zero if it is in the future.
    pub fn duration_since(self, earlier: Self) -> Duration {
        Duration::from_nanos(self.0.saturating_sub(earlier.0))
    }

    /// Subtracts a duration, clamping at [`ElapsedTimestamp::ZERO`].
    pub fn saturating_sub(self, duration: Duration) -> Self {
        Self(self.0.saturating_sub(duration_nanos(duration)))
    }

    /// Returns the timestamp one nanosecond before this one.
    ///
    /// Used to attribute a pull to the bucket that ends at `self`.
    pub fn prev(self) -> Self {
        Self(self.0.saturating_sub(1))
    }
}

impl fmt::Debug for ElapsedTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ElapsedTimestamp({})", self.0)
    }
}

impl fmt::Display for ElapsedTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::ops::Add<Duration> for ElapsedTimestamp {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self::Output {
        Self(self.0.saturating_add(duration_nanos(rhs)))
    }
}

impl std::ops::Sub<Duration> for ElapsedTimestamp {
    type Output = Self;

    fn sub(self, rhs: Duration) -> Self::Output {
        self.saturating_sub(rhs)
    }
}

impl std::ops::Sub for ElapsedTimestamp {
    type Output = Duration;

    fn sub(self, rhs: Self) -> Self::Output {
        self.duration_since(rhs)
    }
}

/// A point on the wall clock, in nanoseconds since the UNIX epoch.
///
/// Pulled samples carry the wall clock time captured before the fetch began, so that reports can
/// correlate the elapsed clock with calendar time.
#[derive(Clone, Copy, Default, Eq, Hash, Ord, PartialEq, PartialOrd, Deserialize, Serialize)]
pub struct WallClockTimestamp(u64);

impl WallClockTimestamp {
    /// Creates a wall clock timestamp from the given number of nanoseconds since the epoch.
    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    /// Creates a wall clock timestamp from the given system time.
    pub fn from_system(time: SystemTime) -> Self {
        let duration = time
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default();

        Self(duration_nanos(duration))
    }

    /// Returns the current wall clock time.
    pub fn now() -> Self {
        Self::from_system(SystemTime::now())
    }

    /// Returns the number of nanoseconds since the UNIX epoch.
    pub const fn as_nanos(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for WallClockTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WallClockTimestamp({})", self.0)
    }
}

/// Source of the current time on both clocks.
pub trait Clock: Send + Sync {
    /// Returns the current time on the elapsed clock.
    fn elapsed_now(&self) -> ElapsedTimestamp;

    /// Returns the current time on the wall clock.
    fn wall_now(&self) -> WallClockTimestamp;
}

/// The clock of the running process.
///
/// The elapsed clock starts at zero when the clock is created.
#[derive(Debug)]
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    /// Creates a new system clock starting at the current instant.
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
    fn elapsed_now(&self) -> ElapsedTimestamp {
        ElapsedTimestamp(duration_nanos(self.start.elapsed()))
    }

    fn wall_now(&self) -> WallClockTimestamp {
        WallClockTimestamp::now()
    }
}

/// A clock that only moves when advanced.
///
/// The wall clock is kept at a fixed offset from the elapsed clock.
#[derive(Debug, Default)]
pub struct ManualClock {
    elapsed: AtomicU64,
    wall_offset: u64,
}

impl ManualClock {
    /// Creates a manual clock at the given elapsed time with the wall clock at `wall_offset` when
    /// the elapsed clock reads zero.
    pub fn new(elapsed: ElapsedTimestamp, wall_offset: WallClockTimestamp) -> Self {
        Self {
            elapsed: AtomicU64::new(elapsed.as_nanos()),
            wall_offset: wall_offset.as_nanos(),
        }
    }

    /// Moves the elapsed clock to `timestamp`.
    pub fn set(&self, timestamp: ElapsedTimestamp) {
        self.elapsed.store(timestamp.as_nanos(), Ordering::Relaxed);
    }

    /// Moves the clock forward by `duration`.
    pub fn advance(&self, duration: Duration) {
        self.elapsed
            .fetch_add(duration_nanos(duration), Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn elapsed_now(&self) -> ElapsedTimestamp {
        ElapsedTimestamp(self.elapsed.load(Ordering::Relaxed))
    }

    fn wall_now(&self) -> WallClockTimestamp {
        WallClockTimestamp(
            self.wall_offset
                .saturating_add(self.elapsed.load(Ordering::Relaxed)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elapsed_arithmetic_saturates() {
        let ts = ElapsedTimestamp::from_secs(1);
        assert_eq!(ts - Duration::from_secs(2), ElapsedTimestamp::ZERO);
        assert_eq!(ElapsedTimestamp::ZERO - ts, Duration::ZERO);
        assert_eq!(ts - ElapsedTimestamp::from_millis(250), Duration::from_millis(750));
        assert_eq!(ElapsedTimestamp::ZERO.prev(), ElapsedTimestamp::ZERO);
        assert_eq!(ts.prev().as_nanos(), 999_999_999);
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(
            ElapsedTimestamp::from_secs(10),
            WallClockTimestamp::from_nanos(1_000),
        );
        clock.advance(Duration::from_nanos(5));

        assert_eq!(clock.elapsed_now().as_nanos(), 10_000_000_005);
        assert_eq!(clock.wall_now().as_nanos(), 10_000_001_005);

        clock.set(ElapsedTimestamp::from_nanos(1));
        assert_eq!(clock.elapsed_now(), ElapsedTimestamp::from_nanos(1));
    }

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let first = clock.elapsed_now();
        let second = clock.elapsed_now();
        assert!(second >= first);
        assert!(clock.wall_now().as_nanos() > 0);
    }
}
