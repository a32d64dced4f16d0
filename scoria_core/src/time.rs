// Copyright 2026 the Scoria Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Monotonic host time.
//!
//! [`TimePoint`] is a point on `CLOCK_MONOTONIC` in nanoseconds. The value
//! zero is reserved as [`TimePoint::IMMEDIATE`]: it sorts before every real
//! clock reading and is used as the target time of tasks that should
//! dispatch as soon as the consumer looks at the queue.
//!
//! All arithmetic saturates; the display session never lives long enough
//! for the monotonic clock to wrap, but a saturating model keeps deadline
//! math total.

use core::fmt;

use rustix::time::{ClockId, Timespec, clock_gettime};

const NANOS_PER_SECOND: u128 = 1_000_000_000;

/// A point in time in monotonic-clock nanoseconds.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TimePoint(pub u64);

impl TimePoint {
    /// The "dispatch now" sentinel; sorts before every clock reading.
    pub const IMMEDIATE: Self = Self(0);

    /// Returns the raw nanosecond value.
    #[inline]
    #[must_use]
    pub const fn nanos(self) -> u64 {
        self.0
    }

    /// Returns `true` when this target time has arrived at `now`.
    ///
    /// [`IMMEDIATE`](Self::IMMEDIATE) is due at any `now`.
    #[inline]
    #[must_use]
    pub const fn is_due(self, now: Self) -> bool {
        self.0 <= now.0
    }

    /// Nanoseconds from `now` until this target time, zero if already due.
    #[inline]
    #[must_use]
    pub const fn nanos_until(self, now: Self) -> u64 {
        self.0.saturating_sub(now.0)
    }

    /// This time moved forward by `nanos`, saturating.
    #[inline]
    #[must_use]
    pub const fn saturating_add_nanos(self, nanos: u64) -> Self {
        Self(self.0.saturating_add(nanos))
    }
}

impl fmt::Debug for TimePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TimePoint({})", self.0)
    }
}

/// Returns the current monotonic time.
#[must_use]
pub fn now() -> TimePoint {
    timespec_to_time_point(clock_gettime(ClockId::Monotonic))
}

fn timespec_to_time_point(timespec: Timespec) -> TimePoint {
    let seconds = u64::try_from(timespec.tv_sec).unwrap_or(0);
    let nanos = u64::try_from(timespec.tv_nsec)
        .unwrap_or(0)
        .min(999_999_999);

    let wide = u128::from(seconds)
        .saturating_mul(NANOS_PER_SECOND)
        .saturating_add(u128::from(nanos));
    TimePoint(u64::try_from(wide).unwrap_or(u64::MAX))
}
