use std::ops::{Add, AddAssign, Sub};

use serde::{Deserialize, Serialize};

use crate::Duration;

/// Point on the monotonic clock, nanoseconds since the clock's epoch.
///
/// All scheduler deadlines and protocol timeouts are computed from `Instant`
/// values handed to `update`, never read from a wall clock.
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[repr(C)]
pub struct Instant(pub u64);

impl Instant {
    pub const MAX: Self = Self(u64::MAX);
    pub const ZERO: Self = Self(0);

    #[inline]
    pub const fn from_nanos(n: u64) -> Self {
        Self(n)
    }

    #[inline]
    pub const fn as_nanos(&self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn saturating_sub(&self, other: Self) -> Duration {
        Duration(self.0.saturating_sub(other.0))
    }

    #[inline]
    pub fn elapsed_since(&self, since: Self) -> Duration {
        self.saturating_sub(since)
    }
}

impl Sub for Instant {
    type Output = Duration;

    fn sub(self, rhs: Self) -> Duration {
        Duration(self.0.saturating_sub(rhs.0))
    }
}

impl Sub<Duration> for Instant {
    type Output = Self;

    fn sub(self, rhs: Duration) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }
}

impl Add<Duration> for Instant {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign<Duration> for Instant {
    fn add_assign(&mut self, rhs: Duration) {
        self.0 = self.0.saturating_add(rhs.0);
    }
}
