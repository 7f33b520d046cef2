use std::{cell::Cell, sync::Arc};

use quanta::Mock;

use crate::{Duration, Instant};

/// Monotonic clock for embedder loops.
///
/// The core never reads a clock by itself; an embedder samples `now` and
/// passes it into the processor. `Clock::mock` yields a controllable time
/// source for end-to-end tests.
#[derive(Clone, Debug)]
pub struct Clock {
    inner: quanta::Clock,
}

impl Clock {
    pub fn new() -> Self {
        Self { inner: quanta::Clock::new() }
    }

    pub fn mock() -> (Self, Arc<Mock>) {
        let (clock, mock) = quanta::Clock::mock();
        (Self { inner: clock }, mock)
    }

    #[inline]
    pub fn now(&self) -> Instant {
        let raw = self.inner.raw();
        Instant::from_nanos(self.inner.delta_as_nanos(0, raw))
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

/// Single-threaded hand-advanced clock for unit tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<u64>,
}

impl ManualClock {
    pub fn new(start: Instant) -> Self {
        Self { now: Cell::new(start.as_nanos()) }
    }

    #[inline]
    pub fn now(&self) -> Instant {
        Instant::from_nanos(self.now.get())
    }

    pub fn advance(&self, by: Duration) -> Instant {
        self.now.set(self.now.get() + by.as_nanos());
        self.now()
    }

    pub fn set(&self, to: Instant) {
        self.now.set(to.as_nanos());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_clock_advances() {
        let (clock, mock) = Clock::mock();
        let t0 = clock.now();
        mock.increment(1_000);
        let t1 = clock.now();
        assert_eq!(t1 - t0, Duration::from_nanos(1_000));
    }

    #[test]
    fn manual_clock() {
        let clock = ManualClock::new(Instant::ZERO);
        clock.advance(Duration::from_millis(5));
        assert_eq!(clock.now(), Instant::from_nanos(5_000_000));
    }
}
