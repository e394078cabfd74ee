use std::cell::Cell;
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};

/// Source of time for every busy-wait loop in the drivers.
///
/// Production code uses [StdClock]. Tests use [ManualClock], where sleeping only moves a virtual
/// counter forward, so NAK storms and timeouts can be simulated without real delays.
pub trait Clock {
    /// Monotonic time elapsed since some fixed origin.
    fn now(&self) -> Duration;
    /// Block the calling thread for `duration`.
    fn sleep(&self, duration: Duration);

    #[inline]
    fn sleep_ms(&self, millis: u64) {
        self.sleep(Duration::from_millis(millis))
    }
}

#[derive(Clone, Copy, Debug)]
pub struct StdClock {
    origin: Instant,
}

impl StdClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for StdClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for StdClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration)
    }
}

#[derive(Debug, Default)]
struct ManualClockState {
    now: Cell<Duration>,
    sleeps: Cell<u64>,
}

/// A clock that only advances when slept on. Clones share the same virtual time.
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    state: Rc<ManualClockState>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, duration: Duration) {
        self.state.now.set(self.state.now.get() + duration);
    }

    /// Number of times [Clock::sleep] has been called.
    pub fn sleeps(&self) -> u64 {
        self.state.sleeps.get()
    }

    pub fn elapsed(&self) -> Duration {
        self.state.now.get()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.state.now.get()
    }
    fn sleep(&self, duration: Duration) {
        self.state.sleeps.set(self.state.sleeps.get() + 1);
        self.advance(duration);
    }
}

pub struct Timeout {
    start: Duration,
    duration: Duration,
}

impl Timeout {
    #[inline]
    pub fn new<C: Clock + ?Sized>(clock: &C, duration: Duration) -> Self {
        Self {
            start: clock.now(),
            duration,
        }
    }

    #[inline]
    pub fn from_millis<C: Clock + ?Sized>(clock: &C, millis: u64) -> Self {
        Self::new(clock, Duration::from_millis(millis))
    }

    /// `Ok` while the deadline has not passed yet.
    #[inline]
    pub fn run<C: Clock + ?Sized>(&self, clock: &C) -> Result<(), ()> {
        if clock.now().saturating_sub(self.start) < self.duration {
            Ok(())
        } else {
            Err(())
        }
    }
}
