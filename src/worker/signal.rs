use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// Boolean that can be waited on
#[derive(Debug, Default)]
struct Flag {
    set: Mutex<bool>,
    changed: Condvar,
}

impl Flag {
    fn raise(&self) {
        let mut set = self.set.lock().unwrap();
        *set = true;
        self.changed.notify_all();
    }

    fn is_raised(&self) -> bool {
        *self.set.lock().unwrap()
    }

    /// Block until raised or until `deadline`. Returns whether it was raised.
    fn wait_until(&self, deadline: Option<Instant>) -> bool {
        let mut set = self.set.lock().unwrap();
        while !*set {
            match deadline {
                None => set = self.changed.wait(set).unwrap(),
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return false;
                    }
                    set = self.changed.wait_timeout(set, remaining).unwrap().0;
                }
            }
        }
        true
    }
}

/// Token for cooperative cancellation of a Worker.
///
/// Clone is cheap and shares state. Sleeping through [`StopToken::wait_timeout`]
/// returns as soon as the token is cancelled.
#[derive(Debug, Clone, Default)]
pub struct StopToken {
    flag: Arc<Flag>,
}

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation and wake every sleeper
    pub fn cancel(&self) {
        self.flag.raise();
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.is_raised()
    }

    /// Sleep for `duration` unless cancelled first. Returns true if cancelled.
    pub fn wait_timeout(&self, duration: Duration) -> bool {
        self.flag.wait_until(Some(Instant::now() + duration))
    }
}

/// One-shot completion signal: set once, observed by any number of waiters
#[derive(Debug, Clone, Default)]
pub struct Latch {
    flag: Arc<Flag>,
}

impl Latch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.flag.raise();
    }

    pub fn is_set(&self) -> bool {
        self.flag.is_raised()
    }

    /// Wait for the latch, forever when `timeout` is `None`. Returns whether it is set.
    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        self.flag.wait_until(timeout.map(|t| Instant::now() + t))
    }
}

/// Stop token plus the optional overall deadline of a run
#[derive(Debug, Clone)]
pub struct RunLimit {
    stop: StopToken,
    deadline: Option<Instant>,
}

impl RunLimit {
    pub fn new(stop: StopToken, deadline: Option<Instant>) -> Self {
        Self { stop, deadline }
    }

    /// No deadline, never stopped unless `stop` is cancelled
    pub fn unbounded(stop: StopToken) -> Self {
        Self::new(stop, None)
    }

    pub fn expired(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.is_cancelled()
    }

    pub fn reached(&self) -> bool {
        self.stop_requested() || self.expired()
    }

    pub fn token(&self) -> &StopToken {
        &self.stop
    }

    /// Sleep for `duration`, cut short by a stop request or the deadline.
    /// Returns false when the sleep was cut short.
    pub fn sleep(&self, duration: Duration) -> bool {
        let mut duration = duration;
        if let Some(deadline) = self.deadline {
            duration = duration.min(deadline.saturating_duration_since(Instant::now()));
        }
        !self.stop.wait_timeout(duration) && !self.expired()
    }
}
