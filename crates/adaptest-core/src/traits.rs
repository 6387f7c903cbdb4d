//! Seams the engine is parameterized over.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

use crate::simulation::SimulationRecord;

/// Source of timestamps for elapsed-time limits and idle expiry.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock() = to;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Progress callback for batch simulations.
pub trait ProgressReporter: Send + Sync {
    /// Called when a simulated session starts.
    fn on_session_start(&self, index: usize, true_theta: f64);
    /// Called when a simulated session finishes.
    fn on_session_complete(&self, index: usize, record: &SimulationRecord);
    /// Called when the whole batch is done.
    fn on_batch_complete(&self, completed: usize);
}

/// A no-op progress reporter.
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn on_session_start(&self, _index: usize, _true_theta: f64) {}
    fn on_session_complete(&self, _index: usize, _record: &SimulationRecord) {}
    fn on_batch_complete(&self, _completed: usize) {}
}
