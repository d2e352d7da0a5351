//! Run lifecycle: the shared run context and the clock abstraction.
//!
//! External pause/resume/terminate requests set flags on a [`RunContext`]
//! owned by the run; the loop observes them between ticks. One context per
//! run, passed by reference, no process-wide state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::astro::ModifiedJulianDate;

/// Top-level state of the observation loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running,
    Paused,
    Stopping,
    Done,
}

/// Lifecycle flags for one run.
#[derive(Debug, Default)]
pub struct RunContext {
    pause: AtomicBool,
    terminate: AtomicBool,
}

impl RunContext {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Ask the loop to idle; takes effect at the next tick.
    pub fn request_pause(&self) {
        self.pause.store(true, Ordering::SeqCst);
    }

    /// Resume from a pause.
    pub fn request_resume(&self) {
        self.pause.store(false, Ordering::SeqCst);
    }

    /// Ask the loop to shut down cleanly; takes effect at the next tick.
    pub fn request_terminate(&self) {
        self.terminate.store(true, Ordering::SeqCst);
    }

    pub fn paused(&self) -> bool {
        self.pause.load(Ordering::SeqCst)
    }

    pub fn terminating(&self) -> bool {
        self.terminate.load(Ordering::SeqCst)
    }
}

/// Source of scheduling time.
///
/// The system clock drives real runs; the simulated clock advances virtual
/// time instantly so a whole night can be replayed in milliseconds.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Current time as MJD.
    fn now(&self) -> ModifiedJulianDate;

    /// Let the given number of seconds pass.
    async fn sleep_secs(&self, secs: f64);
}

/// Wall-clock time.
#[derive(Debug, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> ModifiedJulianDate {
        ModifiedJulianDate::from_datetime(chrono::Utc::now())
    }

    async fn sleep_secs(&self, secs: f64) {
        tokio::time::sleep(std::time::Duration::from_secs_f64(secs.max(0.0))).await;
    }
}

/// Virtual time for simulated runs.
#[derive(Debug)]
pub struct SimClock {
    current: Mutex<f64>,
}

impl SimClock {
    pub fn new(start: ModifiedJulianDate) -> Arc<Self> {
        Arc::new(Self {
            current: Mutex::new(start.value()),
        })
    }

    /// Jump the clock to an absolute time. Ignored if it would move
    /// backwards.
    pub fn set(&self, t: ModifiedJulianDate) {
        let mut current = self.current.lock();
        if t.value() > *current {
            *current = t.value();
        }
    }
}

#[async_trait]
impl Clock for SimClock {
    fn now(&self) -> ModifiedJulianDate {
        ModifiedJulianDate::new(*self.current.lock())
    }

    async fn sleep_secs(&self, secs: f64) {
        {
            let mut current = self.current.lock();
            *current += secs.max(0.0) / 86_400.0;
        }
        // Give concurrent tasks (the readout worker) a chance to run.
        tokio::task::yield_now().await;
    }
}
