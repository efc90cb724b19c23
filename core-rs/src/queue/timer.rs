//! Debounce timer abstraction
//!
//! The queue asks a [`Timer`] for a sleep future each time it (re)schedules
//! its debounce. `TokioTimer` is the runtime clock; `ManualTimer` completes
//! sleeps only when told to, for deterministic tests.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;

pub type Sleep = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

pub trait Timer: Send + Sync + 'static {
    /// Future that completes once `duration` has elapsed.
    ///
    /// Called synchronously when the debounce is scheduled, so any
    /// registration must happen here rather than on first poll.
    fn sleep(&self, duration: Duration) -> Sleep;
}

/// Timer backed by `tokio::time`, honouring paused test clocks
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioTimer;

impl Timer for TokioTimer {
    fn sleep(&self, duration: Duration) -> Sleep {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Timer whose sleeps complete only on [`ManualTimer::fire`]
pub struct ManualTimer {
    ticks: watch::Sender<u64>,
    requested: Mutex<Vec<Duration>>,
}

impl Default for ManualTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualTimer {
    pub fn new() -> Self {
        let (ticks, _) = watch::channel(0);
        Self {
            ticks,
            requested: Mutex::new(Vec::new()),
        }
    }

    /// Complete every sleep handed out so far
    pub fn fire(&self) {
        self.ticks.send_modify(|tick| *tick += 1);
    }

    /// Durations of every sleep requested so far, in order
    pub fn requested(&self) -> Vec<Duration> {
        self.requested
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Timer for ManualTimer {
    fn sleep(&self, duration: Duration) -> Sleep {
        self.requested
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(duration);

        let mut ticks = self.ticks.subscribe();
        Box::pin(async move {
            let _ = ticks.changed().await;
        })
    }
}
