//! # Timer Control
//!
//! The coalescer never renders inside a request. It asks a timer to start,
//! and the timer's owner calls
//! [`UpdateCoalescer::process_pending_updates`](crate::UpdateCoalescer::process_pending_updates)
//! at its own cadence until the coalescer asks it to stop.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Starts and stops the periodic driver of the processing pass.
///
/// Implementations must tolerate redundant `start`/`stop` calls. Methods take
/// `&self` because request handles on other threads may start the timer.
pub trait TimerControl: Send + Sync {
    /// Ensures the driver is running.
    fn start(&self);

    /// Stops the driver.
    fn stop(&self);
}

/// Timer for hosts that pump the coalescer themselves.
///
/// It only records whether a pass is wanted; tests and headless hosts read
/// [`ManualTimer::is_running`] and call the processing pass when it is set.
#[derive(Debug, Default)]
pub struct ManualTimer {
    running: AtomicBool,
    starts: AtomicU64,
    stops: AtomicU64,
}

impl ManualTimer {
    /// Creates a stopped timer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true between a `start` and the next `stop`.
    #[inline]
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Number of `start` calls received.
    #[must_use]
    pub fn start_count(&self) -> u64 {
        self.starts.load(Ordering::Relaxed)
    }

    /// Number of `stop` calls received.
    #[must_use]
    pub fn stop_count(&self) -> u64 {
        self.stops.load(Ordering::Relaxed)
    }
}

impl TimerControl for ManualTimer {
    fn start(&self) {
        self.starts.fetch_add(1, Ordering::Relaxed);
        self.running.store(true, Ordering::Release);
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::Relaxed);
        self.running.store(false, Ordering::Release);
    }
}
