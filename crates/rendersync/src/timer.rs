//! # Thread Timer
//!
//! [`TimerControl`] backed by a background thread. While running it posts a
//! [`HostEvent::Tick`] into the host loop's channel once per interval; the
//! host loop turns each tick into a processing pass on its own thread.
//!
//! ```text
//!   coalescer ── start/stop ──▶ ThreadTimer (condvar)
//!                                    │ every interval while running
//!                                    ▼
//!                        Sender<HostEvent::Tick> ──▶ HostLoop
//! ```
//!
//! At most one tick is queued at a time. The loop releases the
//! [`TickGate`] when it takes a tick, so a loop stuck in a long render comes
//! back to one pass, not a backlog.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::Sender;
use parking_lot::{Condvar, Mutex, MutexGuard};
use rendersync_core::TimerControl;

use crate::error::{HostError, HostResult};
use crate::host_loop::HostEvent;

#[derive(Debug, Default)]
struct TimerState {
    running: bool,
    shutdown: bool,
    ticks: u64,
    skipped: u64,
}

#[derive(Debug, Default)]
struct TimerShared {
    state: Mutex<TimerState>,
    wake: Condvar,
    /// A tick is in the channel and not yet taken by the loop.
    queued: AtomicBool,
}

/// Lets the host loop tell a [`ThreadTimer`] that its tick was taken.
#[derive(Clone, Debug)]
pub struct TickGate {
    shared: Arc<TimerShared>,
}

impl TickGate {
    /// Allows the timer to post its next tick.
    pub fn release(&self) {
        self.shared.queued.store(false, Ordering::Release);
    }

    /// Returns true while a posted tick has not been taken.
    #[must_use]
    pub fn is_queued(&self) -> bool {
        self.shared.queued.load(Ordering::Acquire)
    }
}

/// Background ticker feeding a host loop.
#[derive(Debug)]
pub struct ThreadTimer {
    shared: Arc<TimerShared>,
    interval: Duration,
    handle: Option<JoinHandle<()>>,
}

impl ThreadTimer {
    /// Spawns the timer thread. The timer starts stopped.
    ///
    /// # Errors
    ///
    /// [`HostError::TimerSpawn`] if the OS refuses the thread.
    pub fn spawn(interval: Duration, sender: Sender<HostEvent>) -> HostResult<Self> {
        let shared = Arc::new(TimerShared::default());
        let thread_shared = Arc::clone(&shared);
        let handle = std::thread::Builder::new()
            .name("rendersync-timer".into())
            .spawn(move || tick_thread(&thread_shared, interval, &sender))
            .map_err(|e| HostError::TimerSpawn(e.to_string()))?;

        tracing::debug!("timer thread spawned ({:?} interval)", interval);
        Ok(Self {
            shared,
            interval,
            handle: Some(handle),
        })
    }

    /// Tick interval.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Returns true while ticks are being posted.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shared.state.lock().running
    }

    /// Ticks posted since the thread was spawned.
    #[must_use]
    pub fn ticks(&self) -> u64 {
        self.shared.state.lock().ticks
    }

    /// Intervals that passed while a tick was still queued.
    #[must_use]
    pub fn skipped_ticks(&self) -> u64 {
        self.shared.state.lock().skipped
    }

    /// Gate the host loop releases on every tick it takes.
    #[must_use]
    pub fn tick_gate(&self) -> TickGate {
        TickGate {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl TimerControl for ThreadTimer {
    fn start(&self) {
        let mut state = self.shared.state.lock();
        if !state.running {
            state.running = true;
            self.shared.wake.notify_one();
        }
    }

    fn stop(&self) {
        let mut state = self.shared.state.lock();
        if state.running {
            state.running = false;
            self.shared.wake.notify_one();
        }
    }
}

impl Drop for ThreadTimer {
    fn drop(&mut self) {
        {
            let mut state = self.shared.state.lock();
            state.shutdown = true;
            self.shared.wake.notify_one();
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!("timer thread panicked");
            }
        }
    }
}

fn tick_thread(shared: &TimerShared, interval: Duration, sender: &Sender<HostEvent>) {
    let mut state = shared.state.lock();
    loop {
        if state.shutdown {
            break;
        }
        if !state.running {
            shared.wake.wait(&mut state);
            continue;
        }
        // Woken early by start/stop/shutdown: re-check before ticking.
        if !shared.wake.wait_for(&mut state, interval).timed_out() {
            continue;
        }
        if state.shutdown || !state.running {
            continue;
        }
        if shared.queued.swap(true, Ordering::AcqRel) {
            state.skipped += 1;
            continue;
        }
        state.ticks += 1;
        // The host loop may call start/stop while we block on a full channel.
        let delivered = MutexGuard::unlocked(&mut state, || sender.send(HostEvent::Tick).is_ok());
        if !delivered {
            tracing::debug!("host loop gone, timer thread exiting");
            break;
        }
    }
}
