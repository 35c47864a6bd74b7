//! # Host Loop
//!
//! The single control thread of a running program. Everything that touches
//! the coalescer arrives here as a [`HostEvent`]: timer ticks from the
//! [`ThreadTimer`](crate::ThreadTimer), requests from any thread holding a
//! [`HostHandle`].
//!
//! ## Event Flow
//! ```text
//! caller threads ── HostHandle ──┐
//!                                ├──▶ Receiver<HostEvent> ──▶ HostLoop::dispatch
//! ThreadTimer ───── Tick ────────┘                                  │
//!                                                                   ▼
//!                                                         SharedCoalescer
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use rendersync_core::{
    CoalescerConfig, RenderAction, RenderOutcome, RequestType, SharedCoalescer, TargetId,
    UpdateCoalescer,
};

use crate::error::{HostError, HostResult};
use crate::timer::{ThreadTimer, TickGate};

/// Events consumed by the host loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HostEvent {
    /// Timer tick: run one processing pass.
    Tick,
    /// Request a render of one target.
    Request(TargetId),
    /// Request every registered target of a class.
    RequestAll(RequestType),
    /// Render one target right now.
    Force(TargetId),
    /// Render every registered target of a class right now.
    ForceAll(RequestType),
    /// Abort the render of one target.
    Abort(TargetId),
    /// Halt the coalescer and leave the loop.
    Shutdown,
}

/// Counters kept by the host loop.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoopStats {
    /// Events dispatched, ticks included.
    pub events: u64,
    /// Ticks received.
    pub ticks: u64,
    /// Ticks whose pass had nothing to do.
    pub idle_ticks: u64,
    /// Request events (single and filtered).
    pub requests: u64,
    /// Force events (single and filtered).
    pub forced: u64,
    /// Abort events.
    pub aborts: u64,
    /// Renders completed by passes and forced updates.
    pub renders_completed: u64,
}

/// Clonable sender side of a host loop.
#[derive(Clone, Debug)]
pub struct HostHandle {
    sender: Sender<HostEvent>,
}

impl HostHandle {
    /// Sends an event to the loop.
    ///
    /// # Errors
    ///
    /// [`HostError::Disconnected`] once the loop is gone.
    pub fn send(&self, event: HostEvent) -> HostResult<()> {
        self.sender.send(event).map_err(|_| HostError::Disconnected)
    }

    /// Requests a render of `target`.
    ///
    /// # Errors
    ///
    /// See [`HostHandle::send`].
    pub fn request_update(&self, target: TargetId) -> HostResult<()> {
        self.send(HostEvent::Request(target))
    }

    /// Requests every registered target matching `filter`.
    ///
    /// # Errors
    ///
    /// See [`HostHandle::send`].
    pub fn request_update_all(&self, filter: RequestType) -> HostResult<()> {
        self.send(HostEvent::RequestAll(filter))
    }

    /// Forces a render of `target` on the loop thread.
    ///
    /// # Errors
    ///
    /// See [`HostHandle::send`].
    pub fn force_update(&self, target: TargetId) -> HostResult<()> {
        self.send(HostEvent::Force(target))
    }

    /// Forces a render of every registered target matching `filter`.
    ///
    /// # Errors
    ///
    /// See [`HostHandle::send`].
    pub fn force_update_all(&self, filter: RequestType) -> HostResult<()> {
        self.send(HostEvent::ForceAll(filter))
    }

    /// Aborts the render of `target`.
    ///
    /// # Errors
    ///
    /// See [`HostHandle::send`].
    pub fn abort_update(&self, target: TargetId) -> HostResult<()> {
        self.send(HostEvent::Abort(target))
    }

    /// Asks the loop to halt the coalescer and return.
    ///
    /// # Errors
    ///
    /// See [`HostHandle::send`].
    pub fn shutdown(&self) -> HostResult<()> {
        self.send(HostEvent::Shutdown)
    }
}

/// The control thread's event loop.
pub struct HostLoop {
    coalescer: SharedCoalescer,
    sender: Sender<HostEvent>,
    receiver: Receiver<HostEvent>,
    tick_gate: Option<TickGate>,
    stats: LoopStats,
    stopped: bool,
}

impl std::fmt::Debug for HostLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostLoop")
            .field("queued", &self.receiver.len())
            .field("stats", &self.stats)
            .field("stopped", &self.stopped)
            .finish_non_exhaustive()
    }
}

impl HostLoop {
    /// Creates the loop's channel.
    #[must_use]
    pub fn channel() -> (Sender<HostEvent>, Receiver<HostEvent>) {
        crossbeam_channel::unbounded()
    }

    /// Builds a coalescer around `action`, driven by a [`ThreadTimer`] ticking
    /// at `config.tick_interval_ms`.
    ///
    /// # Errors
    ///
    /// Configuration errors, or [`HostError::TimerSpawn`].
    pub fn new<A: RenderAction + 'static>(action: A, config: CoalescerConfig) -> HostResult<Self> {
        let (sender, receiver) = Self::channel();
        let timer = ThreadTimer::spawn(
            Duration::from_millis(config.tick_interval_ms),
            sender.clone(),
        )?;
        let gate = timer.tick_gate();
        let coalescer = UpdateCoalescer::builder(action)
            .config(config)
            .timer(Arc::new(timer))
            .build()?;
        Ok(
            Self::from_parts(Arc::new(Mutex::new(coalescer)), sender, receiver)
                .with_tick_gate(gate),
        )
    }

    /// Wraps an existing coalescer, e.g. the global instance, whose timer
    /// already posts into `sender`.
    ///
    /// If that timer is a [`ThreadTimer`], pass its gate to
    /// [`HostLoop::with_tick_gate`] or it stops ticking after the first tick.
    #[must_use]
    pub fn from_parts(
        coalescer: SharedCoalescer,
        sender: Sender<HostEvent>,
        receiver: Receiver<HostEvent>,
    ) -> Self {
        Self {
            coalescer,
            sender,
            receiver,
            tick_gate: None,
            stats: LoopStats::default(),
            stopped: false,
        }
    }

    /// Releases `gate` on every tick this loop takes.
    #[must_use]
    pub fn with_tick_gate(mut self, gate: TickGate) -> Self {
        self.tick_gate = Some(gate);
        self
    }

    /// A handle for sending events from other threads.
    #[must_use]
    pub fn handle(&self) -> HostHandle {
        HostHandle {
            sender: self.sender.clone(),
        }
    }

    /// The coalescer this loop drives.
    #[must_use]
    pub fn coalescer(&self) -> &SharedCoalescer {
        &self.coalescer
    }

    /// Counters since creation.
    #[must_use]
    pub const fn stats(&self) -> LoopStats {
        self.stats
    }

    /// Returns true once a [`HostEvent::Shutdown`] was handled.
    #[must_use]
    pub const fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Blocks dispatching events until shutdown.
    pub fn run(&mut self) -> LoopStats {
        while !self.stopped {
            match self.receiver.recv() {
                Ok(event) => self.dispatch(event),
                // Every sender dropped.
                Err(_) => break,
            }
        }
        self.stats
    }

    /// Dispatches events until shutdown or until `duration` has passed.
    pub fn run_for(&mut self, duration: Duration) -> LoopStats {
        let deadline = Instant::now() + duration;
        while !self.stopped {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.receiver.recv_timeout(remaining) {
                Ok(event) => self.dispatch(event),
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => break,
            }
        }
        self.stats
    }

    /// Dispatches everything already queued without blocking.
    ///
    /// Returns the number of events handled.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        while !self.stopped {
            let Ok(event) = self.receiver.try_recv() else {
                break;
            };
            self.dispatch(event);
            handled += 1;
        }
        handled
    }

    /// Handles one event.
    pub fn dispatch(&mut self, event: HostEvent) {
        if self.stopped {
            return;
        }
        self.stats.events += 1;
        let mut coalescer = self.coalescer.lock();
        match event {
            HostEvent::Tick => {
                // Released before the pass so a tick due during it is queued.
                if let Some(gate) = &self.tick_gate {
                    gate.release();
                }
                self.stats.ticks += 1;
                let report = coalescer.process_pending_updates();
                if report.is_idle() {
                    self.stats.idle_ticks += 1;
                }
                self.stats.renders_completed += report.completed.len() as u64;
            }
            HostEvent::Request(target) => {
                self.stats.requests += 1;
                coalescer.request_update(target);
            }
            HostEvent::RequestAll(filter) => {
                self.stats.requests += 1;
                coalescer.request_update_all(filter);
            }
            HostEvent::Force(target) => {
                self.stats.forced += 1;
                if coalescer.force_immediate_update(target) == RenderOutcome::Completed {
                    self.stats.renders_completed += 1;
                }
            }
            HostEvent::ForceAll(filter) => {
                self.stats.forced += 1;
                self.stats.renders_completed += coalescer.force_immediate_update_all(filter) as u64;
            }
            HostEvent::Abort(target) => {
                self.stats.aborts += 1;
                coalescer.abort_update(target);
            }
            HostEvent::Shutdown => {
                coalescer.halt();
                self.stopped = true;
                tracing::info!(
                    "host loop stopped after {} events ({} ticks)",
                    self.stats.events,
                    self.stats.ticks
                );
            }
        }
    }
}
