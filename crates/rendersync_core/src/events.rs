//! # Render Lifecycle Events
//!
//! Observers learn about requests, renders and timer changes without the
//! scheduler knowing who they are. Two delivery paths:
//!
//! - callbacks, run synchronously on the control thread
//! - bounded channels, drained by whoever cares (progress bars, logs)
//!
//! A full channel drops the event. A disconnected channel is pruned.

use crossbeam_channel::{Receiver, Sender, TrySendError};

use crate::target::TargetId;

/// Something that happened inside the coalescer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderEvent {
    /// A request moved a target from inactive to requested.
    Requested {
        /// Target that was requested.
        target: TargetId,
    },
    /// A render action was started.
    Started {
        /// Target being rendered.
        target: TargetId,
        /// True for forced (synchronous) updates.
        forced: bool,
    },
    /// A render action reported more work to do.
    Progress {
        /// Target being rendered.
        target: TargetId,
    },
    /// A render finished.
    Completed {
        /// Target that is now up to date.
        target: TargetId,
    },
    /// A render was aborted, by the action or by `abort_update`.
    Aborted {
        /// Target whose render was dropped.
        target: TargetId,
    },
    /// The periodic driver was started.
    TimerStarted,
    /// The periodic driver was stopped.
    TimerStopped,
}

/// Handle returned by [`RenderObservers::subscribe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

type Callback = Box<dyn FnMut(&RenderEvent) + Send>;

/// Registered callbacks and channels.
#[derive(Default)]
pub struct RenderObservers {
    callbacks: Vec<(ObserverId, Callback)>,
    channels: Vec<Sender<RenderEvent>>,
    next_id: u64,
    dropped: u64,
}

impl std::fmt::Debug for RenderObservers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderObservers")
            .field("callbacks", &self.callbacks.len())
            .field("channels", &self.channels.len())
            .field("dropped", &self.dropped)
            .finish()
    }
}

impl RenderObservers {
    /// Creates an empty observer list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a callback.
    pub fn subscribe<F>(&mut self, callback: F) -> ObserverId
    where
        F: FnMut(&RenderEvent) + Send + 'static,
    {
        let id = ObserverId(self.next_id);
        self.next_id += 1;
        self.callbacks.push((id, Box::new(callback)));
        id
    }

    /// Removes a callback. Returns false if the id is unknown.
    pub fn unsubscribe(&mut self, id: ObserverId) -> bool {
        let before = self.callbacks.len();
        self.callbacks.retain(|(cid, _)| *cid != id);
        self.callbacks.len() != before
    }

    /// Opens a bounded channel that receives every future event.
    pub fn channel(&mut self, capacity: usize) -> Receiver<RenderEvent> {
        let (sender, receiver) = crossbeam_channel::bounded(capacity);
        self.channels.push(sender);
        receiver
    }

    /// Delivers an event to every observer.
    pub fn emit(&mut self, event: RenderEvent) {
        for (_, callback) in &mut self.callbacks {
            callback(&event);
        }
        let mut dropped = 0;
        self.channels.retain(|sender| match sender.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                dropped += 1;
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
        if dropped > 0 {
            self.dropped += dropped;
            tracing::trace!("render event {:?} dropped by {} full channel(s)", event, dropped);
        }
    }

    /// Number of registered callbacks and channels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.callbacks.len() + self.channels.len()
    }

    /// Returns true if nobody is listening.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Events lost to full channels so far.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_callbacks_receive_events_until_unsubscribed() {
        let mut observers = RenderObservers::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let id = observers.subscribe(move |_| {
            counter.fetch_add(1, Ordering::Relaxed);
        });

        observers.emit(RenderEvent::TimerStarted);
        assert!(observers.unsubscribe(id));
        observers.emit(RenderEvent::TimerStopped);

        assert_eq!(seen.load(Ordering::Relaxed), 1);
        assert!(!observers.unsubscribe(id));
    }

    #[test]
    fn test_full_channel_drops_and_disconnected_is_pruned() {
        let mut observers = RenderObservers::new();
        let rx = observers.channel(1);
        let gone = observers.channel(4);
        drop(gone);

        observers.emit(RenderEvent::Completed { target: TargetId(1) });
        observers.emit(RenderEvent::Completed { target: TargetId(2) });

        assert_eq!(observers.len(), 1);
        assert_eq!(observers.dropped(), 1);
        assert_eq!(rx.try_recv(), Ok(RenderEvent::Completed { target: TargetId(1) }));
        assert!(rx.try_recv().is_err());
    }
}
