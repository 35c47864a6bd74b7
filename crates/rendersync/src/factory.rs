//! Factory for coalescers driven by a [`ThreadTimer`].

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Sender;
use rendersync_core::{
    CoalescerConfig, CoalescerFactory, CoalescerResult, RenderAction, UpdateCoalescer,
};

use crate::error::HostResult;
use crate::host_loop::HostEvent;
use crate::timer::ThreadTimer;

/// Builds coalescers whose timer posts ticks into a host loop's channel.
///
/// The timer thread is spawned once, up front, so `create_instance` cannot
/// fail on thread creation.
pub struct ThreadTimerFactory<F> {
    config: CoalescerConfig,
    timer: Arc<ThreadTimer>,
    make_action: F,
}

impl<F> std::fmt::Debug for ThreadTimerFactory<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadTimerFactory")
            .field("config", &self.config)
            .field("timer", &self.timer)
            .finish_non_exhaustive()
    }
}

impl<F, A> ThreadTimerFactory<F>
where
    F: Fn() -> A + Send,
    A: RenderAction + 'static,
{
    /// Spawns the timer thread feeding `sender`.
    ///
    /// # Errors
    ///
    /// [`HostError::TimerSpawn`](crate::HostError::TimerSpawn) if the thread
    /// cannot be spawned.
    pub fn new(
        config: CoalescerConfig,
        sender: Sender<HostEvent>,
        make_action: F,
    ) -> HostResult<Self> {
        let timer = ThreadTimer::spawn(Duration::from_millis(config.tick_interval_ms), sender)?;
        Ok(Self {
            config,
            timer: Arc::new(timer),
            make_action,
        })
    }

    /// The shared timer.
    #[must_use]
    pub fn timer(&self) -> &Arc<ThreadTimer> {
        &self.timer
    }
}

impl<F, A> CoalescerFactory for ThreadTimerFactory<F>
where
    F: Fn() -> A + Send,
    A: RenderAction + 'static,
{
    fn create_instance(&self) -> CoalescerResult<UpdateCoalescer> {
        let coalescer = UpdateCoalescer::builder((self.make_action)())
            .config(self.config.clone())
            .timer(Arc::clone(&self.timer))
            .build()?;
        Ok(coalescer)
    }

    fn name(&self) -> &str {
        "thread-timer"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host_loop::HostLoop;
    use rendersync_core::{RenderOutcome, RenderRequest, TargetId};

    #[test]
    fn test_instances_share_the_timer() {
        let (sender, receiver) = HostLoop::channel();
        let factory = ThreadTimerFactory::new(CoalescerConfig::default(), sender, || {
            |_: &RenderRequest| RenderOutcome::Completed
        })
        .unwrap();
        assert_eq!(factory.name(), "thread-timer");

        let mut coalescer = factory.create_instance().unwrap();
        coalescer.request_update(TargetId(1));
        assert!(factory.timer().is_running());

        let tick = receiver
            .recv_timeout(std::time::Duration::from_secs(2))
            .unwrap();
        assert_eq!(tick, HostEvent::Tick);
        coalescer.process_pending_updates();
        assert!(!factory.timer().is_running());
    }
}
