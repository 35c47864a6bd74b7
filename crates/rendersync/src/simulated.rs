//! # Simulated Renderer
//!
//! A [`RenderAction`] that pretends to draw. Each render takes
//! `passes_per_lod * (lod + 1)` calls, so higher levels of detail render
//! progressively across several processing passes. Useful for demos and for
//! exercising the coalescer without a graphics backend.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rendersync_core::{RenderAction, RenderOutcome, RenderRequest, TargetId};

/// Completed frames per target, readable after the renderer was moved into
/// a coalescer.
#[derive(Clone, Debug, Default)]
pub struct FrameCounter {
    frames: Arc<Mutex<HashMap<TargetId, u64>>>,
}

impl FrameCounter {
    /// Frames completed for `target`.
    #[must_use]
    pub fn frames(&self, target: TargetId) -> u64 {
        self.frames.lock().get(&target).copied().unwrap_or(0)
    }

    /// Frames completed over all targets.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.frames.lock().values().sum()
    }

    /// Targets with at least one completed frame, sorted.
    #[must_use]
    pub fn targets(&self) -> Vec<TargetId> {
        let mut targets: Vec<_> = self.frames.lock().keys().copied().collect();
        targets.sort_unstable();
        targets
    }

    fn record(&self, target: TargetId) {
        *self.frames.lock().entry(target).or_insert(0) += 1;
    }
}

/// Progressive fake renderer.
#[derive(Debug)]
pub struct SimulatedRenderer {
    passes_per_lod: u32,
    frame_cost: Duration,
    /// Calls left for each render in flight.
    remaining: HashMap<TargetId, u32>,
    counter: FrameCounter,
    aborted: u64,
}

impl SimulatedRenderer {
    /// Creates a renderer taking `passes_per_lod` calls per level of detail.
    /// Zero is treated as one.
    #[must_use]
    pub fn new(passes_per_lod: u32) -> Self {
        Self {
            passes_per_lod: passes_per_lod.max(1),
            frame_cost: Duration::ZERO,
            remaining: HashMap::new(),
            counter: FrameCounter::default(),
            aborted: 0,
        }
    }

    /// Sleeps `cost` on every call to mimic GPU work.
    #[must_use]
    pub fn with_frame_cost(mut self, cost: Duration) -> Self {
        self.frame_cost = cost;
        self
    }

    /// Shared view of the completed frames.
    #[must_use]
    pub fn frame_counter(&self) -> FrameCounter {
        self.counter.clone()
    }

    /// Renders aborted through `finish_abort` or the cancel token.
    #[must_use]
    pub const fn aborted(&self) -> u64 {
        self.aborted
    }

    fn step(&mut self, target: TargetId) -> RenderOutcome {
        if !self.frame_cost.is_zero() {
            std::thread::sleep(self.frame_cost);
        }
        let Some(left) = self.remaining.get_mut(&target) else {
            return RenderOutcome::Aborted;
        };
        *left = left.saturating_sub(1);
        if *left > 0 {
            return RenderOutcome::InProgress;
        }
        self.remaining.remove(&target);
        self.counter.record(target);
        RenderOutcome::Completed
    }
}

impl RenderAction for SimulatedRenderer {
    fn start(&mut self, request: &RenderRequest) -> RenderOutcome {
        let passes = self.passes_per_lod.saturating_mul(request.settings.lod + 1);
        self.remaining.insert(request.target, passes);
        self.step(request.target)
    }

    fn monitor(&mut self, request: &RenderRequest) -> RenderOutcome {
        if request.cancel.is_cancelled() {
            self.remaining.remove(&request.target);
            self.aborted += 1;
            return RenderOutcome::Aborted;
        }
        self.step(request.target)
    }

    fn finish_abort(&mut self, target: TargetId) {
        if self.remaining.remove(&target).is_some() {
            self.aborted += 1;
        }
    }
}
