//! # Render Actions
//!
//! The coalescer decides *when* a target renders; a [`RenderAction`] does
//! the drawing. Actions are supplied by composition and follow a
//! three-phase contract:
//!
//! 1. `start` - called once when a pass (or a forced update) picks the target.
//! 2. `monitor` - called on later passes while the action keeps reporting
//!    [`RenderOutcome::InProgress`] (progressive / multi-pass rendering).
//! 3. `finish_abort` - called when the render is aborted from outside.
//!
//! Cancellation is cooperative: the action polls its [`CancelToken`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::lod::ShadingValues;
use crate::target::TargetId;

/// Result of one call into a render action.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RenderOutcome {
    /// The target is up to date.
    Completed,
    /// The action gave up (cancelled or failed). No automatic retry.
    Aborted,
    /// More passes are needed; `monitor` will be called on the next pass.
    InProgress,
}

/// Cooperative cancellation flag for one in-flight render.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates an unset token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Returns true once cancellation was requested.
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Snapshot of the level-of-detail settings a render should use.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderSettings {
    /// Current level of detail.
    pub lod: u32,
    /// Shading flag for `lod`.
    pub shading: bool,
    /// Shading coefficients.
    pub shading_values: ShadingValues,
    /// Clipping plane flag.
    pub clipping_plane: bool,
    /// Number of 3D targets the host reported.
    pub number_of_3d_targets: usize,
}

/// Everything a render action gets for one call.
#[derive(Clone, Debug)]
pub struct RenderRequest {
    /// Target being rendered.
    pub target: TargetId,
    /// Settings at the time of the call.
    pub settings: RenderSettings,
    /// Cancellation flag for this render.
    pub cancel: CancelToken,
    /// True for `force_immediate_update*` renders.
    pub forced: bool,
}

/// Performs the actual drawing for a target.
pub trait RenderAction: Send {
    /// Starts rendering `request.target`.
    fn start(&mut self, request: &RenderRequest) -> RenderOutcome;

    /// Continues a render that previously returned [`RenderOutcome::InProgress`].
    fn monitor(&mut self, _request: &RenderRequest) -> RenderOutcome {
        RenderOutcome::Completed
    }

    /// Called after the coalescer aborted a render of `target`.
    fn finish_abort(&mut self, _target: TargetId) {}
}

impl<F> RenderAction for F
where
    F: FnMut(&RenderRequest) -> RenderOutcome + Send,
{
    fn start(&mut self, request: &RenderRequest) -> RenderOutcome {
        self(request)
    }
}
