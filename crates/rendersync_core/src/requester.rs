//! # Update Requester
//!
//! Callers that cannot borrow the coalescer (other threads, or a render
//! action that wants its own target drawn again) hold an [`UpdateRequester`].
//! Requests travel over a channel and are merged into the pending table at
//! the next opportunity: the start of a pass, or right after the render call
//! that was running when they arrived.

use std::collections::HashMap;
use std::sync::Arc;

use crossbeam_channel::Sender;
use parking_lot::Mutex;

use crate::render::CancelToken;
use crate::target::{RequestType, TargetId};
use crate::timer::TimerControl;

/// Cancel tokens of renders currently in flight, shared with requesters.
pub(crate) type RenderingMarkers = Arc<Mutex<HashMap<TargetId, CancelToken>>>;

/// A request sent through an [`UpdateRequester`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RemoteRequest {
    /// Same as `request_update`.
    Update(TargetId),
    /// Same as `request_update_all`.
    UpdateAll(RequestType),
    /// Same as `abort_update`.
    Abort(TargetId),
}

/// Clonable, thread-safe handle for requesting renders.
#[derive(Clone)]
pub struct UpdateRequester {
    sender: Sender<RemoteRequest>,
    timer: Arc<dyn TimerControl>,
    markers: RenderingMarkers,
}

impl std::fmt::Debug for UpdateRequester {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateRequester")
            .field("queued", &self.sender.len())
            .finish_non_exhaustive()
    }
}

impl UpdateRequester {
    pub(crate) fn new(
        sender: Sender<RemoteRequest>,
        timer: Arc<dyn TimerControl>,
        markers: RenderingMarkers,
    ) -> Self {
        Self {
            sender,
            timer,
            markers,
        }
    }

    /// Requests a render of `target`.
    ///
    /// Returns false if the coalescer is gone.
    pub fn request_update(&self, target: TargetId) -> bool {
        self.send(RemoteRequest::Update(target))
    }

    /// Requests a render of every registered target matching `filter`.
    ///
    /// Returns false if the coalescer is gone.
    pub fn request_update_all(&self, filter: RequestType) -> bool {
        self.send(RemoteRequest::UpdateAll(filter))
    }

    /// Aborts the render of `target`.
    ///
    /// The render's cancel token is flipped immediately; the state change
    /// happens when the coalescer picks up the request.
    pub fn abort_update(&self, target: TargetId) -> bool {
        if let Some(token) = self.markers.lock().get(&target) {
            token.cancel();
        }
        self.send(RemoteRequest::Abort(target))
    }

    fn send(&self, request: RemoteRequest) -> bool {
        if self.sender.send(request).is_err() {
            return false;
        }
        // A pass has to run to pick the request up.
        self.timer.start();
        true
    }
}
