//! # Update Coalescer
//!
//! Many unrelated callers decide that a view is stale. Each of them calls
//! [`UpdateCoalescer::request_update`]; none of them renders. The renders
//! happen in [`UpdateCoalescer::process_pending_updates`], which a timer runs
//! at a bounded cadence, so N requests for one target between two passes
//! cost exactly one render.
//!
//! ```text
//!  caller A ─┐
//!  caller B ─┼─▶ request_update(t) ──▶ PendingTable ──▶ timer.start()
//!  caller C ─┘         (merge)              │
//!                                           ▼
//!                      timer tick ──▶ process_pending_updates()
//!                                           │ one render per target
//!                                           ▼
//!                                    RenderAction::start / monitor
//! ```
//!
//! ## Threading
//!
//! Every method runs on one control thread. Other threads go through an
//! [`UpdateRequester`], which feeds a channel drained at the start of each
//! pass and after every render call.

use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;

use crate::config::CoalescerConfig;
use crate::error::ConfigurationError;
use crate::events::{ObserverId, RenderEvent, RenderObservers};
use crate::lod::{LevelOfDetail, ShadingValues};
use crate::pending::{PendingState, PendingTable, RequestOutcome};
use crate::render::{CancelToken, RenderAction, RenderOutcome, RenderRequest};
use crate::requester::{RemoteRequest, RenderingMarkers, UpdateRequester};
use crate::stats::{CoalescerStats, PassReport};
use crate::target::{
    RequestType, TargetClass, TargetClassifier, TargetId, TargetRegistry, UniformClassifier,
};
use crate::timer::{ManualTimer, TimerControl};

/// Builder for [`UpdateCoalescer`].
pub struct CoalescerBuilder {
    config: CoalescerConfig,
    action: Box<dyn RenderAction>,
    timer: Option<Arc<dyn TimerControl>>,
    classifier: Option<Box<dyn TargetClassifier>>,
}

impl CoalescerBuilder {
    /// Uses `config` instead of the defaults.
    #[must_use]
    pub fn config(mut self, config: CoalescerConfig) -> Self {
        self.config = config;
        self
    }

    /// Drives passes with `timer`. Defaults to a [`ManualTimer`].
    #[must_use]
    pub fn timer<T: TimerControl + 'static>(mut self, timer: Arc<T>) -> Self {
        self.timer = Some(timer as Arc<dyn TimerControl>);
        self
    }

    /// Same as [`CoalescerBuilder::timer`] for an already type-erased timer.
    #[must_use]
    pub fn shared_timer(mut self, timer: Arc<dyn TimerControl>) -> Self {
        self.timer = Some(timer);
        self
    }

    /// Classifies targets for the filtered "all" operations.
    /// Defaults to classifying everything as [`TargetClass::Other`].
    #[must_use]
    pub fn classifier<C: TargetClassifier + 'static>(mut self, classifier: C) -> Self {
        self.classifier = Some(Box::new(classifier));
        self
    }

    /// Validates the configuration and builds the coalescer.
    ///
    /// # Errors
    ///
    /// Any [`ConfigurationError`] from [`CoalescerConfig::validate`].
    pub fn build(self) -> Result<UpdateCoalescer, ConfigurationError> {
        let lod = self.config.level_of_detail()?;
        let timer = self
            .timer
            .unwrap_or_else(|| Arc::new(ManualTimer::new()) as Arc<dyn TimerControl>);
        let classifier = self
            .classifier
            .unwrap_or_else(|| Box::new(UniformClassifier(TargetClass::Other)) as Box<dyn TargetClassifier>);
        Ok(UpdateCoalescer::from_parts(
            self.config,
            lod,
            self.action,
            timer,
            classifier,
        ))
    }
}

/// Coalescing render-update scheduler.
pub struct UpdateCoalescer {
    config: CoalescerConfig,
    registry: TargetRegistry,
    pending: PendingTable,
    /// Cached "some target is requested".
    update_pending: bool,
    timer_running: bool,
    timer: Arc<dyn TimerControl>,
    action: Box<dyn RenderAction>,
    classifier: Box<dyn TargetClassifier>,
    lod: LevelOfDetail,
    last_updated: Option<TargetId>,
    markers: RenderingMarkers,
    observers: RenderObservers,
    stats: CoalescerStats,
    remote_tx: Sender<RemoteRequest>,
    remote_rx: Receiver<RemoteRequest>,
}

impl std::fmt::Debug for UpdateCoalescer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateCoalescer")
            .field("registered", &self.registry.len())
            .field("requested", &self.pending.requested_count())
            .field("in_progress", &self.pending.in_progress_count())
            .field("update_pending", &self.update_pending)
            .field("timer_running", &self.timer_running)
            .field("lod", &self.lod)
            .field("last_updated", &self.last_updated)
            .field("observers", &self.observers)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl UpdateCoalescer {
    /// Creates a coalescer with default configuration, a [`ManualTimer`] and
    /// no target classes.
    #[must_use]
    pub fn new<A: RenderAction + 'static>(action: A) -> Self {
        Self::from_parts(
            CoalescerConfig::default(),
            LevelOfDetail::default(),
            Box::new(action),
            Arc::new(ManualTimer::new()),
            Box::new(UniformClassifier(TargetClass::Other)),
        )
    }

    /// Starts a builder around `action`.
    #[must_use]
    pub fn builder<A: RenderAction + 'static>(action: A) -> CoalescerBuilder {
        CoalescerBuilder {
            config: CoalescerConfig::default(),
            action: Box::new(action),
            timer: None,
            classifier: None,
        }
    }

    fn from_parts(
        config: CoalescerConfig,
        lod: LevelOfDetail,
        action: Box<dyn RenderAction>,
        timer: Arc<dyn TimerControl>,
        classifier: Box<dyn TargetClassifier>,
    ) -> Self {
        let (remote_tx, remote_rx) = crossbeam_channel::unbounded();
        Self {
            config,
            registry: TargetRegistry::new(),
            pending: PendingTable::new(),
            update_pending: false,
            timer_running: false,
            timer,
            action,
            classifier,
            lod,
            last_updated: None,
            markers: Arc::new(Mutex::new(std::collections::HashMap::new())),
            observers: RenderObservers::new(),
            stats: CoalescerStats::default(),
            remote_tx,
            remote_rx,
        }
    }

    // =========================================================================
    // REGISTRATION
    // =========================================================================

    /// Registers a target for the "all" operations. No-op if present.
    pub fn add_target(&mut self, target: TargetId) -> bool {
        self.registry.add(target)
    }

    /// Unregisters a target and forgets its pending state. No-op if absent.
    ///
    /// A render in flight for the target is cancelled.
    pub fn remove_target(&mut self, target: TargetId) -> bool {
        if !self.registry.remove(target) {
            return false;
        }
        if self.pending.remove(target) == Some(PendingState::InProgress) {
            if let Some(token) = self.markers.lock().remove(&target) {
                token.cancel();
            }
            self.action.finish_abort(target);
        }
        if self.last_updated == Some(target) {
            self.last_updated = None;
        }
        self.check_update_pending();
        true
    }

    /// Registered targets in registration order.
    #[must_use]
    pub fn registered_targets(&self) -> &[TargetId] {
        self.registry.as_slice()
    }

    /// Replaces the target classifier.
    pub fn set_classifier<C: TargetClassifier + 'static>(&mut self, classifier: C) {
        self.classifier = Box::new(classifier);
    }

    // =========================================================================
    // REQUESTS
    // =========================================================================

    /// Requests a render of `target` in the next pass.
    ///
    /// The target does not need to be registered. A request for a target
    /// that is rendering is remembered and the target is requested again
    /// once that render ends.
    pub fn request_update(&mut self, target: TargetId) -> RequestOutcome {
        self.stats.requests += 1;
        let outcome = self.pending.request(target);
        match outcome {
            RequestOutcome::Queued => {
                tracing::trace!("{} requested", target);
                self.observers.emit(RenderEvent::Requested { target });
                self.check_update_pending();
            }
            RequestOutcome::Coalesced => self.stats.coalesced += 1,
            RequestOutcome::Deferred => self.stats.deferred += 1,
        }
        outcome
    }

    /// Requests every registered target matching `filter`.
    ///
    /// Returns the number of targets that were newly queued.
    pub fn request_update_all(&mut self, filter: RequestType) -> usize {
        let targets = self.matching(filter);
        targets
            .into_iter()
            .filter(|t| self.request_update(*t) == RequestOutcome::Queued)
            .count()
    }

    /// Handle for requesting renders from other threads or from inside a
    /// render action.
    #[must_use]
    pub fn requester(&self) -> UpdateRequester {
        UpdateRequester::new(
            self.remote_tx.clone(),
            Arc::clone(&self.timer),
            Arc::clone(&self.markers),
        )
    }

    // =========================================================================
    // FORCED UPDATES
    // =========================================================================

    /// Renders `target` right now, bypassing the batching window.
    ///
    /// Blocks until the render action finishes. A progressive action is
    /// monitored until it completes, is cancelled, or exceeds
    /// `max_forced_monitor_ticks`. An outstanding request for the target is
    /// satisfied by this render; requests arriving during it schedule
    /// another one.
    pub fn force_immediate_update(&mut self, target: TargetId) -> RenderOutcome {
        match self.pending.state(target) {
            PendingState::Requested => {
                self.pending.clear_request(target);
            }
            PendingState::InProgress => {
                // Supersede the progressive render a pass started.
                if let Some(token) = self.markers.lock().remove(&target) {
                    token.cancel();
                }
                self.pending.remove(target);
                self.action.finish_abort(target);
            }
            PendingState::Inactive => {}
        }

        self.pending.begin(target);
        let request = self.fresh_request(target, true);
        self.stats.forced += 1;
        tracing::trace!("{} forced render", target);
        self.observers.emit(RenderEvent::Started {
            target,
            forced: true,
        });

        let mut outcome = self.action.start(&request);
        self.drain_remote();

        let mut ticks = 0u32;
        let mut aborted_here = false;
        while outcome == RenderOutcome::InProgress
            && self.pending.state(target) == PendingState::InProgress
        {
            if request.cancel.is_cancelled() {
                outcome = RenderOutcome::Aborted;
                aborted_here = true;
                break;
            }
            if ticks >= self.config.max_forced_monitor_ticks {
                tracing::warn!(
                    "{} still rendering after {} monitor ticks, aborting forced update",
                    target,
                    ticks
                );
                request.cancel.cancel();
                outcome = RenderOutcome::Aborted;
                aborted_here = true;
                break;
            }
            ticks += 1;
            self.observers.emit(RenderEvent::Progress { target });
            outcome = self.action.monitor(&request);
            self.drain_remote();
        }

        if self.pending.state(target) == PendingState::InProgress {
            self.markers.lock().remove(&target);
            self.pending.finish(target);
            if outcome == RenderOutcome::Completed {
                self.last_updated = Some(target);
                self.stats.completed += 1;
                self.observers.emit(RenderEvent::Completed { target });
            } else {
                if aborted_here {
                    self.action.finish_abort(target);
                }
                self.stats.aborted += 1;
                self.observers.emit(RenderEvent::Aborted { target });
            }
        } else {
            // Aborted through a request handle while we waited.
            outcome = RenderOutcome::Aborted;
        }

        // The synchronous path may have interleaved with queued requests.
        self.pending.recount();
        self.check_update_pending();
        outcome
    }

    /// Forces a render of every registered target matching `filter`, in
    /// registration order. Returns the number of renders that completed.
    pub fn force_immediate_update_all(&mut self, filter: RequestType) -> usize {
        let targets = self.matching(filter);
        targets
            .into_iter()
            .filter(|t| self.force_immediate_update(*t) == RenderOutcome::Completed)
            .count()
    }

    // =========================================================================
    // PROCESSING PASS
    // =========================================================================

    /// Executes all pending requests. Called by the timer's owner.
    ///
    /// Renders still in progress from earlier passes are monitored first,
    /// then every target that was requested when the pass began is started:
    /// registered targets in registration order, then the rest in request
    /// order. Targets requested again during the pass wait for the next one.
    pub fn process_pending_updates(&mut self) -> PassReport {
        self.drain_remote();
        self.stats.passes += 1;

        let mut report = PassReport::default();
        let registry = &self.registry;
        let continuing = self
            .pending
            .targets_in(PendingState::InProgress, |t| registry.position(t));
        let requested = self
            .pending
            .targets_in(PendingState::Requested, |t| registry.position(t));

        for target in continuing {
            if self.pending.state(target) != PendingState::InProgress {
                continue;
            }
            let request = self.continuing_request(target);
            self.stats.render_calls += 1;
            let outcome = self.action.monitor(&request);
            self.drain_remote();
            self.settle(target, outcome, &mut report);
        }

        for target in requested {
            if self.pending.state(target) != PendingState::Requested {
                continue;
            }
            self.pending.begin(target);
            let request = self.fresh_request(target, false);
            tracing::trace!("{} render started", target);
            self.observers.emit(RenderEvent::Started {
                target,
                forced: false,
            });
            report.started.push(target);
            self.stats.render_calls += 1;
            let outcome = self.action.start(&request);
            self.drain_remote();
            self.settle(target, outcome, &mut report);
        }

        self.check_update_pending();
        report
    }

    /// Aborts the render of `target` if it is in progress.
    ///
    /// The target becomes inactive immediately; the render action learns
    /// about it through its cancel token and `finish_abort`. A request merged
    /// into the aborted render is dropped with it.
    pub fn abort_update(&mut self, target: TargetId) -> bool {
        if self.pending.state(target) != PendingState::InProgress {
            return false;
        }
        if let Some(token) = self.markers.lock().remove(&target) {
            token.cancel();
        }
        self.pending.abort(target);
        self.action.finish_abort(target);
        self.stats.aborted += 1;
        tracing::debug!("{} render aborted", target);
        self.observers.emit(RenderEvent::Aborted { target });
        self.check_update_pending();
        true
    }

    /// Aborts every render, drops every request and stops the timer.
    ///
    /// Registration and level-of-detail settings are kept.
    pub fn halt(&mut self) {
        self.drain_remote();
        for target in self.pending.targets_in(PendingState::InProgress, |_| None) {
            self.abort_update(target);
        }
        for target in self.pending.targets_in(PendingState::Requested, |_| None) {
            self.pending.clear_request(target);
        }
        self.check_update_pending();
        tracing::debug!("coalescer halted");
    }

    // =========================================================================
    // STATE
    // =========================================================================

    /// Returns true if any target is being rendered.
    #[must_use]
    pub fn is_rendering(&self) -> bool {
        self.pending.has_in_progress()
    }

    /// Returns true if any target waits for the next pass.
    #[must_use]
    pub fn is_update_pending(&self) -> bool {
        self.update_pending
    }

    /// Returns true while the coalescer wants the timer running.
    #[must_use]
    pub fn is_timer_running(&self) -> bool {
        self.timer_running
    }

    /// Pending state of one target.
    #[must_use]
    pub fn pending_state(&self, target: TargetId) -> PendingState {
        self.pending.state(target)
    }

    /// Target whose render completed most recently.
    #[must_use]
    pub fn last_updated_target(&self) -> Option<TargetId> {
        self.last_updated
    }

    /// Counters since creation.
    #[must_use]
    pub fn stats(&self) -> CoalescerStats {
        self.stats
    }

    /// Configuration the coalescer was built with.
    #[must_use]
    pub fn config(&self) -> &CoalescerConfig {
        &self.config
    }

    // =========================================================================
    // OBSERVERS
    // =========================================================================

    /// Registers a lifecycle callback, run synchronously on the control thread.
    pub fn subscribe<F>(&mut self, callback: F) -> ObserverId
    where
        F: FnMut(&RenderEvent) + Send + 'static,
    {
        self.observers.subscribe(callback)
    }

    /// Removes a lifecycle callback.
    pub fn unsubscribe(&mut self, id: ObserverId) -> bool {
        self.observers.unsubscribe(id)
    }

    /// Opens a bounded channel of lifecycle events.
    pub fn event_channel(&mut self) -> Receiver<RenderEvent> {
        self.observers.channel(self.config.event_channel_capacity)
    }

    // =========================================================================
    // LEVEL OF DETAIL
    // =========================================================================

    /// Current level of detail.
    #[must_use]
    pub fn current_lod(&self) -> u32 {
        self.lod.current()
    }

    /// Sets the current level of detail. Does not request a render.
    ///
    /// # Errors
    ///
    /// [`ConfigurationError::LodOutOfRange`] if `lod > max_lod`.
    pub fn set_current_lod(&mut self, lod: u32) -> Result<(), ConfigurationError> {
        self.lod.set_current(lod)
    }

    /// Highest level of detail.
    #[must_use]
    pub fn max_lod(&self) -> u32 {
        self.lod.max()
    }

    /// Changes the highest level of detail, clamping the current one.
    ///
    /// # Errors
    ///
    /// [`ConfigurationError::MaxLodTooLarge`] past
    /// [`MAX_LOD_LIMIT`](crate::lod::MAX_LOD_LIMIT).
    pub fn set_max_lod(&mut self, max: u32) -> Result<(), ConfigurationError> {
        self.lod.set_max(max)
    }

    /// Sets the number of levels of detail.
    ///
    /// # Errors
    ///
    /// [`ConfigurationError::InvalidLodCount`] if `count` is zero.
    pub fn set_number_of_lod(&mut self, count: u32) -> Result<(), ConfigurationError> {
        self.lod.set_count(count)
    }

    /// Shading flag of one level of detail.
    ///
    /// # Errors
    ///
    /// [`ConfigurationError::ShadingIndexOutOfRange`] if `lod > max_lod`.
    pub fn shading(&self, lod: u32) -> Result<bool, ConfigurationError> {
        self.lod.shading(lod)
    }

    /// Sets the shading flag of one level of detail.
    ///
    /// # Errors
    ///
    /// [`ConfigurationError::ShadingIndexOutOfRange`] if `lod > max_lod`.
    pub fn set_shading(&mut self, lod: u32, enabled: bool) -> Result<(), ConfigurationError> {
        self.lod.set_shading(lod, enabled)
    }

    /// Shading coefficients.
    #[must_use]
    pub fn shading_values(&self) -> ShadingValues {
        self.lod.shading_values()
    }

    /// Replaces the shading coefficients.
    pub fn set_shading_values(&mut self, values: ShadingValues) {
        self.lod.set_shading_values(values);
    }

    /// Clipping plane flag.
    #[must_use]
    pub fn clipping_plane_enabled(&self) -> bool {
        self.lod.clipping_plane()
    }

    /// Sets the clipping plane flag.
    pub fn set_clipping_plane_enabled(&mut self, enabled: bool) {
        self.lod.set_clipping_plane(enabled);
    }

    /// Number of 3D targets.
    #[must_use]
    pub fn number_of_3d_targets(&self) -> usize {
        self.lod.number_of_3d_targets()
    }

    /// Records the number of 3D targets. Does not request a render.
    pub fn set_number_of_3d_targets(&mut self, count: usize) {
        self.lod.set_number_of_3d_targets(count);
    }

    /// Full level-of-detail state.
    #[must_use]
    pub fn level_of_detail(&self) -> &LevelOfDetail {
        &self.lod
    }

    // =========================================================================
    // INTERNALS
    // =========================================================================

    fn matching(&self, filter: RequestType) -> Vec<TargetId> {
        self.registry
            .matching(filter, &*self.classifier)
            .collect()
    }

    fn fresh_request(&self, target: TargetId, forced: bool) -> RenderRequest {
        let cancel = CancelToken::new();
        self.markers.lock().insert(target, cancel.clone());
        RenderRequest {
            target,
            settings: self.lod.settings(),
            cancel,
            forced,
        }
    }

    fn continuing_request(&self, target: TargetId) -> RenderRequest {
        let cancel = self.markers.lock().entry(target).or_default().clone();
        RenderRequest {
            target,
            settings: self.lod.settings(),
            cancel,
            forced: false,
        }
    }

    /// Applies the outcome of a render call made by a pass.
    fn settle(&mut self, target: TargetId, outcome: RenderOutcome, report: &mut PassReport) {
        if self.pending.state(target) != PendingState::InProgress {
            // Aborted through a request handle during the call.
            return;
        }
        match outcome {
            RenderOutcome::InProgress => {
                report.in_progress.push(target);
                self.observers.emit(RenderEvent::Progress { target });
            }
            RenderOutcome::Completed | RenderOutcome::Aborted => {
                self.markers.lock().remove(&target);
                let next = self.pending.finish(target);
                if next == PendingState::Requested {
                    report.requeued.push(target);
                }
                if outcome == RenderOutcome::Completed {
                    tracing::trace!("{} render completed", target);
                    self.last_updated = Some(target);
                    self.stats.completed += 1;
                    report.completed.push(target);
                    self.observers.emit(RenderEvent::Completed { target });
                } else {
                    tracing::debug!("{} render aborted by action", target);
                    self.stats.aborted += 1;
                    report.aborted.push(target);
                    self.observers.emit(RenderEvent::Aborted { target });
                }
            }
        }
    }

    /// Merges requests sent through [`UpdateRequester`]s.
    fn drain_remote(&mut self) -> usize {
        if !self.remote_rx.is_empty() {
            // The requesters started the timer themselves.
            self.timer_running = true;
        }
        let mut drained = 0;
        while let Ok(request) = self.remote_rx.try_recv() {
            drained += 1;
            match request {
                RemoteRequest::Update(target) => {
                    self.request_update(target);
                }
                RemoteRequest::UpdateAll(filter) => {
                    self.request_update_all(filter);
                }
                RemoteRequest::Abort(target) => {
                    self.abort_update(target);
                }
            }
        }
        drained
    }

    /// Recomputes the pending flag and starts or stops the timer to match.
    fn check_update_pending(&mut self) {
        self.update_pending = self.pending.has_requested();
        if self.update_pending {
            self.start_timer();
        } else if !self.pending.has_in_progress() {
            self.stop_timer();
            // Requesters push before they start the timer, so anything sent
            // after the last drain is visible here and needs another pass.
            if !self.remote_rx.is_empty() {
                self.start_timer();
            }
        }
    }

    fn start_timer(&mut self) {
        if self.timer_running {
            return;
        }
        self.timer_running = true;
        self.stats.timer_starts += 1;
        self.timer.start();
        tracing::debug!("update timer started");
        self.observers.emit(RenderEvent::TimerStarted);
    }

    fn stop_timer(&mut self) {
        if !self.timer_running {
            return;
        }
        self.timer_running = false;
        self.stats.timer_stops += 1;
        self.timer.stop();
        tracing::debug!("update timer stopped");
        self.observers.emit(RenderEvent::TimerStopped);
    }
}
