//! Integration tests for the coalescing scheduler.
//!
//! Each test drives the coalescer the way a host would: requests from
//! "callers", then processing passes triggered by the timer.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use rendersync_core::{
    CoalescerConfig, ManualTimer, MapClassifier, PendingState, RenderAction, RenderEvent,
    RenderOutcome, RenderRequest, RequestOutcome, RequestType, TargetClass, TargetId,
    UpdateCoalescer,
};

const A: TargetId = TargetId(1);
const B: TargetId = TargetId(2);
const C: TargetId = TargetId(3);

/// A render action whose behaviour per target is scripted.
///
/// `passes[t]` is how many calls a render of `t` takes; 1 means it completes
/// in `start`. Every call is logged as `(target, phase)`.
#[derive(Clone, Default)]
struct ScriptedAction {
    log: Arc<Mutex<Vec<(TargetId, &'static str)>>>,
    passes: Arc<Mutex<HashMap<TargetId, u32>>>,
    remaining: Arc<Mutex<HashMap<TargetId, u32>>>,
    fail: Arc<Mutex<Vec<TargetId>>>,
}

impl ScriptedAction {
    fn with_passes(self, target: TargetId, passes: u32) -> Self {
        self.passes.lock().insert(target, passes);
        self
    }

    fn starts(&self) -> Vec<TargetId> {
        self.log
            .lock()
            .iter()
            .filter(|(_, phase)| *phase == "start")
            .map(|(t, _)| *t)
            .collect()
    }

    fn calls(&self, phase: &str) -> usize {
        self.log.lock().iter().filter(|(_, p)| *p == phase).count()
    }

    fn step(&mut self, target: TargetId) -> RenderOutcome {
        if self.fail.lock().contains(&target) {
            return RenderOutcome::Aborted;
        }
        let mut remaining = self.remaining.lock();
        let left = remaining.entry(target).or_insert(1);
        *left -= 1;
        if *left == 0 {
            remaining.remove(&target);
            RenderOutcome::Completed
        } else {
            RenderOutcome::InProgress
        }
    }
}

impl RenderAction for ScriptedAction {
    fn start(&mut self, request: &RenderRequest) -> RenderOutcome {
        self.log.lock().push((request.target, "start"));
        let passes = self.passes.lock().get(&request.target).copied().unwrap_or(1);
        self.remaining.lock().insert(request.target, passes);
        self.step(request.target)
    }

    fn monitor(&mut self, request: &RenderRequest) -> RenderOutcome {
        self.log.lock().push((request.target, "monitor"));
        if request.cancel.is_cancelled() {
            return RenderOutcome::Aborted;
        }
        self.step(request.target)
    }

    fn finish_abort(&mut self, target: TargetId) {
        self.log.lock().push((target, "finish_abort"));
        self.remaining.lock().remove(&target);
    }
}

fn setup(action: ScriptedAction) -> (UpdateCoalescer, Arc<ManualTimer>) {
    let timer = Arc::new(ManualTimer::new());
    let coalescer = UpdateCoalescer::builder(action)
        .timer(Arc::clone(&timer))
        .build()
        .unwrap();
    (coalescer, timer)
}

#[test]
fn test_n_requests_between_passes_render_once() {
    for n in [1, 2, 10, 500] {
        let action = ScriptedAction::default();
        let (mut coalescer, _) = setup(action.clone());
        for _ in 0..n {
            coalescer.request_update(A);
        }
        coalescer.process_pending_updates();
        assert_eq!(action.starts(), vec![A], "n = {n}");
        assert_eq!(coalescer.stats().coalesced, n - 1);
    }
}

#[test]
fn test_request_for_one_target_never_renders_another() {
    let action = ScriptedAction::default();
    let (mut coalescer, _) = setup(action.clone());
    coalescer.add_target(A);
    coalescer.add_target(B);

    coalescer.request_update(A);
    coalescer.process_pending_updates();
    coalescer.process_pending_updates();

    assert_eq!(action.starts(), vec![A]);
    assert_eq!(coalescer.pending_state(B), PendingState::Inactive);
}

#[test]
fn test_distinct_targets_all_rendered_in_one_pass() {
    let action = ScriptedAction::default();
    let (mut coalescer, _) = setup(action.clone());
    coalescer.request_update(C);
    coalescer.request_update(A);
    coalescer.request_update(C);
    coalescer.request_update(B);

    let report = coalescer.process_pending_updates();

    // Unregistered targets go in first-request order.
    assert_eq!(report.started, vec![C, A, B]);
    assert_eq!(action.starts(), vec![C, A, B]);
}

#[test]
fn test_timer_stopped_exactly_once_after_drain() {
    let action = ScriptedAction::default();
    let (mut coalescer, timer) = setup(action);
    for t in [A, B, C] {
        coalescer.add_target(t);
    }
    coalescer.request_update_all(RequestType::All);
    coalescer.request_update(A);
    assert_eq!(timer.start_count(), 1);

    coalescer.process_pending_updates();
    coalescer.process_pending_updates();
    coalescer.process_pending_updates();

    assert_eq!(timer.stop_count(), 1);
    assert!(!timer.is_running());
    assert!(!coalescer.is_update_pending());
}

#[test]
fn test_registered_example_renders_in_registration_order() {
    let action = ScriptedAction::default();
    let (mut coalescer, timer) = setup(action.clone());
    for t in [A, B, C] {
        coalescer.add_target(t);
    }
    // Request in reverse to show the order comes from registration.
    coalescer.request_update(C);
    coalescer.request_update(B);
    coalescer.request_update(A);

    coalescer.process_pending_updates();

    assert_eq!(action.starts(), vec![A, B, C]);
    assert!(!coalescer.is_update_pending());
    assert_eq!(timer.stop_count(), 1);
}

#[test]
fn test_filtered_request_all() {
    let action = ScriptedAction::default();
    let timer = Arc::new(ManualTimer::new());
    let classifier = MapClassifier::new()
        .with(A, TargetClass::TwoD)
        .with(B, TargetClass::ThreeD)
        .with(C, TargetClass::TwoD);
    let mut coalescer = UpdateCoalescer::builder(action.clone())
        .timer(timer)
        .classifier(classifier)
        .build()
        .unwrap();
    for t in [A, B, C] {
        coalescer.add_target(t);
    }

    assert_eq!(coalescer.request_update_all(RequestType::TwoD), 2);
    coalescer.process_pending_updates();
    assert_eq!(action.starts(), vec![A, C]);

    assert_eq!(coalescer.force_immediate_update_all(RequestType::ThreeD), 1);
    assert_eq!(action.starts(), vec![A, C, B]);
}

#[test]
fn test_forced_update_is_synchronous_in_any_state() {
    let action = ScriptedAction::default();
    let (mut coalescer, _) = setup(action.clone());

    // Inactive.
    assert_eq!(coalescer.force_immediate_update(A), RenderOutcome::Completed);
    assert_eq!(action.starts(), vec![A]);
    assert_eq!(coalescer.pending_state(A), PendingState::Inactive);

    // Requested: the forced render satisfies the request.
    coalescer.request_update(A);
    coalescer.force_immediate_update(A);
    assert_eq!(action.starts(), vec![A, A]);
    assert!(!coalescer.is_rendering());
    assert!(!coalescer.is_update_pending());
    coalescer.process_pending_updates();
    assert_eq!(action.starts(), vec![A, A]);
}

#[test]
fn test_forced_update_supersedes_progressive_render() {
    let action = ScriptedAction::default().with_passes(A, 3);
    let (mut coalescer, _) = setup(action.clone());
    coalescer.request_update(A);
    coalescer.process_pending_updates();
    assert_eq!(coalescer.pending_state(A), PendingState::InProgress);
    assert!(coalescer.is_rendering());

    let outcome = coalescer.force_immediate_update(A);

    assert_eq!(outcome, RenderOutcome::Completed);
    assert_eq!(coalescer.pending_state(A), PendingState::Inactive);
    assert!(!coalescer.is_rendering());
    assert_eq!(action.calls("finish_abort"), 1);
    assert_eq!(action.calls("monitor"), 2);
}

#[test]
fn test_forced_update_gives_up_after_monitor_limit() {
    let action = ScriptedAction::default().with_passes(A, 1_000);
    let timer = Arc::new(ManualTimer::new());
    let config = CoalescerConfig {
        max_forced_monitor_ticks: 4,
        ..CoalescerConfig::default()
    };
    let mut coalescer = UpdateCoalescer::builder(action.clone())
        .timer(timer)
        .config(config)
        .build()
        .unwrap();

    assert_eq!(coalescer.force_immediate_update(A), RenderOutcome::Aborted);
    assert_eq!(action.calls("monitor"), 4);
    assert_eq!(action.calls("finish_abort"), 1);
    assert!(!coalescer.is_rendering());
    assert_eq!(coalescer.stats().aborted, 1);
}

#[test]
fn test_progressive_render_spans_passes() {
    let action = ScriptedAction::default().with_passes(A, 3);
    let (mut coalescer, timer) = setup(action.clone());
    coalescer.request_update(A);

    let first = coalescer.process_pending_updates();
    assert_eq!(first.in_progress, vec![A]);
    assert!(coalescer.is_rendering());
    assert!(!coalescer.is_update_pending());
    // Still rendering, so the timer keeps driving passes.
    assert!(timer.is_running());

    let second = coalescer.process_pending_updates();
    assert_eq!(second.in_progress, vec![A]);

    let third = coalescer.process_pending_updates();
    assert_eq!(third.completed, vec![A]);
    assert!(!coalescer.is_rendering());
    assert!(!timer.is_running());
    assert_eq!(timer.stop_count(), 1);
    assert_eq!(action.calls("start"), 1);
    assert_eq!(action.calls("monitor"), 2);
}

#[test]
fn test_request_during_render_is_not_lost() {
    let action = ScriptedAction::default().with_passes(A, 2);
    let (mut coalescer, _) = setup(action.clone());
    coalescer.request_update(A);
    coalescer.process_pending_updates();

    assert_eq!(coalescer.request_update(A), RequestOutcome::Deferred);
    assert_eq!(coalescer.pending_state(A), PendingState::InProgress);

    let report = coalescer.process_pending_updates();
    assert_eq!(report.completed, vec![A]);
    assert_eq!(report.requeued, vec![A]);
    assert_eq!(coalescer.pending_state(A), PendingState::Requested);
    assert!(coalescer.is_update_pending());

    coalescer.process_pending_updates();
    assert_eq!(action.calls("start"), 2);
}

#[test]
fn test_abort_is_immediate_without_acknowledgement() {
    let action = ScriptedAction::default().with_passes(A, 5);
    let (mut coalescer, timer) = setup(action.clone());
    coalescer.request_update(A);
    coalescer.process_pending_updates();

    assert!(coalescer.abort_update(A));

    assert_eq!(coalescer.pending_state(A), PendingState::Inactive);
    assert!(!coalescer.is_rendering());
    assert!(!timer.is_running());
    assert_eq!(action.calls("finish_abort"), 1);
    assert!(!coalescer.abort_update(A));
    assert!(!coalescer.abort_update(B));

    coalescer.process_pending_updates();
    assert_eq!(action.calls("monitor"), 0);
}

#[test]
fn test_action_abort_does_not_retry() {
    let action = ScriptedAction::default();
    action.fail.lock().push(A);
    let (mut coalescer, _) = setup(action.clone());
    coalescer.request_update(A);

    let report = coalescer.process_pending_updates();
    assert_eq!(report.aborted, vec![A]);
    coalescer.process_pending_updates();

    assert_eq!(action.calls("start"), 1);
    assert_eq!(coalescer.pending_state(A), PendingState::Inactive);
    assert_eq!(coalescer.last_updated_target(), None);
}

#[test]
fn test_benign_conditions_are_no_ops() {
    let action = ScriptedAction::default();
    let (mut coalescer, _) = setup(action);
    assert!(coalescer.add_target(A));
    assert!(!coalescer.add_target(A));
    assert!(!coalescer.remove_target(B));
    assert!(!coalescer.abort_update(C));
    assert_eq!(coalescer.registered_targets(), &[A]);
}

#[test]
fn test_shrinking_max_lod_clamps_current() {
    let action = ScriptedAction::default();
    let (mut coalescer, _) = setup(action);
    coalescer.set_number_of_lod(5).unwrap();
    coalescer.set_shading(1, true).unwrap();
    coalescer.set_shading(4, true).unwrap();
    coalescer.set_current_lod(4).unwrap();

    coalescer.set_max_lod(2).unwrap();

    assert_eq!(coalescer.current_lod(), 2);
    assert!(coalescer.shading(1).unwrap());
    assert!(coalescer.shading(2).is_ok());
    assert!(coalescer.shading(3).is_err());
    assert!(coalescer.set_current_lod(3).is_err());
}

#[test]
fn test_render_settings_follow_lod_state() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let action = move |request: &RenderRequest| {
        sink.lock().push(request.settings);
        RenderOutcome::Completed
    };
    let mut coalescer = UpdateCoalescer::new(action);
    coalescer.set_current_lod(1).unwrap();
    coalescer.set_clipping_plane_enabled(true);
    coalescer.force_immediate_update(A);

    let settings = seen.lock()[0];
    assert_eq!(settings.lod, 1);
    assert!(settings.shading);
    assert!(settings.clipping_plane);
}

#[test]
fn test_lifecycle_events_in_order() {
    let action = ScriptedAction::default();
    let (mut coalescer, _) = setup(action);
    let events = coalescer.event_channel();

    coalescer.request_update(A);
    coalescer.request_update(A);
    coalescer.process_pending_updates();

    let received: Vec<RenderEvent> = events.try_iter().collect();
    assert_eq!(
        received,
        vec![
            RenderEvent::Requested { target: A },
            RenderEvent::TimerStarted,
            RenderEvent::Started {
                target: A,
                forced: false
            },
            RenderEvent::Completed { target: A },
            RenderEvent::TimerStopped,
        ]
    );
}

#[test]
fn test_requests_from_other_threads_coalesce() {
    let action = ScriptedAction::default();
    let (mut coalescer, timer) = setup(action.clone());
    for t in [A, B] {
        coalescer.add_target(t);
    }

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let requester = coalescer.requester();
            thread::spawn(move || {
                for _ in 0..100 {
                    requester.request_update(if i % 2 == 0 { A } else { B });
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert!(timer.is_running());

    coalescer.process_pending_updates();

    let mut starts = action.starts();
    starts.sort();
    assert_eq!(starts, vec![A, B]);
    assert_eq!(coalescer.stats().requests, 800);
    assert!(!timer.is_running());
}

#[test]
fn test_remote_abort_flips_cancel_token() {
    let action = ScriptedAction::default().with_passes(A, 10);
    let (mut coalescer, _) = setup(action.clone());
    let requester = coalescer.requester();
    coalescer.request_update(A);
    coalescer.process_pending_updates();

    assert!(requester.abort_update(A));
    coalescer.process_pending_updates();

    assert_eq!(coalescer.pending_state(A), PendingState::Inactive);
    assert_eq!(action.calls("finish_abort"), 1);
    assert_eq!(action.calls("monitor"), 0);
}

#[test]
fn test_requester_reports_dropped_coalescer() {
    let (coalescer, _) = setup(ScriptedAction::default());
    let requester = coalescer.requester();
    drop(coalescer);
    assert!(!requester.request_update(A));
}

#[test]
fn test_halt_drops_everything() {
    let action = ScriptedAction::default().with_passes(A, 3);
    let (mut coalescer, timer) = setup(action.clone());
    coalescer.add_target(B);
    coalescer.request_update(A);
    coalescer.process_pending_updates();
    coalescer.request_update(B);

    coalescer.halt();

    assert!(!coalescer.is_rendering());
    assert!(!coalescer.is_update_pending());
    assert!(!timer.is_running());
    assert_eq!(coalescer.registered_targets(), &[B]);
    coalescer.process_pending_updates();
    assert_eq!(action.starts(), vec![A]);
}

#[test]
fn test_request_sent_after_last_drain_keeps_timer_running() {
    let action = ScriptedAction::default();
    let (mut coalescer, timer) = setup(action.clone());
    // Observers run after the pass's final drain, the same window a foreign
    // thread can hit between the drain and the timer decision.
    let requester = coalescer.requester();
    coalescer.subscribe(move |event| {
        if *event == (RenderEvent::Completed { target: A }) {
            requester.request_update(B);
        }
    });

    coalescer.request_update(A);
    coalescer.process_pending_updates();

    assert!(timer.is_running());
    assert!(coalescer.is_timer_running());

    let report = coalescer.process_pending_updates();
    assert_eq!(report.completed, vec![B]);
    assert_eq!(action.starts(), vec![A, B]);
    assert!(!timer.is_running());
}

#[test]
fn test_timer_started_by_requester_is_not_started_twice() {
    let (mut coalescer, timer) = setup(ScriptedAction::default());
    let requester = coalescer.requester();
    requester.request_update(A);
    requester.request_update(A);
    assert_eq!(timer.start_count(), 2);

    coalescer.process_pending_updates();

    assert_eq!(timer.start_count(), 2);
    assert_eq!(coalescer.stats().timer_starts, 0);
    assert_eq!(coalescer.stats().timer_stops, 1);
    assert!(!timer.is_running());
}
