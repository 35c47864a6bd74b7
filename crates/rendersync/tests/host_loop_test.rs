//! End-to-end tests: real timer thread, real host loop.

use std::thread;
use std::time::Duration;

use rendersync::{HostError, HostEvent, HostLoop, SimulatedRenderer};
use rendersync_core::{CoalescerConfig, PendingState, RequestType, TargetId};

fn fast_config() -> CoalescerConfig {
    CoalescerConfig {
        tick_interval_ms: 2,
        ..CoalescerConfig::default()
    }
}

#[test]
fn test_burst_from_many_threads_renders_each_target_once() {
    let renderer = SimulatedRenderer::new(1);
    let frames = renderer.frame_counter();
    let mut host = HostLoop::new(renderer, fast_config()).unwrap();
    {
        let mut coalescer = host.coalescer().lock();
        for id in 0..3 {
            coalescer.add_target(TargetId(id));
        }
    }

    let workers: Vec<_> = (0..6u64)
        .map(|caller| {
            let handle = host.handle();
            thread::spawn(move || {
                for _ in 0..200 {
                    handle.request_update(TargetId(caller % 3)).unwrap();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    // Everything is queued before the first tick can be dispatched.
    host.pump();
    host.run_for(Duration::from_millis(100));

    assert_eq!(frames.targets(), vec![TargetId(0), TargetId(1), TargetId(2)]);
    for id in 0..3 {
        assert_eq!(frames.frames(TargetId(id)), 1);
    }
    let coalescer = host.coalescer().lock();
    assert_eq!(coalescer.stats().requests, 1200);
    assert!(!coalescer.is_update_pending());
    assert!(!coalescer.is_timer_running());
}

#[test]
fn test_progressive_render_finishes_on_timer_ticks() {
    let renderer = SimulatedRenderer::new(4);
    let frames = renderer.frame_counter();
    let mut host = HostLoop::new(renderer, fast_config()).unwrap();
    let handle = host.handle();

    handle.request_update(TargetId(7)).unwrap();
    host.run_for(Duration::from_millis(200));

    assert_eq!(frames.frames(TargetId(7)), 1);
    assert!(host.stats().ticks >= 4);
    assert!(!host.coalescer().lock().is_rendering());
}

#[test]
fn test_abort_through_handle() {
    let renderer = SimulatedRenderer::new(1_000);
    let frames = renderer.frame_counter();
    let mut host = HostLoop::new(renderer, fast_config()).unwrap();
    let handle = host.handle();

    handle.request_update(TargetId(1)).unwrap();
    handle.send(HostEvent::Tick).unwrap();
    host.pump();
    assert_eq!(
        host.coalescer().lock().pending_state(TargetId(1)),
        PendingState::InProgress
    );

    handle.abort_update(TargetId(1)).unwrap();
    host.pump();

    let coalescer = host.coalescer().lock();
    assert_eq!(coalescer.pending_state(TargetId(1)), PendingState::Inactive);
    assert!(!coalescer.is_timer_running());
    assert_eq!(frames.total(), 0);
    assert_eq!(host.stats().aborts, 1);
}

#[test]
fn test_forced_update_all_runs_on_loop_thread() {
    let renderer = SimulatedRenderer::new(2);
    let frames = renderer.frame_counter();
    let mut host = HostLoop::new(renderer, fast_config()).unwrap();
    {
        let mut coalescer = host.coalescer().lock();
        coalescer.add_target(TargetId(1));
        coalescer.add_target(TargetId(2));
    }

    host.handle().force_update_all(RequestType::All).unwrap();
    assert_eq!(host.pump(), 1);

    assert_eq!(frames.total(), 2);
    assert_eq!(host.stats().renders_completed, 2);
    assert!(!host.coalescer().lock().is_rendering());
}

#[test]
fn test_shutdown_from_another_thread_ends_run() {
    let mut host = HostLoop::new(SimulatedRenderer::new(1), fast_config()).unwrap();
    let handle = host.handle();

    let stopper = thread::spawn(move || {
        handle.request_update(TargetId(1)).unwrap();
        thread::sleep(Duration::from_millis(20));
        handle.shutdown().unwrap();
    });

    let stats = host.run();
    stopper.join().unwrap();

    assert!(host.is_stopped());
    assert_eq!(stats.requests, 1);
    assert!(!host.coalescer().lock().is_timer_running());
}

#[test]
fn test_handle_reports_dropped_loop() {
    let host = HostLoop::new(SimulatedRenderer::new(1), fast_config()).unwrap();
    let handle = host.handle();
    drop(host);

    assert!(matches!(
        handle.request_update(TargetId(1)),
        Err(HostError::Disconnected)
    ));
    assert!(matches!(handle.shutdown(), Err(HostError::Disconnected)));
}
