//! # RENDERSYNC Demo
//!
//! Many caller threads keep asking for renders; one coalescer draws each
//! target once per pass.
//!
//! ## Usage
//!
//! ```bash
//! rendersync_demo --callers 8 --targets 4 --requests 500 --passes 3
//! ```

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rendersync::{HostLoop, SimulatedRenderer, ThreadTimerFactory};
use rendersync_core::{global, CoalescerConfig, RequestType, TargetId};

fn main() {
    println!("╔══════════════════════════════════════════════════════════════════╗");
    println!("║         RENDERSYNC DEMO                                          ║");
    println!("║         MANY REQUESTS, ONE RENDER PER TARGET                     ║");
    println!("╚══════════════════════════════════════════════════════════════════╝");
    println!();

    // Parse command line arguments (simple parsing, no external deps)
    let args: Vec<String> = std::env::args().collect();
    let mut callers = 8usize;
    let mut targets = 4u64;
    let mut requests = 500u64;
    let mut passes = 3u32;
    let mut config_path: Option<String> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--callers" | "-c" => {
                if i + 1 < args.len() {
                    callers = args[i + 1].parse().unwrap_or(8);
                    i += 1;
                }
            }
            "--targets" | "-t" => {
                if i + 1 < args.len() {
                    targets = args[i + 1].parse().unwrap_or(4);
                    i += 1;
                }
            }
            "--requests" | "-r" => {
                if i + 1 < args.len() {
                    requests = args[i + 1].parse().unwrap_or(500);
                    i += 1;
                }
            }
            "--passes" | "-p" => {
                if i + 1 < args.len() {
                    passes = args[i + 1].parse().unwrap_or(3);
                    i += 1;
                }
            }
            "--config" => {
                if i + 1 < args.len() {
                    config_path = Some(args[i + 1].clone());
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Usage: rendersync_demo [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --callers <NUM>        Caller threads (default: 8)");
                println!("  -t, --targets <NUM>        Render targets (default: 4)");
                println!("  -r, --requests <NUM>       Requests per caller (default: 500)");
                println!("  -p, --passes <NUM>         Render passes per LOD (default: 3)");
                println!("      --config <FILE>        Coalescer TOML configuration");
                println!("  -h, --help                 Show this help");
                return;
            }
            _ => {}
        }
        i += 1;
    }
    let targets = targets.max(1);

    let config = match &config_path {
        Some(path) => match CoalescerConfig::from_toml_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Invalid configuration: {e}");
                std::process::exit(1);
            }
        },
        None => CoalescerConfig::default(),
    };

    println!("┌─ CONFIGURATION ─────────────────────────────────────────────────┐");
    println!("│ Callers:            {}", callers);
    println!("│ Targets:            {}", targets);
    println!("│ Requests/caller:    {}", requests);
    println!("│ Passes per LOD:     {}", passes);
    println!("│ Tick Interval:      {} ms", config.tick_interval_ms);
    println!("└──────────────────────────────────────────────────────────────────┘");
    println!();

    let renderer = SimulatedRenderer::new(passes).with_frame_cost(Duration::from_micros(200));
    let frames = renderer.frame_counter();
    let slot = Mutex::new(Some(renderer));

    let (sender, receiver) = HostLoop::channel();
    let factory = match ThreadTimerFactory::new(config, sender.clone(), move || {
        // The global instance is created exactly once.
        slot.lock().take().unwrap_or_else(|| SimulatedRenderer::new(1))
    }) {
        Ok(factory) => factory,
        Err(e) => {
            eprintln!("Failed to start timer: {e}");
            std::process::exit(1);
        }
    };
    let gate = factory.timer().tick_gate();
    global::set_factory(Box::new(factory));

    let coalescer = match global::instance() {
        Ok(instance) => instance,
        Err(e) => {
            eprintln!("Failed to create coalescer: {e}");
            std::process::exit(1);
        }
    };
    {
        let mut guard = coalescer.lock();
        for id in 0..targets {
            guard.add_target(TargetId(id));
        }
    }

    let mut host =
        HostLoop::from_parts(Arc::clone(&coalescer), sender, receiver).with_tick_gate(gate);
    let handle = host.handle();
    let requester = coalescer.lock().requester();

    println!("Spamming requests...");
    let start = Instant::now();

    let workers: Vec<_> = (0..callers)
        .map(|caller| {
            let handle = handle.clone();
            let requester = requester.clone();
            thread::spawn(move || {
                for n in 0..requests {
                    let target = TargetId((caller as u64 + n) % targets);
                    // Half the callers go through the host loop, half straight
                    // to the coalescer's request channel.
                    if caller % 2 == 0 {
                        if let Err(e) = handle.request_update(target) {
                            eprintln!("Caller {caller} stopped: {e}");
                            break;
                        }
                    } else {
                        requester.request_update(target);
                    }
                    if n % 50 == 0 {
                        thread::sleep(Duration::from_millis(1));
                    }
                }
            })
        })
        .collect();

    let control = thread::spawn(move || {
        host.run();
        host
    });

    for worker in workers {
        if worker.join().is_err() {
            eprintln!("Caller thread panicked");
        }
    }
    // One final burst and a forced redraw, as a host would on resize.
    if let Err(e) = handle.request_update_all(RequestType::All) {
        eprintln!("Final request failed: {e}");
    }
    if let Err(e) = handle.force_update(TargetId(0)) {
        eprintln!("Forced redraw failed: {e}");
    }
    thread::sleep(Duration::from_millis(300));
    if let Err(e) = handle.shutdown() {
        eprintln!("Shutdown failed: {e}");
    }

    let host = match control.join() {
        Ok(host) => host,
        Err(_) => {
            eprintln!("Host loop panicked");
            std::process::exit(1);
        }
    };
    let elapsed = start.elapsed();
    let loop_stats = host.stats();
    let stats = coalescer.lock().stats();

    println!();
    println!("┌─ RESULTS ───────────────────────────────────────────────────────");
    println!("│ Elapsed:            {:.1} ms", elapsed.as_secs_f64() * 1000.0);
    println!("│ Requests:           {}", stats.requests);
    println!("│ Coalesced:          {}", stats.coalesced);
    println!("│ Deferred:           {}", stats.deferred);
    println!("│ Render calls:       {}", stats.render_calls);
    println!("│ Frames completed:   {}", frames.total());
    println!("│ Forced renders:     {}", stats.forced);
    println!("│ Passes:             {} ({} idle ticks)", stats.passes, loop_stats.idle_ticks);
    println!("│ Timer starts/stops: {}/{}", stats.timer_starts, stats.timer_stops);
    println!("│ Coalescing ratio:   {:.3}", stats.coalescing_ratio());
    for target in frames.targets() {
        println!("│   {:<16} {} frames", target.to_string(), frames.frames(target));
    }
    println!("└──────────────────────────────────────────────────────────────────");

    if let Err(e) = global::shutdown() {
        eprintln!("Shutdown failed: {e}");
    }
}
