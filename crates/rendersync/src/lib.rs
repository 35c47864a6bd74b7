//! # RENDERSYNC
//!
//! Runs an [`UpdateCoalescer`](rendersync_core::UpdateCoalescer) inside a
//! program: a background [`ThreadTimer`] posts ticks, a [`HostLoop`] on the
//! control thread turns them into processing passes, and any thread can
//! request renders through a [`HostHandle`].
//!
//! ## Example
//!
//! ```rust
//! use rendersync::{HostLoop, SimulatedRenderer};
//! use rendersync_core::{CoalescerConfig, TargetId};
//! use std::time::Duration;
//!
//! let renderer = SimulatedRenderer::new(1);
//! let frames = renderer.frame_counter();
//! let mut host = HostLoop::new(renderer, CoalescerConfig::default()).unwrap();
//!
//! let handle = host.handle();
//! for _ in 0..10 {
//!     handle.request_update(TargetId(1)).unwrap();
//! }
//! host.pump();
//! host.run_for(Duration::from_millis(200));
//!
//! assert_eq!(frames.frames(TargetId(1)), 1);
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod factory;
pub mod host_loop;
pub mod simulated;
pub mod timer;

pub use error::{HostError, HostResult};
pub use factory::ThreadTimerFactory;
pub use host_loop::{HostEvent, HostHandle, HostLoop, LoopStats};
pub use simulated::{FrameCounter, SimulatedRenderer};
pub use timer::{ThreadTimer, TickGate};
