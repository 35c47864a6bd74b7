//! # RENDERSYNC Core
//!
//! Coalescing scheduler for render-window updates.
//!
//! Independent callers keep deciding that a view is stale. If each of them
//! rendered on its own, one frame could be drawn N times. Instead they
//! *request* an update, and the coalescer renders every requested target
//! once per pass, at a cadence set by an external timer.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      UpdateCoalescer                          │
//! ├──────────────────────────────────────────────────────────────┤
//! │  TargetRegistry   PendingTable   LevelOfDetail   Observers    │
//! │        │               │               │             ▲        │
//! │        └── request ────┘               │             │        │
//! │                        │               ▼             │        │
//! │   TimerControl ◀── start/stop     RenderSettings ── events    │
//! │        │                               │                      │
//! │        └── tick ──▶ process_pending_updates ──▶ RenderAction  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use rendersync_core::{RenderOutcome, RenderRequest, TargetId, UpdateCoalescer};
//!
//! let mut coalescer = UpdateCoalescer::new(|_: &RenderRequest| RenderOutcome::Completed);
//! let view = TargetId(7);
//!
//! coalescer.request_update(view);
//! coalescer.request_update(view);
//!
//! let report = coalescer.process_pending_updates();
//! assert_eq!(report.completed, vec![view]);
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod coalescer;
pub mod config;
pub mod error;
pub mod events;
pub mod global;
pub mod lod;
pub mod pending;
pub mod render;
pub mod requester;
pub mod stats;
pub mod target;
pub mod timer;

pub use coalescer::{CoalescerBuilder, UpdateCoalescer};
pub use config::{CoalescerConfig, LodConfig};
pub use error::{CoalescerError, CoalescerResult, ConfigurationError, LifecycleError};
pub use events::{ObserverId, RenderEvent, RenderObservers};
pub use global::{CoalescerFactory, GenericFactory, SharedCoalescer};
pub use lod::{LevelOfDetail, ShadingValues, MAX_LOD_LIMIT};
pub use pending::{PendingState, PendingTable, RequestOutcome};
pub use render::{CancelToken, RenderAction, RenderOutcome, RenderRequest, RenderSettings};
pub use requester::{RemoteRequest, UpdateRequester};
pub use stats::{CoalescerStats, PassReport};
pub use target::{
    MapClassifier, RequestType, TargetClass, TargetClassifier, TargetId, TargetRegistry,
    UniformClassifier,
};
pub use timer::{ManualTimer, TimerControl};
