//! # Process-Wide Coalescer
//!
//! Hosts that cannot pass a coalescer around explicitly share one instance
//! through this module. The instance is built by a [`CoalescerFactory`],
//! which is how a platform picks its timer.
//!
//! ## Lifecycle
//!
//! ```text
//!   set_factory (optional, before first use)
//!        │
//!        ▼
//!   init / instance  ──▶  instance  ──▶  shutdown  ──▶  TornDown forever
//! ```
//!
//! - `instance()` creates the coalescer lazily, with the generic factory if
//!   none was set.
//! - `set_factory()` after instantiation is stored but changes nothing
//!   about the existing instance.
//! - After `shutdown()` every access fails with [`LifecycleError::TornDown`].
//!
//! Factories run while the global slot is locked and must not call back
//! into this module.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::coalescer::UpdateCoalescer;
use crate::config::CoalescerConfig;
use crate::error::{CoalescerResult, LifecycleError};
use crate::render::{RenderOutcome, RenderRequest};

/// The shared instance.
pub type SharedCoalescer = Arc<Mutex<UpdateCoalescer>>;

/// Builds the platform-specific coalescer.
pub trait CoalescerFactory: Send {
    /// Creates the coalescer.
    ///
    /// # Errors
    ///
    /// Whatever the factory's configuration rejects.
    fn create_instance(&self) -> CoalescerResult<UpdateCoalescer>;

    /// Name used in logs.
    fn name(&self) -> &str {
        "custom"
    }
}

/// Factory for headless hosts and tests: a [`ManualTimer`](crate::ManualTimer)
/// and a render action that completes immediately.
#[derive(Debug, Clone, Default)]
pub struct GenericFactory {
    config: CoalescerConfig,
}

impl GenericFactory {
    /// Creates the factory with `config`.
    #[must_use]
    pub fn new(config: CoalescerConfig) -> Self {
        Self { config }
    }
}

impl CoalescerFactory for GenericFactory {
    fn create_instance(&self) -> CoalescerResult<UpdateCoalescer> {
        let coalescer = UpdateCoalescer::builder(|_: &RenderRequest| RenderOutcome::Completed)
            .config(self.config.clone())
            .build()?;
        Ok(coalescer)
    }

    fn name(&self) -> &str {
        "generic"
    }
}

struct GlobalSlot {
    factory: Option<Box<dyn CoalescerFactory>>,
    instance: Option<SharedCoalescer>,
    torn_down: bool,
}

static SLOT: Mutex<GlobalSlot> = parking_lot::const_mutex(GlobalSlot {
    factory: None,
    instance: None,
    torn_down: false,
});

/// Sets the factory used for the first instantiation.
///
/// Returns true if it will take effect, false if an instance already exists
/// (or existed) and the factory is only stored.
pub fn set_factory(factory: Box<dyn CoalescerFactory>) -> bool {
    let mut slot = SLOT.lock();
    let effective = slot.instance.is_none() && !slot.torn_down;
    if effective {
        tracing::info!("coalescer factory set to '{}'", factory.name());
    } else {
        tracing::debug!(
            "coalescer factory '{}' set after instantiation, existing instance unchanged",
            factory.name()
        );
    }
    slot.factory = Some(factory);
    effective
}

/// Returns true if a factory was set.
#[must_use]
pub fn has_factory() -> bool {
    SLOT.lock().factory.is_some()
}

/// Name of the configured factory.
#[must_use]
pub fn factory_name() -> Option<String> {
    SLOT.lock().factory.as_ref().map(|f| f.name().to_owned())
}

/// Returns true if the instance exists.
#[must_use]
pub fn is_instantiated() -> bool {
    SLOT.lock().instance.is_some()
}

/// Eagerly creates the instance with `factory`.
///
/// # Errors
///
/// [`LifecycleError::AlreadyInstantiated`] if an instance exists,
/// [`LifecycleError::TornDown`] after shutdown, or the factory's error.
pub fn init(factory: Box<dyn CoalescerFactory>) -> CoalescerResult<SharedCoalescer> {
    let mut slot = SLOT.lock();
    if slot.torn_down {
        return Err(LifecycleError::TornDown.into());
    }
    if slot.instance.is_some() {
        return Err(LifecycleError::AlreadyInstantiated.into());
    }
    let instance = Arc::new(Mutex::new(factory.create_instance()?));
    tracing::info!("coalescer instantiated by '{}'", factory.name());
    slot.factory = Some(factory);
    slot.instance = Some(Arc::clone(&instance));
    Ok(instance)
}

/// Returns the instance, creating it on first access.
///
/// # Errors
///
/// [`LifecycleError::TornDown`] after shutdown, or the factory's error.
pub fn instance() -> CoalescerResult<SharedCoalescer> {
    let mut slot = SLOT.lock();
    if slot.torn_down {
        return Err(LifecycleError::TornDown.into());
    }
    if let Some(instance) = &slot.instance {
        return Ok(Arc::clone(instance));
    }
    let created = match &slot.factory {
        Some(factory) => {
            tracing::info!("coalescer instantiated by '{}'", factory.name());
            factory.create_instance()?
        }
        None => {
            tracing::info!("coalescer instantiated by generic factory");
            GenericFactory::default().create_instance()?
        }
    };
    let instance = Arc::new(Mutex::new(created));
    slot.instance = Some(Arc::clone(&instance));
    Ok(instance)
}

/// Halts and releases the instance. The slot stays torn down.
///
/// Handles cloned earlier keep the coalescer alive but it no longer renders
/// anything pending at shutdown.
///
/// # Errors
///
/// [`LifecycleError::TornDown`] if already shut down,
/// [`LifecycleError::NotInstantiated`] if there is nothing to shut down.
pub fn shutdown() -> CoalescerResult<()> {
    let mut slot = SLOT.lock();
    if slot.torn_down {
        return Err(LifecycleError::TornDown.into());
    }
    let instance = slot.instance.take().ok_or(LifecycleError::NotInstantiated)?;
    slot.torn_down = true;
    drop(slot);

    instance.lock().halt();
    tracing::info!("coalescer shut down");
    Ok(())
}
