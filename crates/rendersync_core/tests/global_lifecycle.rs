//! Lifecycle of the process-wide coalescer.
//!
//! The global slot is shared by the whole test binary and can only be torn
//! down once, so the full sequence runs in a single test.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use rendersync_core::global;
use rendersync_core::{
    CoalescerError, CoalescerFactory, CoalescerResult, GenericFactory, LifecycleError,
    ManualTimer, RenderOutcome, RenderRequest, TargetId, UpdateCoalescer,
};

struct CountingFactory {
    created: Arc<AtomicUsize>,
    timer: Arc<ManualTimer>,
}

impl CoalescerFactory for CountingFactory {
    fn create_instance(&self) -> CoalescerResult<UpdateCoalescer> {
        self.created.fetch_add(1, Ordering::SeqCst);
        let coalescer = UpdateCoalescer::builder(|_: &RenderRequest| RenderOutcome::Completed)
            .timer(Arc::clone(&self.timer))
            .build()?;
        Ok(coalescer)
    }

    fn name(&self) -> &str {
        "counting"
    }
}

#[test]
fn test_global_lifecycle() {
    let created = Arc::new(AtomicUsize::new(0));
    let timer = Arc::new(ManualTimer::new());

    assert!(!global::is_instantiated());
    assert!(!global::has_factory());
    assert!(matches!(
        global::shutdown(),
        Err(CoalescerError::Lifecycle(LifecycleError::NotInstantiated))
    ));

    // Factory set before first use takes effect.
    assert!(global::set_factory(Box::new(CountingFactory {
        created: Arc::clone(&created),
        timer: Arc::clone(&timer),
    })));
    assert_eq!(global::factory_name().as_deref(), Some("counting"));

    let first = global::instance().unwrap();
    let second = global::instance().unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(created.load(Ordering::SeqCst), 1);

    // Late factory is stored but the instance stays.
    assert!(!global::set_factory(Box::new(GenericFactory::default())));
    assert_eq!(global::factory_name().as_deref(), Some("generic"));
    assert!(Arc::ptr_eq(&first, &global::instance().unwrap()));
    assert!(matches!(
        global::init(Box::new(GenericFactory::default())),
        Err(CoalescerError::Lifecycle(LifecycleError::AlreadyInstantiated))
    ));

    // The shared instance schedules like any other.
    first.lock().request_update(TargetId(9));
    assert!(timer.is_running());

    global::shutdown().unwrap();
    assert!(!global::is_instantiated());
    assert!(!timer.is_running());
    assert!(!first.lock().is_update_pending());

    assert!(matches!(
        global::instance(),
        Err(CoalescerError::Lifecycle(LifecycleError::TornDown))
    ));
    assert!(matches!(
        global::init(Box::new(GenericFactory::default())),
        Err(CoalescerError::Lifecycle(LifecycleError::TornDown))
    ));
    assert!(matches!(
        global::shutdown(),
        Err(CoalescerError::Lifecycle(LifecycleError::TornDown))
    ));
}
