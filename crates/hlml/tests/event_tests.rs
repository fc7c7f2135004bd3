//! Integration tests for event sets

use hlml::{
    EventOutcome, EventTypes, HlmlError, Library, SimulatedDevice, SimulatedInterface,
};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn initialized(devices: u32) -> (Arc<Library>, SimulatedInterface) {
    let sim = SimulatedInterface::new(devices);
    let lib = Library::with_interface(Arc::new(sim.clone()));
    lib.initialize().expect("initialize");
    (Arc::new(lib), sim)
}

#[test]
fn test_create_and_delete_without_registration() {
    let (lib, sim) = initialized(1);
    let set = lib.new_event_set().expect("event set");
    set.delete().expect("delete");
    assert_eq!(sim.open_event_sets(), 0);
}

#[test]
fn test_new_event_set_requires_initialize() {
    let lib = Library::with_interface(Arc::new(SimulatedInterface::new(1)));
    assert!(matches!(lib.new_event_set(), Err(HlmlError::NotInitialized)));
}

#[test]
fn test_thermal_registration_short_wait_times_out() {
    let (lib, _sim) = initialized(2);
    let set = lib.new_event_set().expect("event set");
    let dev = lib.device_handle_by_index(0).expect("handle");
    set.register(&dev, EventTypes::THERMAL_VIOLATION).expect("register");

    let start = Instant::now();
    let outcome = set.wait(Some(Duration::from_millis(30))).expect("wait");
    assert_eq!(outcome, EventOutcome::TimedOut);
    assert!(start.elapsed() >= Duration::from_millis(30));

    set.delete().expect("delete");
}

#[test]
fn test_injected_event_delivered_with_device() {
    let (lib, sim) = initialized(4);
    let set = lib.new_event_set().expect("event set");
    for index in 0..4 {
        let dev = lib.device_handle_by_index(index).expect("handle");
        set.register(&dev, EventTypes::CRITICAL_ERROR | EventTypes::ECC_ERROR)
            .expect("register");
    }

    assert_eq!(sim.inject_event(2, EventTypes::ECC_ERROR), 1);

    let data = set
        .wait(Some(Duration::from_secs(1)))
        .expect("wait")
        .event()
        .expect("event");
    assert_eq!(data.event_type, EventTypes::ECC_ERROR);
    assert_eq!(data.device, lib.device_handle_by_index(2).expect("handle"));
    assert_eq!(data.device.index(), 2);
}

#[test]
fn test_event_from_waiting_thread() {
    let (lib, sim) = initialized(1);
    let set = lib.new_event_set().expect("event set");
    let dev = lib.device_handle_by_index(0).expect("handle");
    set.register(&dev, EventTypes::POWER).expect("register");

    let waiter = thread::spawn(move || set.wait(Some(Duration::from_secs(5))));
    thread::sleep(Duration::from_millis(50));
    sim.inject_event(0, EventTypes::POWER);

    let outcome = waiter.join().expect("join").expect("wait");
    assert!(!outcome.is_timed_out());
}

#[test]
fn test_unregistered_classes_not_delivered() {
    let (lib, sim) = initialized(1);
    let set = lib.new_event_set().expect("event set");
    let dev = lib.device_handle_by_index(0).expect("handle");
    set.register(&dev, EventTypes::THERMAL_VIOLATION).expect("register");

    assert_eq!(sim.inject_event(0, EventTypes::LINK_STATE), 0);
    assert!(set.wait(Some(Duration::ZERO)).expect("wait").is_timed_out());
}

#[test]
fn test_shutdown_wakes_infinite_wait() {
    let (lib, _sim) = initialized(1);
    let set = lib.new_event_set().expect("event set");
    let dev = lib.device_handle_by_index(0).expect("handle");
    set.register(&dev, EventTypes::CRITICAL_ERROR).expect("register");

    let waiter = thread::spawn(move || set.wait(None));
    thread::sleep(Duration::from_millis(50));
    lib.shutdown().expect("shutdown");

    assert_eq!(waiter.join().expect("join"), Err(HlmlError::NotInitialized));
}

#[test]
fn test_stale_set_after_reinitialize() {
    let (lib, sim) = initialized(1);
    let set = lib.new_event_set().expect("event set");
    lib.shutdown().expect("shutdown");
    assert_eq!(sim.open_event_sets(), 0);

    lib.initialize().expect("re-initialize");
    assert_eq!(set.wait(Some(Duration::ZERO)), Err(HlmlError::InvalidHandle));

    let dev = lib.device_handle_by_index(0).expect("handle");
    assert_eq!(
        set.register(&dev, EventTypes::POWER),
        Err(HlmlError::InvalidHandle)
    );
    assert_eq!(set.delete(), Err(HlmlError::InvalidHandle));
}

#[test]
fn test_register_rejects_foreign_and_stale_handles() {
    let (a, _sa) = initialized(1);
    let (b, _sb) = initialized(1);
    let set = a.new_event_set().expect("event set");

    let foreign = b.device_handle_by_index(0).expect("handle");
    assert_eq!(
        set.register(&foreign, EventTypes::POWER),
        Err(HlmlError::InvalidHandle)
    );
}

#[test]
fn test_unobservable_classes_unsupported() {
    let sim = SimulatedInterface::with_devices(vec![
        SimulatedDevice::gaudi2(0).with_observable_events(EventTypes::CRITICAL_ERROR)
    ]);
    let lib = Library::with_interface(Arc::new(sim));
    lib.initialize().expect("initialize");

    let set = lib.new_event_set().expect("event set");
    let dev = lib.device_handle_by_index(0).expect("handle");
    assert!(set
        .register(&dev, EventTypes::THERMAL_VIOLATION)
        .unwrap_err()
        .is_unsupported());
    assert!(set
        .register(&dev, EventTypes::THERMAL_VIOLATION | EventTypes::CRITICAL_ERROR)
        .is_ok());
}

#[test]
fn test_delete_leaves_handles_valid() {
    let (lib, _sim) = initialized(1);
    let set = lib.new_event_set().expect("event set");
    let dev = lib.device_handle_by_index(0).expect("handle");
    set.register(&dev, EventTypes::POWER).expect("register");
    set.delete().expect("delete");

    assert!(dev.power_usage().is_ok());
}
