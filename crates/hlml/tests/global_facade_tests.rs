//! Integration tests for the process-wide facade
//!
//! These share one process-wide library, so they run serially and each
//! starts from a shut-down state.

use hlml::{Config, EventTypes, HlmlError, LibraryState};
use serial_test::serial;
use std::time::Duration;

fn reset(devices: u32) {
    let _ = hlml::shutdown();
    hlml::configure(Config::simulated(devices));
}

#[test]
#[serial]
fn test_count_before_and_after_initialize() {
    reset(8);

    assert_eq!(hlml::device_count(), Err(HlmlError::NotInitialized));
    hlml::initialize().expect("initialize");
    assert!(hlml::device_count().expect("count") > 0);
    hlml::shutdown().expect("shutdown");
}

#[test]
#[serial]
fn test_double_initialize() {
    reset(2);

    hlml::initialize().expect("initialize");
    assert_eq!(hlml::initialize(), Err(HlmlError::AlreadyInitialized));
    assert_eq!(hlml::device_count().expect("count"), 2);
    hlml::shutdown().expect("shutdown");
}

#[test]
#[serial]
fn test_shutdown_without_initialize() {
    reset(1);
    assert_eq!(hlml::shutdown(), Err(HlmlError::NotInitialized));
    assert_eq!(hlml::state(), LibraryState::Uninitialized);
}

#[test]
#[serial]
fn test_cycle_twice_in_one_process() {
    reset(4);

    for _ in 0..2 {
        hlml::initialize().expect("initialize");
        assert!(hlml::device_count().expect("count") >= 1);
        let dev = hlml::device_handle_by_index(0).expect("handle");
        assert_eq!(dev.minor_number().expect("minor"), 0);
        hlml::shutdown().expect("shutdown");
    }
}

#[test]
#[serial]
fn test_lookups_and_versions() {
    reset(3);
    hlml::initialize_with_diagnostics().expect("initialize");

    let dev = hlml::device_handle_by_index(1).expect("handle");
    let uuid = dev.uuid().expect("uuid");
    let serial = dev.serial_number().expect("serial");
    assert_eq!(hlml::device_handle_by_uuid(&uuid).expect("uuid"), dev);
    assert_eq!(hlml::device_handle_by_serial(&serial).expect("serial"), dev);

    assert!(hlml::fw_version(0).is_ok());
    assert!(!hlml::system_driver_version().expect("driver").is_empty());

    hlml::shutdown().expect("shutdown");
}

#[test]
#[serial]
fn test_event_set_through_facade() {
    reset(1);
    hlml::initialize().expect("initialize");

    let set = hlml::new_event_set().expect("event set");
    let dev = hlml::device_handle_by_index(0).expect("handle");
    set.register(&dev, EventTypes::THERMAL_VIOLATION).expect("register");
    assert!(set
        .wait(Some(Duration::from_millis(20)))
        .expect("wait")
        .is_timed_out());
    set.delete().expect("delete");

    hlml::shutdown().expect("shutdown");
}
