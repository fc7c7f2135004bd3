//! Integration tests for the library lifecycle
//!
//! Every test owns its own `Library` over a simulated fleet, so they run in
//! parallel without touching the process-wide facade.

use hlml::{HlmlError, Library, LibraryState, NativeStatus, SimulatedInterface};
use std::sync::Arc;

fn simulated(devices: u32) -> (Library, SimulatedInterface) {
    let sim = SimulatedInterface::new(devices);
    (Library::with_interface(Arc::new(sim.clone())), sim)
}

#[test]
fn test_device_count_requires_initialize() {
    let (lib, _sim) = simulated(4);

    assert_eq!(lib.device_count(), Err(HlmlError::NotInitialized));

    lib.initialize().expect("initialize");
    assert_eq!(lib.device_count().expect("device count"), 4);
    lib.shutdown().expect("shutdown");

    assert_eq!(lib.device_count(), Err(HlmlError::NotInitialized));
}

#[test]
fn test_double_initialize_rejected() {
    let (lib, _sim) = simulated(2);
    lib.initialize().expect("initialize");

    assert_eq!(lib.initialize(), Err(HlmlError::AlreadyInitialized));
    assert_eq!(lib.state(), LibraryState::Initialized);
    assert_eq!(lib.device_count().expect("count still valid"), 2);

    lib.shutdown().expect("shutdown");
}

#[test]
fn test_shutdown_without_initialize() {
    let (lib, _sim) = simulated(1);
    assert_eq!(lib.shutdown(), Err(HlmlError::NotInitialized));

    lib.initialize().expect("initialize");
    lib.shutdown().expect("shutdown");
    assert_eq!(lib.shutdown(), Err(HlmlError::NotInitialized));
}

#[test]
fn test_full_cycle_twice() {
    let (lib, _sim) = simulated(8);

    for _ in 0..2 {
        lib.initialize().expect("initialize");
        assert!(lib.device_count().expect("count") >= 1);
        let dev = lib.device_handle_by_index(0).expect("handle 0");
        assert_eq!(dev.minor_number().expect("minor"), 0);
        lib.shutdown().expect("shutdown");
    }
}

#[test]
fn test_empty_fleet_initializes() {
    let (lib, _sim) = simulated(0);
    lib.initialize().expect("initialize");
    assert_eq!(lib.device_count().expect("count"), 0);
    assert!(lib.device_handle_by_index(0).unwrap_err().is_invalid_argument());
    lib.shutdown().expect("shutdown");
}

#[test]
fn test_native_shutdown_failure_still_uninitializes() {
    let (lib, sim) = simulated(1);
    lib.initialize().expect("initialize");

    sim.fail_next_call(NativeStatus::AipIsLost);
    assert_eq!(lib.shutdown(), Err(HlmlError::native(NativeStatus::AipIsLost)));
    assert_eq!(lib.state(), LibraryState::Uninitialized);
}

#[test]
fn test_driver_version_and_firmware() {
    let (lib, sim) = simulated(2);
    lib.initialize().expect("initialize");

    assert!(!lib.system_driver_version().expect("driver version").is_empty());
    let fw = lib.fw_version(0).expect("firmware");
    assert!(!fw.kernel.is_empty());
    assert!(!fw.uboot.is_empty());

    sim.set_driver_version(None);
    assert!(lib.system_driver_version().unwrap_err().is_unsupported());

    lib.shutdown().expect("shutdown");
}

#[test]
fn test_simulated_config_selects_simulated_interface() {
    let lib = Library::new(hlml::Config::simulated(3));
    lib.initialize().expect("initialize");
    assert_eq!(lib.device_count().expect("count"), 3);
    lib.shutdown().expect("shutdown");
}
