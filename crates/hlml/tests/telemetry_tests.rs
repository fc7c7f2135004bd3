//! Integration tests for the telemetry getters over a simulated fleet

use hlml::native::{Counter, TextField};
use hlml::{
    ClockDomain, EccErrorType, EccState, HlmlError, Library, MemoryInfo, NativeStatus,
    RowReplacementCause, SimulatedDevice, SimulatedInterface, TemperatureThreshold,
};
use std::sync::Arc;

fn initialized(sim: SimulatedInterface) -> Library {
    let lib = Library::with_interface(Arc::new(sim));
    lib.initialize().expect("initialize");
    lib
}

#[test]
fn test_memory_used_plus_free_is_total() {
    let sim = SimulatedInterface::new(8);
    let lib = initialized(sim.clone());
    sim.set_memory_used(3, 12 << 30);

    for index in 0..lib.device_count().expect("count") {
        let mem = lib
            .device_handle_by_index(index)
            .expect("handle")
            .memory_info()
            .expect("memory");
        assert_eq!(mem.used + mem.free, mem.total, "device {index}");
    }
}

#[test]
fn test_inconsistent_memory_is_native_failure() {
    let sim = SimulatedInterface::with_devices(vec![SimulatedDevice::gaudi2(0).with_memory(
        MemoryInfo {
            total: 100,
            used: 60,
            free: 60,
        },
    )]);
    let lib = initialized(sim);
    let dev = lib.device_handle_by_index(0).expect("handle");
    assert_eq!(
        dev.memory_info(),
        Err(HlmlError::native(NativeStatus::Unknown))
    );
}

#[test]
fn test_unsupported_metric_is_not_zero() {
    let sim = SimulatedInterface::with_devices(vec![SimulatedDevice::gaudi2(0)
        .without_counter(Counter::PowerUsage)
        .without_text(TextField::PcbVersion)
        .without_memory()
        .without_mac_addresses()]);
    let lib = initialized(sim);
    let dev = lib.device_handle_by_index(0).expect("handle");

    assert_eq!(
        dev.power_usage(),
        Err(HlmlError::Unsupported {
            metric: "power usage"
        })
    );
    assert!(dev.pcb_version().unwrap_err().is_unsupported());
    assert!(dev.memory_info().unwrap_err().is_unsupported());
    assert!(dev.mac_address_info().unwrap_err().is_unsupported());
    assert!(dev.temperature_on_chip().is_ok());
}

#[test]
fn test_values_passed_through_unscaled() {
    let sim = SimulatedInterface::new(1);
    let lib = initialized(sim.clone());
    let dev = lib.device_handle_by_index(0).expect("handle");

    sim.set_counter(0, Counter::PowerUsage, 123_456);
    sim.set_counter(0, Counter::TemperatureOnChip, 71);
    sim.set_counter(0, Counter::TemperatureOnBoard, 44);
    sim.set_counter(0, Counter::Clock(ClockDomain::Mme), 1450);
    sim.set_counter(0, Counter::EccAggregate(EccErrorType::Corrected), 7);
    sim.set_counter(0, Counter::ReplacedRows(RowReplacementCause::DoubleBitEcc), 2);
    sim.set_counter(0, Counter::ReplacedRowsPending, 1);
    sim.set_counter(0, Counter::PcieReplayCounter, 9);

    assert_eq!(dev.power_usage().expect("power"), 123_456);
    let temp = dev.temperature().expect("temperature");
    assert_eq!((temp.on_chip, temp.on_board), (71, 44));
    assert_eq!(dev.clock_info(ClockDomain::Mme).expect("clock"), 1450);
    assert_eq!(dev.ecc_aggregate_errors(EccErrorType::Corrected).expect("ecc"), 7);
    assert_eq!(
        dev.replaced_rows(RowReplacementCause::DoubleBitEcc).expect("rows"),
        2
    );
    assert!(dev.replaced_rows_pending().expect("pending"));
    assert_eq!(dev.pcie_replay_counter().expect("replay"), 9);
}

#[test]
fn test_default_gaudi2_readings() {
    let lib = initialized(SimulatedInterface::new(1));
    let dev = lib.device_handle_by_index(0).expect("handle");

    assert!(dev.soc_clock_info().expect("soc clock") <= dev.soc_clock_max().expect("soc max"));
    assert_eq!(dev.pcie_link_generation().expect("gen"), 5);
    assert_eq!(dev.pcie_link_width().expect("width"), 16);
    assert_eq!(dev.pci_id().expect("pci id") & 0xffff, 0x1da3);
    assert_eq!(dev.mac_address_info().expect("macs").len(), 24);
    assert_eq!(dev.ecc_mode().expect("ecc").current, EccState::Enabled);
    assert!(
        dev.temperature_threshold(TemperatureThreshold::Slowdown).expect("slowdown")
            < dev.temperature_threshold(TemperatureThreshold::Shutdown).expect("shutdown")
    );
    assert!(dev.pci_bus_id().expect("bus id").starts_with("0000:"));
    assert!(dev.power_management_default_limit().expect("limit") > 0);
    assert_eq!(dev.utilization_info().expect("utilization"), 0);
}

#[test]
fn test_energy_counter_never_decreases() {
    let lib = initialized(SimulatedInterface::new(1));
    let dev = lib.device_handle_by_index(0).expect("handle");

    let mut last = dev.energy_consumption_counter().expect("energy");
    for _ in 0..5 {
        let now = dev.energy_consumption_counter().expect("energy");
        assert!(now >= last);
        last = now;
    }
}

#[test]
fn test_oversized_value_is_native_failure() {
    let sim = SimulatedInterface::new(1);
    let lib = initialized(sim.clone());
    let dev = lib.device_handle_by_index(0).expect("handle");

    sim.set_counter(0, Counter::TemperatureOnChip, u64::from(u32::MAX) + 1);
    assert_eq!(
        dev.temperature_on_chip(),
        Err(HlmlError::native(NativeStatus::Unknown))
    );
}

#[test]
fn test_native_failures_translated_per_call() {
    let sim = SimulatedInterface::new(1);
    let lib = initialized(sim.clone());
    let dev = lib.device_handle_by_index(0).expect("handle");

    sim.fail_next_call(NativeStatus::AipIsLost);
    assert_eq!(
        dev.pcie_tx(),
        Err(HlmlError::native(NativeStatus::AipIsLost))
    );
    // No retry state carried over
    assert!(dev.pcie_tx().is_ok());

    sim.fail_next_call(NativeStatus::NoPermission);
    assert_eq!(
        dev.pci_link_speed(),
        Err(HlmlError::native(NativeStatus::NoPermission))
    );
}

#[test]
fn test_getters_after_shutdown() {
    let lib = initialized(SimulatedInterface::new(1));
    let dev = lib.device_handle_by_index(0).expect("handle");
    lib.shutdown().expect("shutdown");

    assert_eq!(dev.power_usage(), Err(HlmlError::NotInitialized));
    assert_eq!(dev.memory_info(), Err(HlmlError::NotInitialized));
}
