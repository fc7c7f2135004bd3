//! Query every telemetry field of one device
//!
//! Usage: `device_info [INDEX]`. Unsupported metrics are shown as such
//! rather than aborting the report.

use anyhow::{Context, Result};
use hlml::{ClockDomain, DeviceHandle, EccErrorType, HlmlError, TemperatureThreshold};
use std::fmt::Display;

fn show<T: Display>(label: &str, value: Result<T, HlmlError>) {
    match value {
        Ok(v) => println!("  {label:<28} {v}"),
        Err(e) if e.is_unsupported() => println!("  {label:<28} (not supported)"),
        Err(e) => println!("  {label:<28} error: {e}"),
    }
}

fn report(dev: &DeviceHandle) {
    println!("Identity");
    show("Name", dev.name());
    show("UUID", dev.uuid());
    show("Serial", dev.serial_number());
    show("Board id", dev.board_id());
    show("HL revision", dev.hl_revision());
    show("PCB version", dev.pcb_version());
    show("PCB assembly", dev.pcb_assembly_version());

    println!("\nPCIe");
    show("Bus id", dev.pci_bus_id());
    show("PCI id", dev.pci_id().map(|id| format!("{id:#010x}")));
    show("Link speed", dev.pci_link_speed());
    show("Link generation", dev.pcie_link_generation());
    show("Link width", dev.pcie_link_width());
    show("TX (KB/s)", dev.pcie_tx());
    show("RX (KB/s)", dev.pcie_rx());
    show("Replay counter", dev.pcie_replay_counter());

    println!("\nPower & Thermal");
    show("Power (mW)", dev.power_usage());
    show("Default limit (mW)", dev.power_management_default_limit());
    show("Energy (mJ)", dev.energy_consumption_counter());
    show("On-chip (°C)", dev.temperature_on_chip());
    show("On-board (°C)", dev.temperature_on_board());
    for kind in [TemperatureThreshold::Slowdown, TemperatureThreshold::Shutdown] {
        show(&format!("{kind:?} threshold (°C)"), dev.temperature_threshold(kind));
    }

    println!("\nClocks (MHz)");
    for domain in ClockDomain::ALL {
        show(
            &format!("{domain} current / max"),
            dev.clock_info(domain)
                .and_then(|cur| Ok(format!("{cur} / {}", dev.max_clock_info(domain)?))),
        );
    }

    println!("\nMemory & ECC");
    show(
        "Memory used / total",
        dev.memory_info().map(|m| format!("{} / {} bytes", m.used, m.total)),
    );
    show("Utilization (%)", dev.utilization_info());
    show("ECC mode", dev.ecc_mode().map(|m| format!("{:?}", m.current)));
    show(
        "ECC uncorrected (aggregate)",
        dev.ecc_aggregate_errors(EccErrorType::Uncorrected),
    );
    show("Rows pending replacement", dev.replaced_rows_pending());
    show(
        "NIC ports",
        dev.mac_address_info().map(|macs| macs.len()),
    );
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hlml=warn".into()),
        )
        .init();

    let index: u32 = std::env::args()
        .nth(1)
        .map(|arg| arg.parse())
        .transpose()
        .context("INDEX must be a device index")?
        .unwrap_or(0);

    hlml::initialize()?;
    let dev = hlml::device_handle_by_index(index)?;
    println!("Device {index}\n");
    report(&dev);

    let fw = hlml::fw_version(index)?;
    println!("\nFirmware\n  kernel {}\n  u-boot {}", fw.kernel, fw.uboot);

    hlml::shutdown()?;
    Ok(())
}
