//! Enumerate all Habana devices on the system
//!
//! Uses `HLML_BACKEND` to pick the native interface; run with
//! `HLML_BACKEND=simulated` on a machine without accelerators.

use anyhow::Result;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hlml=info".into()),
        )
        .init();

    println!("HLML Device Enumeration\n");

    hlml::initialize()?;
    let count = hlml::device_count()?;
    println!("Found {count} device(s):\n");

    for index in 0..count {
        let dev = hlml::device_handle_by_index(index)?;
        println!("Device {index}:");
        println!("   Name:       {}", dev.name()?);
        println!("   UUID:       {}", dev.uuid()?);
        println!("   Serial:     {}", dev.serial_number()?);
        println!("   Minor:      {}", dev.minor_number()?);
        println!("   PCI:        {}", dev.pci_bus_id()?);
        println!();
    }

    println!("Driver: {}", hlml::system_driver_version()?);
    hlml::shutdown()?;
    Ok(())
}
