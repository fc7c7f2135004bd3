//! Watch every device for critical and thermal events
//!
//! Runs until interrupted, printing one line per event and a heartbeat
//! every few seconds.

use anyhow::Result;
use hlml::{EventOutcome, EventTypes};
use std::time::Duration;
use tracing::debug;

const HEARTBEAT: Duration = Duration::from_secs(5);

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hlml=info".into()),
        )
        .init();

    hlml::initialize()?;
    let set = hlml::new_event_set()?;

    for index in 0..hlml::device_count()? {
        let dev = hlml::device_handle_by_index(index)?;
        match set.register(&dev, EventTypes::CRITICAL_ERROR | EventTypes::THERMAL_VIOLATION) {
            Ok(()) => println!("Watching device {index} ({})", dev.name()?),
            Err(e) if e.is_unsupported() => println!("Device {index}: events not supported"),
            Err(e) => return Err(e.into()),
        }
    }

    loop {
        match set.wait(Some(HEARTBEAT))? {
            EventOutcome::Event(event) => println!(
                "Device {} ({}): {:?}",
                event.device.index(),
                event.device.pci_bus_id()?,
                event.event_type
            ),
            EventOutcome::TimedOut => debug!("no events"),
        }
    }
}
