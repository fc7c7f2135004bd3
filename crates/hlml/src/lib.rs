// SPDX-License-Identifier: AGPL-3.0-only

//! Telemetry and control access layer for Habana Labs accelerators.
//!
//! Wraps a native hardware-management interface behind a typed, thread-safe
//! API: process-wide initialization, device lookup by index, UUID or serial
//! number, typed telemetry getters, and blocking hardware event waits.
//!
//! # Native interfaces
//!
//! ```text
//! Hardware:
//!   SysfsInterface      habanalabs driver sysfs / hwmon attributes
//!
//! Development and CI:
//!   SimulatedInterface  in-process synthetic fleet, fault/event injection
//! ```
//!
//! `HLML_BACKEND=auto` (the default) uses sysfs when the driver is loaded and
//! fails with `DriverNotLoaded` otherwise.
//!
//! # Quick start
//!
//! ```no_run
//! # fn main() -> hlml::Result<()> {
//! hlml::initialize()?;
//!
//! for index in 0..hlml::device_count()? {
//!     let dev = hlml::device_handle_by_index(index)?;
//!     println!("{} {} {}°C", dev.name()?, dev.uuid()?, dev.temperature_on_chip()?);
//! }
//!
//! hlml::shutdown()?;
//! # Ok(())
//! # }
//! ```
//!
//! # Handle lifetime
//!
//! Device handles and event sets are valid from the `initialize` that
//! produced them until the next `shutdown`. Using one later fails with
//! [`HlmlError::InvalidHandle`] or [`HlmlError::NotInitialized`].

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]

mod config;
mod device;
mod error;
mod events;
mod global;
mod lifecycle;
pub mod native;
mod telemetry;

pub use config::{Config, DEFAULT_EVENT_POLL_INTERVAL, DEFAULT_SIMULATED_DEVICES};
pub use device::DeviceHandle;
pub use error::{HlmlError, Result};
pub use events::{EventData, EventOutcome, EventSet, EventTypes};
pub use global::{
    configure, device_count, device_handle_by_index, device_handle_by_serial,
    device_handle_by_uuid, fw_version, initialize, initialize_with_diagnostics, library,
    new_event_set, shutdown, state, system_driver_version,
};
pub use lifecycle::{Library, LibraryState};
pub use native::{NativeStatus, SimulatedDevice, SimulatedInterface, SysfsInterface};
pub use telemetry::{
    EccErrorType, EccMode, EccState, FirmwareVersion, MacAddress, MemoryInfo,
    RowReplacementCause, Temperature, TemperatureThreshold,
};

/// Silicon model types (re-exported from hlml-chip).
pub use hlml_chip::clock::ClockDomain;
pub use hlml_chip::pcie::ChipVariant;
pub use hlml_chip::status::DeviceStatus;

/// Commonly used types.
pub mod prelude {
    pub use crate::{
        ClockDomain, Config, DeviceHandle, EventOutcome, EventSet, EventTypes, HlmlError,
        Library, Result, TemperatureThreshold,
    };
}
