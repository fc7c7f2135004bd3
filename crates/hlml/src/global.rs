// SPDX-License-Identifier: AGPL-3.0-only

//! Process-wide facade
//!
//! One lazily created [`Library`] backs the free functions in the crate
//! root. Creating the library object is lazy; initializing it never is.

use crate::config::Config;
use crate::device::DeviceHandle;
use crate::error::Result;
use crate::events::EventSet;
use crate::lifecycle::{Library, LibraryState};
use crate::telemetry::FirmwareVersion;
use std::sync::OnceLock;

static LIBRARY: OnceLock<Library> = OnceLock::new();

/// The process-wide library, created from the environment on first use.
///
/// See [`Library::from_env`] for how invalid variables are reported.
pub fn library() -> &'static Library {
    LIBRARY.get_or_init(Library::from_env)
}

/// Set the configuration used by the next [`initialize`].
pub fn configure(config: Config) {
    library().set_config(config);
}

/// Initialize the process-wide library.
///
/// # Errors
///
/// See [`Library::initialize`].
pub fn initialize() -> Result<()> {
    library().initialize()
}

/// Initialize the process-wide library with native diagnostics.
///
/// # Errors
///
/// See [`Library::initialize_with_diagnostics`].
pub fn initialize_with_diagnostics() -> Result<()> {
    library().initialize_with_diagnostics()
}

/// Shut the process-wide library down.
///
/// # Errors
///
/// See [`Library::shutdown`].
pub fn shutdown() -> Result<()> {
    library().shutdown()
}

/// Lifecycle state of the process-wide library.
pub fn state() -> LibraryState {
    library().state()
}

/// Number of enumerated devices.
///
/// # Errors
///
/// See [`Library::device_count`].
pub fn device_count() -> Result<u32> {
    library().device_count()
}

/// Device at an enumeration index.
///
/// # Errors
///
/// See [`Library::device_handle_by_index`].
pub fn device_handle_by_index(index: u32) -> Result<DeviceHandle> {
    library().device_handle_by_index(index)
}

/// Device with the given UUID.
///
/// # Errors
///
/// See [`Library::device_handle_by_uuid`].
pub fn device_handle_by_uuid(uuid: &str) -> Result<DeviceHandle> {
    library().device_handle_by_uuid(uuid)
}

/// Device with the given serial number.
///
/// # Errors
///
/// See [`Library::device_handle_by_serial`].
pub fn device_handle_by_serial(serial: &str) -> Result<DeviceHandle> {
    library().device_handle_by_serial(serial)
}

/// Firmware versions of the device at `index`.
///
/// # Errors
///
/// See [`Library::fw_version`].
pub fn fw_version(index: u32) -> Result<FirmwareVersion> {
    library().fw_version(index)
}

/// Kernel driver version.
///
/// # Errors
///
/// See [`Library::system_driver_version`].
pub fn system_driver_version() -> Result<String> {
    library().system_driver_version()
}

/// Allocate an event set.
///
/// # Errors
///
/// See [`Library::new_event_set`].
pub fn new_event_set() -> Result<EventSet> {
    library().new_event_set()
}
