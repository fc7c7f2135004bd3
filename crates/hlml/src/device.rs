// SPDX-License-Identifier: AGPL-3.0-only

//! Device registry and handles
//!
//! Devices are enumerated once per initialize cycle. Lookups by index, UUID
//! or serial number all resolve against that cached list and hand out
//! [`DeviceHandle`]s bound to the current epoch.

use crate::error::{HlmlError, Result};
use crate::lifecycle::{EnumeratedDevice, Epoch, Library, Shared};
use crate::native::{Counter, NativeInterface, NativeResult, RawDevice, TextField};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Opaque reference to one enumerated device.
///
/// Cheap to clone and safe to send to other threads. Valid until the
/// library that produced it is shut down; afterwards every query fails with
/// `InvalidHandle` (after re-initialization) or `NotInitialized`.
#[derive(Clone)]
pub struct DeviceHandle {
    pub(crate) shared: Arc<Shared>,
    pub(crate) epoch: Epoch,
    pub(crate) index: u32,
    pub(crate) raw: RawDevice,
}

impl DeviceHandle {
    pub(crate) fn from_enumerated(shared: &Arc<Shared>, epoch: Epoch, device: &EnumeratedDevice) -> Self {
        Self {
            shared: Arc::clone(shared),
            epoch,
            index: device.index,
            raw: device.raw,
        }
    }

    /// Enumeration index this handle was created for.
    pub const fn index(&self) -> u32 {
        self.index
    }

    /// Run one native call against this device under the library lock.
    ///
    /// Validates the epoch first and translates the native status, naming
    /// `metric` in `Unsupported` errors.
    pub(crate) fn query<T>(
        &self,
        metric: &'static str,
        call: impl FnOnce(&dyn NativeInterface, RawDevice) -> NativeResult<T>,
    ) -> Result<T> {
        let mut core = self.shared.lock();
        let session = core.session_for(self.epoch)?;
        call(session.native.as_ref(), self.raw).map_err(|status| {
            trace!("device {}: {metric} failed: {status}", self.index);
            status.into_error(metric)
        })
    }

    pub(crate) fn counter(&self, counter: Counter) -> Result<u64> {
        self.query(counter.metric(), |native, raw| native.read_counter(raw, counter))
    }

    /// Read a counter that must fit in `u32`. A value that does not fit is
    /// reported as `NativeFailure(Unknown)` rather than truncated.
    pub(crate) fn counter_u32(&self, counter: Counter) -> Result<u32> {
        let value = self.counter(counter)?;
        narrow(value, counter.metric())
    }

    pub(crate) fn text(&self, field: TextField) -> Result<String> {
        self.query(field.metric(), |native, raw| native.read_text(raw, field))
    }

    /// Device minor number.
    ///
    /// # Errors
    ///
    /// Stale handle, `NotInitialized`, or a translated native failure.
    pub fn minor_number(&self) -> Result<u32> {
        self.counter_u32(Counter::MinorNumber)
    }

    /// Device UUID.
    ///
    /// # Errors
    ///
    /// Stale handle, `NotInitialized`, or a translated native failure.
    pub fn uuid(&self) -> Result<String> {
        self.text(TextField::Uuid)
    }

    /// Product name (e.g. `HL-225`).
    ///
    /// # Errors
    ///
    /// Stale handle, `NotInitialized`, or a translated native failure.
    pub fn name(&self) -> Result<String> {
        self.text(TextField::Name)
    }

    /// Board serial number.
    ///
    /// # Errors
    ///
    /// Stale handle, `NotInitialized`, or a translated native failure.
    pub fn serial_number(&self) -> Result<String> {
        self.text(TextField::SerialNumber)
    }

    /// Board (module) id within the host.
    ///
    /// # Errors
    ///
    /// Stale handle, `NotInitialized`, or a translated native failure.
    pub fn board_id(&self) -> Result<u32> {
        self.counter_u32(Counter::BoardId)
    }
}

pub(crate) fn narrow(value: u64, metric: &'static str) -> Result<u32> {
    u32::try_from(value).map_err(|_| {
        warn!("{metric} value {value} does not fit in 32 bits");
        HlmlError::native(crate::native::NativeStatus::Unknown)
    })
}

impl PartialEq for DeviceHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared) && self.epoch == other.epoch && self.raw == other.raw
    }
}

impl Eq for DeviceHandle {}

impl fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("index", &self.index)
            .field("raw", &self.raw)
            .finish_non_exhaustive()
    }
}

/// Reject identities the native layer could never match.
fn validate_identity(kind: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(HlmlError::invalid_argument(format!("{kind} is empty")));
    }
    if value.trim() != value {
        return Err(HlmlError::invalid_argument(format!(
            "{kind} has leading or trailing whitespace"
        )));
    }
    if value.chars().any(char::is_control) {
        return Err(HlmlError::invalid_argument(format!(
            "{kind} contains control characters"
        )));
    }
    Ok(())
}

impl Library {
    /// Handle for the device at an enumeration index.
    ///
    /// Two calls with the same index in the same cycle return equal handles.
    ///
    /// # Errors
    ///
    /// `NotInitialized`, or `InvalidIndex` when `index >= device_count()`.
    pub fn device_handle_by_index(&self, index: u32) -> Result<DeviceHandle> {
        let mut core = self.shared.lock();
        let session = core.session()?;
        let count = session.device_count();
        let epoch = session.epoch;
        session
            .devices
            .iter()
            .find(|d| d.index == index)
            .map(|d| DeviceHandle::from_enumerated(&self.shared, epoch, d))
            .ok_or(HlmlError::InvalidIndex { index, count })
    }

    /// Handle for the device with the given UUID (ASCII case-insensitive).
    ///
    /// # Errors
    ///
    /// `NotInitialized`, `InvalidArgument` for a malformed UUID, or
    /// `NotFound` when no enumerated device matches.
    pub fn device_handle_by_uuid(&self, uuid: &str) -> Result<DeviceHandle> {
        validate_identity("UUID", uuid)?;
        self.find_device(&format!("UUID {uuid}"), |d| {
            d.uuid.as_deref().is_some_and(|u| u.eq_ignore_ascii_case(uuid))
        })
    }

    /// Handle for the device with the given board serial number.
    ///
    /// # Errors
    ///
    /// `NotInitialized`, `InvalidArgument` for a malformed serial, or
    /// `NotFound` when no enumerated device matches.
    pub fn device_handle_by_serial(&self, serial: &str) -> Result<DeviceHandle> {
        validate_identity("serial number", serial)?;
        self.find_device(&format!("serial {serial}"), |d| {
            d.serial.as_deref() == Some(serial)
        })
    }

    fn find_device(
        &self,
        what: &str,
        matches: impl Fn(&EnumeratedDevice) -> bool,
    ) -> Result<DeviceHandle> {
        let mut core = self.shared.lock();
        let session = core.session()?;
        let epoch = session.epoch;
        session
            .devices
            .iter()
            .find(|d| matches(d))
            .map(|d| DeviceHandle::from_enumerated(&self.shared, epoch, d))
            .ok_or_else(|| {
                debug!("Lookup failed: no device with {what}");
                HlmlError::not_found(what)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_validation() {
        assert!(validate_identity("UUID", "abc").is_ok());
        assert!(validate_identity("UUID", "").unwrap_err().is_invalid_argument());
        assert!(validate_identity("UUID", " abc").unwrap_err().is_invalid_argument());
        assert!(validate_identity("UUID", "ab\0c").unwrap_err().is_invalid_argument());
        assert!(validate_identity("UUID", "abc\n").unwrap_err().is_invalid_argument());
    }

    #[test]
    fn narrowing() {
        assert_eq!(narrow(42, "x").unwrap(), 42);
        assert_eq!(
            narrow(u64::from(u32::MAX) + 1, "x").unwrap_err(),
            HlmlError::native(crate::native::NativeStatus::Unknown)
        );
    }
}
