// SPDX-License-Identifier: AGPL-3.0-only

//! Device status as published by the habanalabs driver's `status` attribute.

/// Operational status of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceStatus {
    /// Device is up and accepting work.
    Operational,
    /// Device is being reset.
    InReset,
    /// Device hit an unrecoverable error.
    Malfunction,
    /// Device requires a hard reset before further use.
    NeedsReset,
    /// Driver is still bringing the device up.
    InDeviceCreation,
    /// Any other string.
    Unknown,
}

impl DeviceStatus {
    /// Parse the driver's status string.
    #[must_use]
    pub fn from_sysfs_str(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "operational" => Self::Operational,
            "in reset" | "in reset after device release" => Self::InReset,
            "malfunction" => Self::Malfunction,
            "needs reset" => Self::NeedsReset,
            "in device creation" => Self::InDeviceCreation,
            _ => Self::Unknown,
        }
    }

    /// Whether the status should be reported as a critical error.
    #[must_use]
    pub const fn is_critical(&self) -> bool {
        matches!(self, Self::Malfunction | Self::NeedsReset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parsing() {
        assert_eq!(DeviceStatus::from_sysfs_str("Operational\n"), DeviceStatus::Operational);
        assert_eq!(DeviceStatus::from_sysfs_str("In reset"), DeviceStatus::InReset);
        assert_eq!(DeviceStatus::from_sysfs_str("Malfunction"), DeviceStatus::Malfunction);
        assert_eq!(DeviceStatus::from_sysfs_str("???"), DeviceStatus::Unknown);
    }

    #[test]
    fn critical_statuses() {
        assert!(DeviceStatus::Malfunction.is_critical());
        assert!(DeviceStatus::NeedsReset.is_critical());
        assert!(!DeviceStatus::InReset.is_critical());
        assert!(!DeviceStatus::Operational.is_critical());
    }
}
