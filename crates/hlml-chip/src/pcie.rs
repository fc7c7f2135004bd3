// SPDX-License-Identifier: AGPL-3.0-only

//! PCI identifiers and PCIe link encoding.

/// Habana Labs vendor ID (PCI-SIG assigned).
pub const HABANA_VENDOR_ID: u16 = 0x1DA3;

/// Device IDs for the Habana accelerator family.
pub mod device_id {
    /// Goya inference card (`lspci: 1da3:0001`).
    pub const GOYA: u16 = 0x0001;
    /// Gaudi training card (`lspci: 1da3:1000`).
    pub const GAUDI: u16 = 0x1000;
    /// Gaudi with secured firmware.
    pub const GAUDI_SEC: u16 = 0x1010;
    /// Gaudi2 (`lspci: 1da3:1020`).
    pub const GAUDI2: u16 = 0x1020;
}

/// Format a `vendor:` string for use with `lspci -d`.
#[must_use]
pub fn lspci_filter() -> String {
    format!("{HABANA_VENDOR_ID:04x}:")
}

/// Pack vendor and device IDs the way the management library reports
/// `pci_device_id`: device in the upper half, vendor in the lower half.
#[must_use]
pub const fn pci_device_id(vendor: u16, device: u16) -> u32 {
    ((device as u32) << 16) | vendor as u32
}

/// Chip variant discovered at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChipVariant {
    /// Goya: inference, no NIC ports.
    Goya,
    /// Gaudi: training, 10 × 100GbE RoCE ports.
    Gaudi,
    /// Gaudi2: training, 24 × 100GbE RoCE ports.
    Gaudi2,
    /// Unknown / future variant.
    Unknown(u16),
}

impl ChipVariant {
    /// Identify variant from PCI device ID.
    #[must_use]
    pub const fn from_device_id(id: u16) -> Self {
        match id {
            device_id::GOYA => Self::Goya,
            device_id::GAUDI | device_id::GAUDI_SEC => Self::Gaudi,
            device_id::GAUDI2 => Self::Gaudi2,
            other => Self::Unknown(other),
        }
    }

    /// Identify variant from the driver's `device_type` attribute
    /// (`GOYA`, `GAUDI`, `GAUDI SEC`, `GAUDI2`, ...).
    #[must_use]
    pub fn from_device_type(device_type: &str) -> Self {
        let normalized = device_type.trim().to_ascii_uppercase();
        match normalized.as_str() {
            "GOYA" => Self::Goya,
            "GAUDI" | "GAUDI SEC" => Self::Gaudi,
            s if s.starts_with("GAUDI2") => Self::Gaudi2,
            _ => Self::Unknown(0),
        }
    }

    /// Marketing name reported by the management library.
    #[must_use]
    pub const fn product_name(&self) -> &'static str {
        match self {
            Self::Goya => "HL-100",
            Self::Gaudi => "HL-205",
            Self::Gaudi2 => "HL-225",
            Self::Unknown(_) => "HL-UNKNOWN",
        }
    }

    /// Number of on-die NIC ports.
    #[must_use]
    pub const fn nic_ports(&self) -> u32 {
        match self {
            Self::Goya | Self::Unknown(_) => 0,
            Self::Gaudi => 10,
            Self::Gaudi2 => 24,
        }
    }

    /// Device memory in bytes.
    #[must_use]
    pub const fn memory_bytes(&self) -> u64 {
        const GIB: u64 = 1 << 30;
        match self {
            Self::Goya => 16 * GIB,
            Self::Gaudi => 32 * GIB,
            Self::Gaudi2 => 96 * GIB,
            Self::Unknown(_) => 0,
        }
    }

    /// Highest PCIe generation the part negotiates.
    #[must_use]
    pub const fn pcie_generation(&self) -> u32 {
        match self {
            Self::Goya | Self::Gaudi | Self::Unknown(_) => 4,
            Self::Gaudi2 => 5,
        }
    }
}

/// Parse a PCIe generation from a sysfs link speed string
/// such as `"16.0 GT/s PCIe"` or `"8 GT/s"`.
#[must_use]
pub fn generation_from_link_speed(speed: &str) -> Option<u32> {
    let gts: f32 = speed.split_whitespace().next()?.parse().ok()?;
    // Compare in tenths of GT/s so 2.5 stays exact.
    #[allow(clippy::cast_possible_truncation)]
    let tenths = (gts * 10.0).round() as u32;
    match tenths {
        25 => Some(1),
        50 => Some(2),
        80 => Some(3),
        160 => Some(4),
        320 => Some(5),
        640 => Some(6),
        _ => None,
    }
}

/// Split a PCI bus id (`dddd:bb:dd.f`) into `(domain, bus, device, function)`.
#[must_use]
pub fn parse_bus_id(bus_id: &str) -> Option<(u32, u32, u32, u32)> {
    let (domain, rest) = bus_id.trim().split_once(':')?;
    let (bus, rest) = rest.split_once(':')?;
    let (device, function) = rest.split_once('.')?;
    Some((
        u32::from_str_radix(domain, 16).ok()?,
        u32::from_str_radix(bus, 16).ok()?,
        u32::from_str_radix(device, 16).ok()?,
        u32::from_str_radix(function, 16).ok()?,
    ))
}
