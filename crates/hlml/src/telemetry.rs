// SPDX-License-Identifier: AGPL-3.0-only

//! Telemetry query surface
//!
//! Every getter is one native query: no caching, no retries, no rescaling.
//! A metric the device does not report fails with
//! [`HlmlError::Unsupported`]; it is never defaulted to zero.

use crate::device::DeviceHandle;
use crate::error::{HlmlError, Result};
use crate::native::{Counter, NativeStatus, TextField};
use hlml_chip::clock::ClockDomain;
use std::fmt;
use tracing::warn;

/// Device memory totals, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryInfo {
    /// Total device memory
    pub total: u64,
    /// Allocated device memory
    pub used: u64,
    /// Unallocated device memory
    pub free: u64,
}

/// ECC enablement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EccState {
    /// ECC off
    Disabled,
    /// ECC on
    Enabled,
}

/// Current ECC mode and the mode that applies after the next reset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EccMode {
    /// Mode in effect
    pub current: EccState,
    /// Mode after next reset
    pub pending: EccState,
}

/// ECC error class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EccErrorType {
    /// Single-bit, corrected by hardware
    Corrected,
    /// Multi-bit, not correctable
    Uncorrected,
}

/// On-chip and on-board temperatures, °C
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Temperature {
    /// AIP die temperature
    pub on_chip: u32,
    /// Board sensor temperature
    pub on_board: u32,
}

/// Temperature threshold kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemperatureThreshold {
    /// Device shuts down above this
    Shutdown,
    /// Device throttles above this
    Slowdown,
    /// Memory temperature limit
    Memory,
    /// Compute die limit
    Gpu,
}

/// Why a memory row was replaced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RowReplacementCause {
    /// Repeated single-bit ECC errors
    SingleBitEcc,
    /// Double-bit ECC error
    DoubleBitEcc,
}

/// A NIC port MAC address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddress(pub [u8; 6]);

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

/// Firmware component versions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareVersion {
    /// Embedded CPU kernel version
    pub kernel: String,
    /// Boot loader version
    pub uboot: String,
}

impl DeviceHandle {
    /// Memory totals. Verifies `used + free == total`.
    ///
    /// # Errors
    ///
    /// Stale handle, `Unsupported`, or `NativeFailure` (including a reading
    /// that violates the totals invariant).
    pub fn memory_info(&self) -> Result<MemoryInfo> {
        let info = self.query("memory info", |native, raw| native.memory_info(raw))?;
        if info.used.checked_add(info.free) != Some(info.total) {
            warn!(
                "device {}: inconsistent memory info (total {} != used {} + free {})",
                self.index,
                info.total,
                info.used,
                info.free
            );
            return Err(HlmlError::native(NativeStatus::Unknown));
        }
        Ok(info)
    }

    /// AIP utilization, percent.
    ///
    /// # Errors
    ///
    /// Stale handle, `Unsupported`, or `NativeFailure`.
    pub fn utilization_info(&self) -> Result<u32> {
        self.counter_u32(Counter::Utilization)
    }

    /// Current clock of a domain, MHz.
    ///
    /// # Errors
    ///
    /// Stale handle, `Unsupported`, or `NativeFailure`.
    pub fn clock_info(&self, domain: ClockDomain) -> Result<u32> {
        self.counter_u32(Counter::Clock(domain))
    }

    /// Maximum clock of a domain, MHz.
    ///
    /// # Errors
    ///
    /// Stale handle, `Unsupported`, or `NativeFailure`.
    pub fn max_clock_info(&self, domain: ClockDomain) -> Result<u32> {
        self.counter_u32(Counter::MaxClock(domain))
    }

    /// Current SoC clock, MHz.
    ///
    /// # Errors
    ///
    /// Stale handle, `Unsupported`, or `NativeFailure`.
    pub fn soc_clock_info(&self) -> Result<u32> {
        self.clock_info(ClockDomain::Soc)
    }

    /// Maximum SoC clock, MHz.
    ///
    /// # Errors
    ///
    /// Stale handle, `Unsupported`, or `NativeFailure`.
    pub fn soc_clock_max(&self) -> Result<u32> {
        self.max_clock_info(ClockDomain::Soc)
    }

    /// Power draw, mW.
    ///
    /// # Errors
    ///
    /// Stale handle, `Unsupported`, or `NativeFailure`.
    pub fn power_usage(&self) -> Result<u64> {
        self.counter(Counter::PowerUsage)
    }

    /// Default power management limit, mW.
    ///
    /// # Errors
    ///
    /// Stale handle, `Unsupported`, or `NativeFailure`.
    pub fn power_management_default_limit(&self) -> Result<u64> {
        self.counter(Counter::PowerDefaultLimit)
    }

    /// Die temperature, °C.
    ///
    /// # Errors
    ///
    /// Stale handle, `Unsupported`, or `NativeFailure`.
    pub fn temperature_on_chip(&self) -> Result<u32> {
        self.counter_u32(Counter::TemperatureOnChip)
    }

    /// Board temperature, °C.
    ///
    /// # Errors
    ///
    /// Stale handle, `Unsupported`, or `NativeFailure`.
    pub fn temperature_on_board(&self) -> Result<u32> {
        self.counter_u32(Counter::TemperatureOnBoard)
    }

    /// Both temperatures. Two native queries; the pair is not atomic.
    ///
    /// # Errors
    ///
    /// Fails if either reading fails.
    pub fn temperature(&self) -> Result<Temperature> {
        Ok(Temperature {
            on_chip: self.temperature_on_chip()?,
            on_board: self.temperature_on_board()?,
        })
    }

    /// A temperature threshold, °C.
    ///
    /// # Errors
    ///
    /// Stale handle, `Unsupported`, or `NativeFailure`.
    pub fn temperature_threshold(&self, kind: TemperatureThreshold) -> Result<u32> {
        self.counter_u32(Counter::TemperatureThreshold(kind))
    }

    /// Current and pending ECC mode.
    ///
    /// # Errors
    ///
    /// Stale handle, `Unsupported`, or `NativeFailure`.
    pub fn ecc_mode(&self) -> Result<EccMode> {
        self.query("ECC mode", |native, raw| native.ecc_mode(raw))
    }

    /// ECC errors since the driver was loaded.
    ///
    /// # Errors
    ///
    /// Stale handle, `Unsupported`, or `NativeFailure`.
    pub fn ecc_volatile_errors(&self, kind: EccErrorType) -> Result<u64> {
        self.counter(Counter::EccVolatile(kind))
    }

    /// ECC errors over the device lifetime.
    ///
    /// # Errors
    ///
    /// Stale handle, `Unsupported`, or `NativeFailure`.
    pub fn ecc_aggregate_errors(&self, kind: EccErrorType) -> Result<u64> {
        self.counter(Counter::EccAggregate(kind))
    }

    /// Number of memory rows replaced for `cause`.
    ///
    /// # Errors
    ///
    /// Stale handle, `Unsupported`, or `NativeFailure`.
    pub fn replaced_rows(&self, cause: RowReplacementCause) -> Result<u32> {
        self.counter_u32(Counter::ReplacedRows(cause))
    }

    /// Whether a row replacement waits for the next reset.
    ///
    /// # Errors
    ///
    /// Stale handle, `Unsupported`, or `NativeFailure`.
    pub fn replaced_rows_pending(&self) -> Result<bool> {
        Ok(self.counter(Counter::ReplacedRowsPending)? != 0)
    }

    /// PCI domain.
    ///
    /// # Errors
    ///
    /// Stale handle, `Unsupported`, or `NativeFailure`.
    pub fn pci_domain(&self) -> Result<u32> {
        self.counter_u32(Counter::PciDomain)
    }

    /// PCI bus.
    ///
    /// # Errors
    ///
    /// Stale handle, `Unsupported`, or `NativeFailure`.
    pub fn pci_bus(&self) -> Result<u32> {
        self.counter_u32(Counter::PciBus)
    }

    /// PCI bus id, `dddd:bb:dd.f`.
    ///
    /// # Errors
    ///
    /// Stale handle, `Unsupported`, or `NativeFailure`.
    pub fn pci_bus_id(&self) -> Result<String> {
        self.text(TextField::PciBusId)
    }

    /// Packed PCI id, device in the high half and vendor in the low half.
    ///
    /// # Errors
    ///
    /// Stale handle, `Unsupported`, or `NativeFailure`.
    pub fn pci_id(&self) -> Result<u32> {
        self.counter_u32(Counter::PciId)
    }

    /// PCI link speed as the driver reports it.
    ///
    /// # Errors
    ///
    /// Stale handle, `Unsupported`, or `NativeFailure`.
    pub fn pci_link_speed(&self) -> Result<String> {
        self.text(TextField::PciLinkSpeed)
    }

    /// PCI link width as the driver reports it.
    ///
    /// # Errors
    ///
    /// Stale handle, `Unsupported`, or `NativeFailure`.
    pub fn pci_link_width(&self) -> Result<String> {
        self.text(TextField::PciLinkWidth)
    }

    /// PCIe transmit throughput, KB/s.
    ///
    /// # Errors
    ///
    /// Stale handle, `Unsupported`, or `NativeFailure`.
    pub fn pcie_tx(&self) -> Result<u64> {
        self.counter(Counter::PcieTx)
    }

    /// PCIe receive throughput, KB/s.
    ///
    /// # Errors
    ///
    /// Stale handle, `Unsupported`, or `NativeFailure`.
    pub fn pcie_rx(&self) -> Result<u64> {
        self.counter(Counter::PcieRx)
    }

    /// PCIe replay counter.
    ///
    /// # Errors
    ///
    /// Stale handle, `Unsupported`, or `NativeFailure`.
    pub fn pcie_replay_counter(&self) -> Result<u64> {
        self.counter(Counter::PcieReplayCounter)
    }

    /// Negotiated PCIe generation.
    ///
    /// # Errors
    ///
    /// Stale handle, `Unsupported`, or `NativeFailure`.
    pub fn pcie_link_generation(&self) -> Result<u32> {
        self.counter_u32(Counter::PcieLinkGeneration)
    }

    /// Negotiated PCIe lane count.
    ///
    /// # Errors
    ///
    /// Stale handle, `Unsupported`, or `NativeFailure`.
    pub fn pcie_link_width(&self) -> Result<u32> {
        self.counter_u32(Counter::PcieLinkWidth)
    }

    /// Energy consumed since the driver was loaded, mJ. Monotonic.
    ///
    /// # Errors
    ///
    /// Stale handle, `Unsupported`, or `NativeFailure`.
    pub fn energy_consumption_counter(&self) -> Result<u64> {
        self.counter(Counter::EnergyConsumption)
    }

    /// Silicon revision.
    ///
    /// # Errors
    ///
    /// Stale handle, `Unsupported`, or `NativeFailure`.
    pub fn hl_revision(&self) -> Result<u32> {
        self.counter_u32(Counter::HlRevision)
    }

    /// PCB version.
    ///
    /// # Errors
    ///
    /// Stale handle, `Unsupported`, or `NativeFailure`.
    pub fn pcb_version(&self) -> Result<String> {
        self.text(TextField::PcbVersion)
    }

    /// PCB assembly version.
    ///
    /// # Errors
    ///
    /// Stale handle, `Unsupported`, or `NativeFailure`.
    pub fn pcb_assembly_version(&self) -> Result<String> {
        self.text(TextField::PcbAssemblyVersion)
    }

    /// MAC address of every NIC port, in port order.
    ///
    /// # Errors
    ///
    /// Stale handle, `Unsupported`, or `NativeFailure`.
    pub fn mac_address_info(&self) -> Result<Vec<MacAddress>> {
        self.query("MAC address info", |native, raw| native.mac_addresses(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mac_display() {
        let mac = MacAddress([0xb0, 0xfd, 0x0b, 0x00, 0x1a, 0xff]);
        assert_eq!(mac.to_string(), "b0:fd:0b:00:1a:ff");
    }
}
