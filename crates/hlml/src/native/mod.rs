// SPDX-License-Identifier: AGPL-3.0-only

//! Native interface adapter
//!
//! The [`NativeInterface`] trait is the raw call surface into the
//! hardware-management layer. Two implementations are available:
//! - **Sysfs**: reads the habanalabs kernel driver's sysfs and hwmon
//!   attributes (real hardware, no vendor library required)
//! - **Simulated**: an in-process fleet of synthetic devices (CI, tests,
//!   development without an accelerator)
//!
//! Implementations report failures as [`NativeStatus`]; translation into
//! [`HlmlError`](crate::HlmlError) happens in the layers above, never here.

mod simulated;
mod status;
mod sysfs;

pub use simulated::{SimulatedDevice, SimulatedInterface};
pub use status::{NativeResult, NativeStatus};
pub use sysfs::SysfsInterface;

use crate::config::Config;
use crate::error::Result;
use crate::events::EventTypes;
use crate::telemetry::{
    EccErrorType, EccMode, FirmwareVersion, MacAddress, MemoryInfo, RowReplacementCause,
    TemperatureThreshold,
};
use hlml_chip::clock::ClockDomain;
use std::fmt::Debug;
use std::sync::Arc;
use tracing::{info, warn};

/// Native device identifier. Opaque outside the interface that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawDevice(pub u64);

/// Native event set identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawEventSet(pub u64);

/// Event reported by a native event set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawEvent {
    /// Device the event fired on
    pub device: RawDevice,
    /// Event class
    pub event_type: EventTypes,
}

/// Flags passed to [`NativeInterface::init`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InitFlags {
    /// Emit verbose per-call diagnostics from the native layer
    pub diagnostics: bool,
}

/// Numeric field selector for [`NativeInterface::read_counter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Counter {
    /// Device minor number
    MinorNumber,
    /// Board (module) id
    BoardId,
    /// AIP utilization, percent
    Utilization,
    /// Current clock, MHz
    Clock(ClockDomain),
    /// Maximum clock, MHz
    MaxClock(ClockDomain),
    /// Power draw, mW
    PowerUsage,
    /// Default power management limit, mW
    PowerDefaultLimit,
    /// On-chip temperature, °C
    TemperatureOnChip,
    /// On-board temperature, °C
    TemperatureOnBoard,
    /// Temperature threshold, °C
    TemperatureThreshold(TemperatureThreshold),
    /// ECC errors since last driver load
    EccVolatile(EccErrorType),
    /// ECC errors over device lifetime
    EccAggregate(EccErrorType),
    /// Rows replaced for the given cause
    ReplacedRows(RowReplacementCause),
    /// 1 when a row replacement waits for the next reset
    ReplacedRowsPending,
    /// PCI domain
    PciDomain,
    /// PCI bus
    PciBus,
    /// Packed PCI device/vendor id
    PciId,
    /// PCIe transmit throughput, KB/s
    PcieTx,
    /// PCIe receive throughput, KB/s
    PcieRx,
    /// PCIe replay counter
    PcieReplayCounter,
    /// Negotiated PCIe generation
    PcieLinkGeneration,
    /// Negotiated PCIe lane count
    PcieLinkWidth,
    /// Energy consumed since driver load, mJ
    EnergyConsumption,
    /// Silicon revision
    HlRevision,
}

impl Counter {
    /// Human-readable metric name, used in `Unsupported` errors and logs.
    pub const fn metric(&self) -> &'static str {
        match self {
            Self::MinorNumber => "minor number",
            Self::BoardId => "board id",
            Self::Utilization => "utilization",
            Self::Clock(_) => "clock frequency",
            Self::MaxClock(_) => "max clock frequency",
            Self::PowerUsage => "power usage",
            Self::PowerDefaultLimit => "power management default limit",
            Self::TemperatureOnChip => "on-chip temperature",
            Self::TemperatureOnBoard => "on-board temperature",
            Self::TemperatureThreshold(_) => "temperature threshold",
            Self::EccVolatile(_) => "volatile ECC errors",
            Self::EccAggregate(_) => "aggregate ECC errors",
            Self::ReplacedRows(_) => "replaced rows",
            Self::ReplacedRowsPending => "replaced rows pending status",
            Self::PciDomain => "PCI domain",
            Self::PciBus => "PCI bus",
            Self::PciId => "PCI id",
            Self::PcieTx => "PCIe TX throughput",
            Self::PcieRx => "PCIe RX throughput",
            Self::PcieReplayCounter => "PCIe replay counter",
            Self::PcieLinkGeneration => "PCIe link generation",
            Self::PcieLinkWidth => "PCIe link width",
            Self::EnergyConsumption => "energy consumption counter",
            Self::HlRevision => "HL revision",
        }
    }
}

/// String field selector for [`NativeInterface::read_text`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextField {
    /// Product name
    Name,
    /// Device UUID
    Uuid,
    /// Serial number
    SerialNumber,
    /// PCI bus id (`dddd:bb:dd.f`)
    PciBusId,
    /// PCI link speed as reported (`16.0 GT/s PCIe`)
    PciLinkSpeed,
    /// PCI link width as reported
    PciLinkWidth,
    /// PCB version
    PcbVersion,
    /// PCB assembly version
    PcbAssemblyVersion,
}

impl TextField {
    /// Human-readable metric name.
    pub const fn metric(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Uuid => "UUID",
            Self::SerialNumber => "serial number",
            Self::PciBusId => "PCI bus id",
            Self::PciLinkSpeed => "PCI link speed",
            Self::PciLinkWidth => "PCI link width",
            Self::PcbVersion => "PCB version",
            Self::PcbAssemblyVersion => "PCB assembly version",
        }
    }
}

/// Raw call surface into the hardware-management layer.
///
/// Implementations do their own synchronisation; the access layer
/// additionally serialises every call through its state lock.
pub trait NativeInterface: Debug + Send + Sync {
    /// Which implementation this is
    fn kind(&self) -> InterfaceKind;

    /// Open the management channel
    ///
    /// # Errors
    ///
    /// `AlreadyInitialized` if open, `DriverNotLoaded` if no driver is present.
    fn init(&self, flags: InitFlags) -> NativeResult<()>;

    /// Close the management channel and release every native resource
    ///
    /// # Errors
    ///
    /// `Uninitialized` if not open.
    fn shutdown(&self) -> NativeResult<()>;

    /// Number of devices visible to the native layer
    ///
    /// # Errors
    ///
    /// `Uninitialized` if not open.
    fn device_count(&self) -> NativeResult<u32>;

    /// Native device at an ordinal index
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an index out of range.
    fn device_by_index(&self, index: u32) -> NativeResult<RawDevice>;

    /// Read one numeric field
    ///
    /// # Errors
    ///
    /// `NotSupported` when the field is unavailable on this device.
    fn read_counter(&self, device: RawDevice, counter: Counter) -> NativeResult<u64>;

    /// Read one string field
    ///
    /// # Errors
    ///
    /// `NotSupported` when the field is unavailable on this device.
    fn read_text(&self, device: RawDevice, field: TextField) -> NativeResult<String>;

    /// Device memory totals
    ///
    /// # Errors
    ///
    /// `NotSupported` when memory accounting is unavailable.
    fn memory_info(&self, device: RawDevice) -> NativeResult<MemoryInfo>;

    /// Current and pending ECC mode
    ///
    /// # Errors
    ///
    /// `NotSupported` when ECC is not reported.
    fn ecc_mode(&self, device: RawDevice) -> NativeResult<EccMode>;

    /// MAC address of every NIC port
    ///
    /// # Errors
    ///
    /// `NotSupported` when NIC information is unavailable.
    fn mac_addresses(&self, device: RawDevice) -> NativeResult<Vec<MacAddress>>;

    /// Firmware versions of the device at an ordinal index
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an index out of range.
    fn fw_version(&self, index: u32) -> NativeResult<FirmwareVersion>;

    /// Kernel driver version
    ///
    /// # Errors
    ///
    /// `NotSupported` when the driver does not publish a version.
    fn driver_version(&self) -> NativeResult<String>;

    /// Allocate an empty event set
    ///
    /// # Errors
    ///
    /// `Memory` when no more sets can be allocated.
    fn event_set_create(&self) -> NativeResult<RawEventSet>;

    /// Subscribe a device's event classes into a set
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an unknown set/device or empty mask,
    /// `NotSupported` when none of the classes can be observed.
    fn register_events(
        &self,
        set: RawEventSet,
        device: RawDevice,
        mask: EventTypes,
    ) -> NativeResult<()>;

    /// Take the next ready event without blocking
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an unknown set.
    fn event_set_poll(&self, set: RawEventSet) -> NativeResult<Option<RawEvent>>;

    /// Release an event set
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an unknown set.
    fn event_set_free(&self, set: RawEventSet) -> NativeResult<()>;
}

/// Native interface type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterfaceKind {
    /// habanalabs sysfs / hwmon
    Sysfs,
    /// Synthetic in-process devices
    Simulated,
}

impl std::fmt::Display for InterfaceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sysfs => write!(f, "sysfs"),
            Self::Simulated => write!(f, "simulated"),
        }
    }
}

/// Interface selection strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InterfaceSelection {
    /// Use the kernel driver when present
    #[default]
    Auto,
    /// Force sysfs
    Sysfs,
    /// Force the simulated fleet
    Simulated,
}

impl std::str::FromStr for InterfaceSelection {
    type Err = crate::HlmlError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "sysfs" => Ok(Self::Sysfs),
            "simulated" | "sim" | "software" => Ok(Self::Simulated),
            other => Err(crate::HlmlError::config(format!(
                "unknown backend '{other}' (expected auto, sysfs or simulated)"
            ))),
        }
    }
}

/// Build the native interface described by `config`.
///
/// `Auto` never falls back to the simulated fleet: reporting synthetic
/// telemetry on a production host would be worse than failing.
///
/// # Errors
///
/// `NativeFailure(DriverNotLoaded)` when `Auto` finds no habanalabs driver.
pub fn select_interface(config: &Config) -> Result<Arc<dyn NativeInterface>> {
    match config.interface {
        InterfaceSelection::Auto => {
            if SysfsInterface::driver_present(&config.sysfs_root) {
                info!("Using sysfs interface at {}", config.sysfs_root.display());
                Ok(Arc::new(SysfsInterface::new(&config.sysfs_root)))
            } else {
                warn!(
                    "habanalabs driver not found under {} (set HLML_BACKEND=simulated for a synthetic fleet)",
                    config.sysfs_root.display()
                );
                Err(crate::HlmlError::native(NativeStatus::DriverNotLoaded))
            }
        }
        InterfaceSelection::Sysfs => Ok(Arc::new(SysfsInterface::new(&config.sysfs_root))),
        InterfaceSelection::Simulated => {
            info!("Using simulated interface with {} devices", config.simulated_devices);
            Ok(Arc::new(SimulatedInterface::new(config.simulated_devices)))
        }
    }
}
