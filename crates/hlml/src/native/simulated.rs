// SPDX-License-Identifier: AGPL-3.0-only

//! Simulated native interface
//!
//! An in-process fleet of synthetic accelerators that behaves like the real
//! management layer: it must be initialized before use, rejects unknown ids,
//! reports unavailable metrics as `NotSupported` and delivers events only to
//! sets that subscribed for them. This enables:
//!
//! 1. **CI without hardware**: every access-layer test runs against it.
//! 2. **Fault injection**: [`SimulatedInterface::fail_next_call`] makes the
//!    next native call return an arbitrary status.
//! 3. **Event injection**: [`SimulatedInterface::inject_event`] fires an
//!    event on a device as the driver would.
//!
//! The interface is `Clone`; clones share one fleet, so a test keeps one
//! clone as a controller after handing another to a [`Library`](crate::Library).

use super::{
    Counter, InitFlags, InterfaceKind, NativeInterface, NativeResult, NativeStatus, RawDevice,
    RawEvent, RawEventSet, TextField,
};
use crate::events::EventTypes;
use crate::telemetry::{
    EccErrorType, EccMode, EccState, FirmwareVersion, MacAddress, MemoryInfo,
    RowReplacementCause, TemperatureThreshold,
};
use hlml_chip::clock::ClockDomain;
use hlml_chip::pcie::{self, device_id, ChipVariant, HABANA_VENDOR_ID};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Raw ids are offset so an index is never mistaken for a device id.
const RAW_DEVICE_BASE: u64 = 0x1000;

/// Energy added to the counter on every read, mJ
const ENERGY_STEP_MJ: u64 = 250;

/// Synthetic driver version
const SIM_DRIVER_VERSION: &str = "1.17.0-sim";

/// One synthetic device and its telemetry.
#[derive(Debug, Clone)]
pub struct SimulatedDevice {
    counters: HashMap<Counter, u64>,
    text: HashMap<TextField, String>,
    memory: Option<MemoryInfo>,
    ecc: Option<EccMode>,
    macs: Option<Vec<MacAddress>>,
    firmware: FirmwareVersion,
    observable: EventTypes,
}

impl SimulatedDevice {
    /// An idle HL-225 (Gaudi2) card in slot `index`.
    pub fn gaudi2(index: u32) -> Self {
        let variant = ChipVariant::Gaudi2;
        let bus = 0x10 + index;
        let bus_id = format!("0000:{bus:02x}:00.0");
        let serial = format!("SIM{index:07}");
        let uuid = Uuid::new_v5(&Uuid::NAMESPACE_OID, format!("hlml-sim:{serial}").as_bytes());

        let mut counters = HashMap::new();
        counters.insert(Counter::MinorNumber, u64::from(index));
        counters.insert(Counter::BoardId, u64::from(index));
        counters.insert(Counter::Utilization, 0);
        for domain in ClockDomain::ALL {
            counters.insert(Counter::Clock(domain), 1300);
            counters.insert(Counter::MaxClock(domain), 1600);
        }
        counters.insert(Counter::PowerUsage, 95_000);
        counters.insert(Counter::PowerDefaultLimit, 600_000);
        counters.insert(Counter::TemperatureOnChip, 32);
        counters.insert(Counter::TemperatureOnBoard, 30);
        counters.insert(Counter::TemperatureThreshold(TemperatureThreshold::Shutdown), 110);
        counters.insert(Counter::TemperatureThreshold(TemperatureThreshold::Slowdown), 98);
        counters.insert(Counter::TemperatureThreshold(TemperatureThreshold::Memory), 95);
        counters.insert(Counter::TemperatureThreshold(TemperatureThreshold::Gpu), 105);
        for kind in [EccErrorType::Corrected, EccErrorType::Uncorrected] {
            counters.insert(Counter::EccVolatile(kind), 0);
            counters.insert(Counter::EccAggregate(kind), 0);
        }
        for cause in [RowReplacementCause::SingleBitEcc, RowReplacementCause::DoubleBitEcc] {
            counters.insert(Counter::ReplacedRows(cause), 0);
        }
        counters.insert(Counter::ReplacedRowsPending, 0);
        counters.insert(Counter::PciDomain, 0);
        counters.insert(Counter::PciBus, u64::from(bus));
        counters.insert(
            Counter::PciId,
            u64::from(pcie::pci_device_id(HABANA_VENDOR_ID, device_id::GAUDI2)),
        );
        counters.insert(Counter::PcieTx, 0);
        counters.insert(Counter::PcieRx, 0);
        counters.insert(Counter::PcieReplayCounter, 0);
        counters.insert(Counter::PcieLinkGeneration, u64::from(variant.pcie_generation()));
        counters.insert(Counter::PcieLinkWidth, 16);
        counters.insert(Counter::EnergyConsumption, 0);
        counters.insert(Counter::HlRevision, 1);

        let mut text = HashMap::new();
        text.insert(TextField::Name, variant.product_name().to_string());
        text.insert(TextField::Uuid, uuid.to_string());
        text.insert(TextField::SerialNumber, serial);
        text.insert(TextField::PciBusId, bus_id);
        text.insert(TextField::PciLinkSpeed, "32.0 GT/s PCIe".to_string());
        text.insert(TextField::PciLinkWidth, "16".to_string());
        text.insert(TextField::PcbVersion, "R0".to_string());
        text.insert(TextField::PcbAssemblyVersion, "A1".to_string());

        let total = variant.memory_bytes();
        #[allow(clippy::cast_possible_truncation)]
        let macs = (0..variant.nic_ports())
            .map(|port| MacAddress([0xb0, 0xfd, 0x0b, index as u8, 0x00, port as u8]))
            .collect();

        Self {
            counters,
            text,
            memory: Some(MemoryInfo {
                total,
                used: 0,
                free: total,
            }),
            ecc: Some(EccMode {
                current: EccState::Enabled,
                pending: EccState::Enabled,
            }),
            macs: Some(macs),
            firmware: FirmwareVersion {
                kernel: "5.10.18-hl-gaudi2-1.17.0-fw-51.2.0".to_string(),
                uboot: "2021.04-hl-gaudi2-1.17.0-fw-51.2.0".to_string(),
            },
            observable: EventTypes::all(),
        }
    }

    /// Set a numeric field.
    #[must_use]
    pub fn with_counter(mut self, counter: Counter, value: u64) -> Self {
        self.counters.insert(counter, value);
        self
    }

    /// Make a numeric field unsupported.
    #[must_use]
    pub fn without_counter(mut self, counter: Counter) -> Self {
        self.counters.remove(&counter);
        self
    }

    /// Set a string field.
    #[must_use]
    pub fn with_text(mut self, field: TextField, value: impl Into<String>) -> Self {
        self.text.insert(field, value.into());
        self
    }

    /// Make a string field unsupported.
    #[must_use]
    pub fn without_text(mut self, field: TextField) -> Self {
        self.text.remove(&field);
        self
    }

    /// Set the memory reading verbatim, consistent or not.
    #[must_use]
    pub fn with_memory(mut self, memory: MemoryInfo) -> Self {
        self.memory = Some(memory);
        self
    }

    /// Make memory accounting unsupported.
    #[must_use]
    pub fn without_memory(mut self) -> Self {
        self.memory = None;
        self
    }

    /// Set the ECC mode.
    #[must_use]
    pub fn with_ecc_mode(mut self, mode: EccMode) -> Self {
        self.ecc = Some(mode);
        self
    }

    /// Make NIC information unsupported.
    #[must_use]
    pub fn without_mac_addresses(mut self) -> Self {
        self.macs = None;
        self
    }

    /// Restrict the event classes this device can report.
    #[must_use]
    pub fn with_observable_events(mut self, events: EventTypes) -> Self {
        self.observable = events;
        self
    }
}

#[derive(Debug, Default)]
struct SimEventSet {
    subscriptions: HashMap<usize, EventTypes>,
    pending: VecDeque<RawEvent>,
}

/// Pending fault: succeed `remaining` more calls, then fail with `status`
#[derive(Debug, Clone, Copy)]
struct Fault {
    remaining: u32,
    status: NativeStatus,
}

#[derive(Debug)]
struct SimState {
    devices: Vec<SimulatedDevice>,
    initialized: bool,
    diagnostics: bool,
    driver_version: Option<String>,
    fault: Option<Fault>,
    sets: HashMap<u64, SimEventSet>,
    next_set: u64,
}

impl SimState {
    /// Common entry for every native call: fault injection, diagnostics and
    /// the initialized check.
    fn enter(&mut self, call: &'static str) -> NativeResult<()> {
        if let Some(fault) = self.fault.as_mut() {
            if fault.remaining == 0 {
                let status = fault.status;
                self.fault = None;
                debug!(target: "hlml::native", "{call}: injected failure {status}");
                return Err(status);
            }
            fault.remaining -= 1;
        }
        if self.diagnostics {
            debug!(target: "hlml::native", "{call}");
        }
        if self.initialized {
            Ok(())
        } else {
            Err(NativeStatus::Uninitialized)
        }
    }

    fn device_index(&self, device: RawDevice) -> NativeResult<usize> {
        device
            .0
            .checked_sub(RAW_DEVICE_BASE)
            .and_then(|i| usize::try_from(i).ok())
            .filter(|i| *i < self.devices.len())
            .ok_or(NativeStatus::InvalidArgument)
    }

    fn device(&mut self, device: RawDevice) -> NativeResult<&mut SimulatedDevice> {
        let index = self.device_index(device)?;
        self.devices.get_mut(index).ok_or(NativeStatus::InvalidArgument)
    }
}

fn raw_device(index: usize) -> RawDevice {
    RawDevice(RAW_DEVICE_BASE + index as u64)
}

/// Simulated native interface.
#[derive(Debug, Clone)]
pub struct SimulatedInterface {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedInterface {
    /// A fleet of `count` idle Gaudi2 cards.
    pub fn new(count: u32) -> Self {
        Self::with_devices((0..count).map(SimulatedDevice::gaudi2).collect())
    }

    /// A fleet of explicitly configured devices, indexed in order.
    pub fn with_devices(devices: Vec<SimulatedDevice>) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                devices,
                initialized: false,
                diagnostics: false,
                driver_version: Some(SIM_DRIVER_VERSION.to_string()),
                fault: None,
                sets: HashMap::new(),
                next_set: 1,
            })),
        }
    }

    fn with_device(&self, index: u32, f: impl FnOnce(&mut SimulatedDevice)) {
        let mut state = self.state.lock();
        match state.devices.get_mut(index as usize) {
            Some(device) => f(device),
            None => warn!("Simulated device {index} does not exist"),
        }
    }

    /// Change a numeric field on a live device.
    pub fn set_counter(&self, index: u32, counter: Counter, value: u64) {
        self.with_device(index, |d| {
            d.counters.insert(counter, value);
        });
    }

    /// Make a numeric field unsupported on a live device.
    pub fn clear_counter(&self, index: u32, counter: Counter) {
        self.with_device(index, |d| {
            d.counters.remove(&counter);
        });
    }

    /// Change a string field on a live device.
    pub fn set_text(&self, index: u32, field: TextField, value: impl Into<String>) {
        let value = value.into();
        self.with_device(index, |d| {
            d.text.insert(field, value);
        });
    }

    /// Allocate `used` bytes of device memory, keeping the totals consistent.
    pub fn set_memory_used(&self, index: u32, used: u64) {
        self.with_device(index, |d| {
            if let Some(memory) = d.memory.as_mut() {
                memory.used = used.min(memory.total);
                memory.free = memory.total - memory.used;
            }
        });
    }

    /// Replace the memory reading verbatim.
    pub fn set_memory(&self, index: u32, memory: MemoryInfo) {
        self.with_device(index, |d| d.memory = Some(memory));
    }

    /// Set or remove the driver version.
    pub fn set_driver_version(&self, version: Option<&str>) {
        self.state.lock().driver_version = version.map(str::to_string);
    }

    /// Fire `events` on the device at `index`.
    ///
    /// Each class is queued separately on every set that subscribed the
    /// device for it. Returns the number of events queued.
    pub fn inject_event(&self, index: u32, events: EventTypes) -> usize {
        let mut state = self.state.lock();
        let index = index as usize;
        let observable = match state.devices.get(index) {
            Some(device) => device.observable,
            None => return 0,
        };

        let mut queued = 0;
        for set in state.sets.values_mut() {
            let Some(mask) = set.subscriptions.get(&index) else {
                continue;
            };
            for event_type in (events & *mask & observable).iter() {
                set.pending.push_back(RawEvent {
                    device: raw_device(index),
                    event_type,
                });
                queued += 1;
            }
        }
        debug!(target: "hlml::native", "Injected {events:?} on device {index}: {queued} queued");
        queued
    }

    /// Make the next native call fail with `status`.
    pub fn fail_next_call(&self, status: NativeStatus) {
        self.fail_call_after(0, status);
    }

    /// Let `successes` native calls through, then fail one with `status`.
    pub fn fail_call_after(&self, successes: u32, status: NativeStatus) {
        self.state.lock().fault = Some(Fault {
            remaining: successes,
            status,
        });
    }

    /// Whether the simulated management channel is open.
    pub fn is_initialized(&self) -> bool {
        self.state.lock().initialized
    }

    /// Whether the channel was opened with diagnostics.
    pub fn diagnostics_enabled(&self) -> bool {
        self.state.lock().diagnostics
    }

    /// Number of allocated event sets.
    pub fn open_event_sets(&self) -> usize {
        self.state.lock().sets.len()
    }
}

impl NativeInterface for SimulatedInterface {
    fn kind(&self) -> InterfaceKind {
        InterfaceKind::Simulated
    }

    fn init(&self, flags: InitFlags) -> NativeResult<()> {
        let mut state = self.state.lock();
        // Only fault injection applies; `enter` would demand an open channel.
        if let Some(fault) = state.fault.as_mut() {
            if fault.remaining == 0 {
                let status = fault.status;
                state.fault = None;
                return Err(status);
            }
            fault.remaining -= 1;
        }
        if state.initialized {
            return Err(NativeStatus::AlreadyInitialized);
        }
        state.initialized = true;
        state.diagnostics = flags.diagnostics;
        if flags.diagnostics {
            debug!(target: "hlml::native", "init: {} simulated devices", state.devices.len());
        }
        Ok(())
    }

    fn shutdown(&self) -> NativeResult<()> {
        let mut state = self.state.lock();
        state.enter("shutdown")?;
        state.sets.clear();
        state.initialized = false;
        state.diagnostics = false;
        Ok(())
    }

    fn device_count(&self) -> NativeResult<u32> {
        let mut state = self.state.lock();
        state.enter("device_count")?;
        u32::try_from(state.devices.len()).map_err(|_| NativeStatus::Unknown)
    }

    fn device_by_index(&self, index: u32) -> NativeResult<RawDevice> {
        let mut state = self.state.lock();
        state.enter("device_by_index")?;
        let index = index as usize;
        if index < state.devices.len() {
            Ok(raw_device(index))
        } else {
            Err(NativeStatus::InvalidArgument)
        }
    }

    fn read_counter(&self, device: RawDevice, counter: Counter) -> NativeResult<u64> {
        let mut state = self.state.lock();
        state.enter(counter.metric())?;
        let device = state.device(device)?;
        let value = device
            .counters
            .get_mut(&counter)
            .ok_or(NativeStatus::NotSupported)?;
        let reading = *value;
        if counter == Counter::EnergyConsumption {
            *value = value.saturating_add(ENERGY_STEP_MJ);
        }
        Ok(reading)
    }

    fn read_text(&self, device: RawDevice, field: TextField) -> NativeResult<String> {
        let mut state = self.state.lock();
        state.enter(field.metric())?;
        state
            .device(device)?
            .text
            .get(&field)
            .cloned()
            .ok_or(NativeStatus::NotSupported)
    }

    fn memory_info(&self, device: RawDevice) -> NativeResult<MemoryInfo> {
        let mut state = self.state.lock();
        state.enter("memory info")?;
        state.device(device)?.memory.ok_or(NativeStatus::NotSupported)
    }

    fn ecc_mode(&self, device: RawDevice) -> NativeResult<EccMode> {
        let mut state = self.state.lock();
        state.enter("ECC mode")?;
        state.device(device)?.ecc.ok_or(NativeStatus::NotSupported)
    }

    fn mac_addresses(&self, device: RawDevice) -> NativeResult<Vec<MacAddress>> {
        let mut state = self.state.lock();
        state.enter("MAC address info")?;
        state
            .device(device)?
            .macs
            .clone()
            .ok_or(NativeStatus::NotSupported)
    }

    fn fw_version(&self, index: u32) -> NativeResult<FirmwareVersion> {
        let mut state = self.state.lock();
        state.enter("firmware version")?;
        state
            .devices
            .get(index as usize)
            .map(|d| d.firmware.clone())
            .ok_or(NativeStatus::InvalidArgument)
    }

    fn driver_version(&self) -> NativeResult<String> {
        let mut state = self.state.lock();
        state.enter("driver version")?;
        state.driver_version.clone().ok_or(NativeStatus::NotSupported)
    }

    fn event_set_create(&self) -> NativeResult<RawEventSet> {
        let mut state = self.state.lock();
        state.enter("event_set_create")?;
        let id = state.next_set;
        state.next_set += 1;
        state.sets.insert(id, SimEventSet::default());
        Ok(RawEventSet(id))
    }

    fn register_events(
        &self,
        set: RawEventSet,
        device: RawDevice,
        mask: EventTypes,
    ) -> NativeResult<()> {
        let mut state = self.state.lock();
        state.enter("register_events")?;
        if mask.is_empty() {
            return Err(NativeStatus::InvalidArgument);
        }
        let index = state.device_index(device)?;
        let observable = state.devices[index].observable;
        if (mask & observable).is_empty() {
            return Err(NativeStatus::NotSupported);
        }
        let set = state.sets.get_mut(&set.0).ok_or(NativeStatus::InvalidArgument)?;
        *set.subscriptions.entry(index).or_insert_with(EventTypes::empty) |= mask;
        Ok(())
    }

    fn event_set_poll(&self, set: RawEventSet) -> NativeResult<Option<RawEvent>> {
        let mut state = self.state.lock();
        // Polled in a loop by waiters; kept out of diagnostics.
        if !state.initialized {
            return Err(NativeStatus::Uninitialized);
        }
        let set = state.sets.get_mut(&set.0).ok_or(NativeStatus::InvalidArgument)?;
        Ok(set.pending.pop_front())
    }

    fn event_set_free(&self, set: RawEventSet) -> NativeResult<()> {
        let mut state = self.state.lock();
        state.enter("event_set_free")?;
        state
            .sets
            .remove(&set.0)
            .map(|_| ())
            .ok_or(NativeStatus::InvalidArgument)
    }
}
