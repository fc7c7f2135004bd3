// SPDX-License-Identifier: AGPL-3.0-only

//! habanalabs sysfs interface
//!
//! Reads the attributes the habanalabs kernel driver publishes per device:
//!
//! ```text
//! {root}/class/accel/accel0/dev                      major:minor
//! {root}/class/accel/accel0/device/device_type       GAUDI2
//! {root}/class/accel/accel0/device/serial_number
//! {root}/class/accel/accel0/device/pci_addr          0000:19:00.0
//! {root}/class/accel/accel0/device/hwmon/hwmon3/     temp*, power1_input, energy1_input
//! {root}/module/habanalabs/version
//! ```
//!
//! Older drivers use `class/habanalabs/hlN` instead of `class/accel/accelN`.
//! hwmon publishes milli-units; they are reported in whole units, truncated
//! toward zero (35999 m°C reads as 35 °C). Clock attributes in Hz are
//! likewise truncated to whole MHz.
//! Anything the driver does not publish is `NotSupported`; nothing is
//! estimated or defaulted.

use super::{
    Counter, InitFlags, InterfaceKind, NativeInterface, NativeResult, NativeStatus, RawDevice,
    RawEvent, RawEventSet, TextField,
};
use crate::events::EventTypes;
use crate::telemetry::{EccMode, FirmwareVersion, MacAddress, MemoryInfo, TemperatureThreshold};
use hlml_chip::clock::ClockDomain;
use hlml_chip::pcie::{self, ChipVariant};
use hlml_chip::status::DeviceStatus;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// Device class directories, newest driver first
const CLASS_DIRS: [(&str, &str); 2] = [("class/accel", "accel"), ("class/habanalabs", "hl")];

/// Event classes this interface can observe
const OBSERVABLE: EventTypes = EventTypes::CRITICAL_ERROR.union(EventTypes::THERMAL_VIOLATION);

#[derive(Debug, Clone)]
struct SysfsDevice {
    /// `class/accel/accelN`
    class_dir: PathBuf,
    /// `class/accel/accelN/device`
    device_dir: PathBuf,
    hwmon: Option<PathBuf>,
}

impl SysfsDevice {
    fn attr(&self, name: &str) -> PathBuf {
        self.device_dir.join(name)
    }

    fn hwmon_attr(&self, name: &str) -> NativeResult<PathBuf> {
        self.hwmon
            .as_ref()
            .map(|h| h.join(name))
            .ok_or(NativeStatus::NotSupported)
    }

    fn is_critical(&self) -> NativeResult<bool> {
        let status = read_attr(&self.attr("status"))?;
        Ok(DeviceStatus::from_sysfs_str(&status).is_critical())
    }

    fn is_thermal_violation(&self) -> NativeResult<bool> {
        let temp = read_u64(&self.hwmon_attr("temp1_input")?)?;
        let limit = read_u64(&self.hwmon_attr("temp1_max")?)?;
        Ok(temp >= limit)
    }

    fn observable(&self) -> EventTypes {
        let mut events = EventTypes::empty();
        if self.attr("status").is_file() {
            events |= EventTypes::CRITICAL_ERROR;
        }
        if self.is_thermal_violation().is_ok() {
            events |= EventTypes::THERMAL_VIOLATION;
        }
        events
    }
}

/// Edge-detection state for one subscribed device
#[derive(Debug)]
struct Subscription {
    device: usize,
    mask: EventTypes,
    critical: bool,
    thermal: bool,
}

#[derive(Debug, Default)]
struct SysfsEventSet {
    subscriptions: Vec<Subscription>,
    pending: VecDeque<RawEvent>,
}

#[derive(Debug, Default)]
struct SysfsState {
    open: bool,
    diagnostics: bool,
    devices: Vec<SysfsDevice>,
    sets: HashMap<u64, SysfsEventSet>,
    next_set: u64,
}

impl SysfsState {
    fn check_open(&self, call: &str) -> NativeResult<()> {
        if self.diagnostics {
            debug!(target: "hlml::native", "sysfs: {call}");
        }
        if self.open {
            Ok(())
        } else {
            Err(NativeStatus::Uninitialized)
        }
    }

    fn device(&self, device: RawDevice) -> NativeResult<&SysfsDevice> {
        usize::try_from(device.0)
            .ok()
            .and_then(|i| self.devices.get(i))
            .ok_or(NativeStatus::InvalidArgument)
    }
}

/// Native interface backed by the habanalabs driver's sysfs attributes.
#[derive(Debug)]
pub struct SysfsInterface {
    root: PathBuf,
    state: Mutex<SysfsState>,
}

impl SysfsInterface {
    /// Interface reading the sysfs tree mounted at `root` (normally `/sys`).
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            state: Mutex::new(SysfsState {
                next_set: 1,
                ..SysfsState::default()
            }),
        }
    }

    /// Whether the habanalabs driver is loaded under `root`.
    pub fn driver_present(root: &Path) -> bool {
        root.join("module/habanalabs").is_dir() || !scan_devices(root).is_empty()
    }
}

/// Enumerate device directories, sorted by minor index.
fn scan_devices(root: &Path) -> Vec<SysfsDevice> {
    for (class, prefix) in CLASS_DIRS {
        let Ok(entries) = std::fs::read_dir(root.join(class)) else {
            continue;
        };

        let mut found: Vec<(u32, PathBuf)> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name();
                let index = name.to_str()?.strip_prefix(prefix)?.parse().ok()?;
                Some((index, entry.path()))
            })
            .filter(|(_, path)| path.join("device/device_type").is_file())
            .collect();

        if found.is_empty() {
            continue;
        }
        found.sort_by_key(|(index, _)| *index);

        return found
            .into_iter()
            .map(|(_, class_dir)| {
                let device_dir = class_dir.join("device");
                let hwmon = find_hwmon(&device_dir);
                SysfsDevice {
                    class_dir,
                    device_dir,
                    hwmon,
                }
            })
            .collect();
    }
    Vec::new()
}

fn find_hwmon(device_dir: &Path) -> Option<PathBuf> {
    let mut dirs: Vec<PathBuf> = std::fs::read_dir(device_dir.join("hwmon"))
        .ok()?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("hwmon"))
        })
        .collect();
    dirs.sort();
    dirs.into_iter().next()
}

fn read_attr(path: &Path) -> NativeResult<String> {
    std::fs::read_to_string(path)
        .map(|s| s.trim().to_string())
        .map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => NativeStatus::NotSupported,
            io::ErrorKind::PermissionDenied => NativeStatus::NoPermission,
            _ => {
                warn!("Failed to read {}: {e}", path.display());
                NativeStatus::Unknown
            }
        })
}

fn read_u64(path: &Path) -> NativeResult<u64> {
    let text = read_attr(path)?;
    text.parse().map_err(|_| {
        warn!("{}: expected an integer, got '{text}'", path.display());
        NativeStatus::Unknown
    })
}

/// Read a milli-unit hwmon value (m°C, mW, mJ) in whole units, truncating.
fn read_milli(path: &Path) -> NativeResult<u64> {
    Ok(read_u64(path)? / 1000)
}

fn read_hex(path: &Path) -> NativeResult<u64> {
    let text = read_attr(path)?;
    let digits = text.trim_start_matches("0x").trim_start_matches("0X");
    u64::from_str_radix(digits, 16).map_err(|_| {
        warn!("{}: expected a hex value, got '{text}'", path.display());
        NativeStatus::Unknown
    })
}

fn read_clock(dev: &SysfsDevice, domain: ClockDomain, max: bool) -> NativeResult<u64> {
    if domain == ClockDomain::Soc {
        let name = if max { "clk_max_freq_mhz" } else { "clk_cur_freq_mhz" };
        return read_u64(&dev.attr(name));
    }
    let suffix = if max { "clk" } else { "clk_curr" };
    let hz = read_u64(&dev.attr(&format!("{}_{suffix}", domain.as_str())))?;
    Ok(hz / 1_000_000)
}

fn bus_field(dev: &SysfsDevice, pick: impl Fn((u32, u32, u32, u32)) -> u32) -> NativeResult<u64> {
    let bus_id = read_attr(&dev.attr("pci_addr"))?;
    pcie::parse_bus_id(&bus_id)
        .map(|parts| u64::from(pick(parts)))
        .ok_or(NativeStatus::Unknown)
}

fn read_counter(dev: &SysfsDevice, counter: Counter) -> NativeResult<u64> {
    match counter {
        Counter::MinorNumber => {
            let dev_no = read_attr(&dev.class_dir.join("dev"))?;
            dev_no
                .split_once(':')
                .and_then(|(_, minor)| minor.parse().ok())
                .ok_or(NativeStatus::Unknown)
        }
        Counter::BoardId => read_u64(&dev.attr("module_id")),
        Counter::Clock(domain) => read_clock(dev, domain, false),
        Counter::MaxClock(domain) => read_clock(dev, domain, true),
        Counter::PowerUsage => read_milli(&dev.hwmon_attr("power1_input")?),
        Counter::PowerDefaultLimit => read_u64(&dev.attr("max_power")),
        Counter::TemperatureOnChip => read_milli(&dev.hwmon_attr("temp1_input")?),
        Counter::TemperatureOnBoard => read_milli(&dev.hwmon_attr("temp2_input")?),
        Counter::TemperatureThreshold(TemperatureThreshold::Shutdown) => {
            read_milli(&dev.hwmon_attr("temp1_crit")?)
        }
        Counter::TemperatureThreshold(TemperatureThreshold::Slowdown) => {
            read_milli(&dev.hwmon_attr("temp1_max")?)
        }
        Counter::PciDomain => bus_field(dev, |(domain, ..)| domain),
        Counter::PciBus => bus_field(dev, |(_, bus, ..)| bus),
        Counter::PciId => {
            let vendor = u16::try_from(read_hex(&dev.attr("vendor"))?)
                .map_err(|_| NativeStatus::Unknown)?;
            let device = u16::try_from(read_hex(&dev.attr("device"))?)
                .map_err(|_| NativeStatus::Unknown)?;
            Ok(u64::from(pcie::pci_device_id(vendor, device)))
        }
        Counter::PcieLinkGeneration => {
            let speed = read_attr(&dev.attr("current_link_speed"))?;
            pcie::generation_from_link_speed(&speed)
                .map(u64::from)
                .ok_or(NativeStatus::Unknown)
        }
        Counter::PcieLinkWidth => {
            let width = read_attr(&dev.attr("current_link_width"))?;
            width
                .trim_start_matches('x')
                .parse()
                .map_err(|_| NativeStatus::Unknown)
        }
        Counter::EnergyConsumption => read_milli(&dev.hwmon_attr("energy1_input")?),
        Counter::HlRevision => read_hex(&dev.attr("revision")),
        Counter::Utilization
        | Counter::TemperatureThreshold(TemperatureThreshold::Memory | TemperatureThreshold::Gpu)
        | Counter::EccVolatile(_)
        | Counter::EccAggregate(_)
        | Counter::ReplacedRows(_)
        | Counter::ReplacedRowsPending
        | Counter::PcieTx
        | Counter::PcieRx
        | Counter::PcieReplayCounter => Err(NativeStatus::NotSupported),
    }
}

fn read_text(dev: &SysfsDevice, field: TextField) -> NativeResult<String> {
    match field {
        TextField::Name => {
            let device_type = read_attr(&dev.attr("device_type"))?;
            // Unrecognised device_type: fall back to the PCI device id.
            let variant = match ChipVariant::from_device_type(&device_type) {
                ChipVariant::Unknown(_) => read_hex(&dev.attr("device"))
                    .ok()
                    .and_then(|id| u16::try_from(id).ok())
                    .map_or(ChipVariant::Unknown(0), ChipVariant::from_device_id),
                known => known,
            };
            Ok(variant.product_name().to_string())
        }
        TextField::Uuid => match read_attr(&dev.attr("uuid")) {
            Err(NativeStatus::NotSupported) => {
                // Stable across reboots as long as the serial is.
                let serial = read_attr(&dev.attr("serial_number"))?;
                let name = format!("habana:{serial}");
                Ok(Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string())
            }
            other => other,
        },
        TextField::SerialNumber => read_attr(&dev.attr("serial_number")),
        TextField::PciBusId => read_attr(&dev.attr("pci_addr")),
        TextField::PciLinkSpeed => read_attr(&dev.attr("current_link_speed")),
        TextField::PciLinkWidth => read_attr(&dev.attr("current_link_width")),
        TextField::PcbVersion | TextField::PcbAssemblyVersion => Err(NativeStatus::NotSupported),
    }
}

impl NativeInterface for SysfsInterface {
    fn kind(&self) -> InterfaceKind {
        InterfaceKind::Sysfs
    }

    fn init(&self, flags: InitFlags) -> NativeResult<()> {
        let mut state = self.state.lock();
        if state.open {
            return Err(NativeStatus::AlreadyInitialized);
        }
        if !Self::driver_present(&self.root) {
            return Err(NativeStatus::DriverNotLoaded);
        }

        state.devices = scan_devices(&self.root);
        state.open = true;
        state.diagnostics = flags.diagnostics;

        if flags.diagnostics {
            for dev in &state.devices {
                debug!(
                    target: "hlml::native",
                    "sysfs: {} (hwmon: {})",
                    dev.class_dir.display(),
                    dev.hwmon.as_ref().map_or("none".into(), |h| h.display().to_string())
                );
            }
        }
        Ok(())
    }

    fn shutdown(&self) -> NativeResult<()> {
        let mut state = self.state.lock();
        state.check_open("shutdown")?;
        state.sets.clear();
        state.devices.clear();
        state.open = false;
        state.diagnostics = false;
        Ok(())
    }

    fn device_count(&self) -> NativeResult<u32> {
        let state = self.state.lock();
        state.check_open("device_count")?;
        u32::try_from(state.devices.len()).map_err(|_| NativeStatus::Unknown)
    }

    fn device_by_index(&self, index: u32) -> NativeResult<RawDevice> {
        let state = self.state.lock();
        state.check_open("device_by_index")?;
        if (index as usize) < state.devices.len() {
            Ok(RawDevice(u64::from(index)))
        } else {
            Err(NativeStatus::InvalidArgument)
        }
    }

    fn read_counter(&self, device: RawDevice, counter: Counter) -> NativeResult<u64> {
        let state = self.state.lock();
        state.check_open(counter.metric())?;
        read_counter(state.device(device)?, counter)
    }

    fn read_text(&self, device: RawDevice, field: TextField) -> NativeResult<String> {
        let state = self.state.lock();
        state.check_open(field.metric())?;
        read_text(state.device(device)?, field)
    }

    fn memory_info(&self, device: RawDevice) -> NativeResult<MemoryInfo> {
        let state = self.state.lock();
        state.check_open("memory info")?;
        state.device(device)?;
        Err(NativeStatus::NotSupported)
    }

    fn ecc_mode(&self, device: RawDevice) -> NativeResult<EccMode> {
        let state = self.state.lock();
        state.check_open("ECC mode")?;
        state.device(device)?;
        Err(NativeStatus::NotSupported)
    }

    fn mac_addresses(&self, device: RawDevice) -> NativeResult<Vec<MacAddress>> {
        let state = self.state.lock();
        state.check_open("MAC address info")?;
        state.device(device)?;
        Err(NativeStatus::NotSupported)
    }

    fn fw_version(&self, index: u32) -> NativeResult<FirmwareVersion> {
        let state = self.state.lock();
        state.check_open("firmware version")?;
        let dev = state
            .devices
            .get(index as usize)
            .ok_or(NativeStatus::InvalidArgument)?;

        let kernel = match read_attr(&dev.attr("cpucp_kernel_ver")) {
            Err(NativeStatus::NotSupported) => read_attr(&dev.attr("armcp_kernel_ver"))?,
            other => other?,
        };
        let uboot = read_attr(&dev.attr("uboot_ver"))?;
        Ok(FirmwareVersion { kernel, uboot })
    }

    fn driver_version(&self) -> NativeResult<String> {
        let state = self.state.lock();
        state.check_open("driver version")?;
        read_attr(&self.root.join("module/habanalabs/version"))
    }

    fn event_set_create(&self) -> NativeResult<RawEventSet> {
        let mut state = self.state.lock();
        state.check_open("event_set_create")?;
        let id = state.next_set;
        state.next_set += 1;
        state.sets.insert(id, SysfsEventSet::default());
        Ok(RawEventSet(id))
    }

    fn register_events(
        &self,
        set: RawEventSet,
        device: RawDevice,
        mask: EventTypes,
    ) -> NativeResult<()> {
        let mut state = self.state.lock();
        state.check_open("register_events")?;
        if mask.is_empty() {
            return Err(NativeStatus::InvalidArgument);
        }

        let dev = state.device(device)?;
        let observed = mask & OBSERVABLE & dev.observable();
        if observed.is_empty() {
            return Err(NativeStatus::NotSupported);
        }
        if observed != mask {
            debug!(
                "sysfs: {} cannot observe {:?}",
                dev.class_dir.display(),
                mask - observed
            );
        }

        // Baseline, so a condition already present at registration is not
        // reported as a new event.
        let index = usize::try_from(device.0).map_err(|_| NativeStatus::InvalidArgument)?;
        let critical = dev.is_critical().unwrap_or(false);
        let thermal = dev.is_thermal_violation().unwrap_or(false);

        let set = state.sets.get_mut(&set.0).ok_or(NativeStatus::InvalidArgument)?;
        match set.subscriptions.iter_mut().find(|s| s.device == index) {
            Some(existing) => {
                // Classes already watched keep their edge state.
                if !existing.mask.contains(EventTypes::CRITICAL_ERROR) {
                    existing.critical = critical;
                }
                if !existing.mask.contains(EventTypes::THERMAL_VIOLATION) {
                    existing.thermal = thermal;
                }
                existing.mask |= observed;
            }
            None => set.subscriptions.push(Subscription {
                device: index,
                mask: observed,
                critical,
                thermal,
            }),
        }
        Ok(())
    }

    fn event_set_poll(&self, set: RawEventSet) -> NativeResult<Option<RawEvent>> {
        let mut state = self.state.lock();
        if !state.open {
            return Err(NativeStatus::Uninitialized);
        }

        let SysfsState { devices, sets, .. } = &mut *state;
        let set = sets.get_mut(&set.0).ok_or(NativeStatus::InvalidArgument)?;

        for sub in &mut set.subscriptions {
            let Some(dev) = devices.get(sub.device) else {
                continue;
            };
            let raw = RawDevice(sub.device as u64);

            if sub.mask.contains(EventTypes::CRITICAL_ERROR) {
                if let Ok(critical) = dev.is_critical() {
                    if critical && !sub.critical {
                        set.pending.push_back(RawEvent {
                            device: raw,
                            event_type: EventTypes::CRITICAL_ERROR,
                        });
                    }
                    sub.critical = critical;
                }
            }

            if sub.mask.contains(EventTypes::THERMAL_VIOLATION) {
                if let Ok(thermal) = dev.is_thermal_violation() {
                    if thermal && !sub.thermal {
                        set.pending.push_back(RawEvent {
                            device: raw,
                            event_type: EventTypes::THERMAL_VIOLATION,
                        });
                    }
                    sub.thermal = thermal;
                }
            }
        }

        Ok(set.pending.pop_front())
    }

    fn event_set_free(&self, set: RawEventSet) -> NativeResult<()> {
        let mut state = self.state.lock();
        state.check_open("event_set_free")?;
        state
            .sets
            .remove(&set.0)
            .map(|_| ())
            .ok_or(NativeStatus::InvalidArgument)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn read_attr_maps_missing_to_not_supported() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            read_attr(&dir.path().join("nope")),
            Err(NativeStatus::NotSupported)
        );
    }

    #[test]
    fn hex_and_int_parsing() {
        let dir = tempfile::tempdir().unwrap();
        let hex = dir.path().join("vendor");
        write(&hex, "0x1da3\n");
        assert_eq!(read_hex(&hex), Ok(0x1da3));

        let bad = dir.path().join("bad");
        write(&bad, "n/a\n");
        assert_eq!(read_u64(&bad), Err(NativeStatus::Unknown));
    }

    #[test]
    fn scan_prefers_accel_class_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        for n in [10, 2] {
            write(
                &dir.path().join(format!("class/accel/accel{n}/device/device_type")),
                "GAUDI2\n",
            );
        }
        // control nodes carry no device_type
        fs::create_dir_all(dir.path().join("class/accel/accel_controlD0")).unwrap();

        let devices = scan_devices(dir.path());
        assert_eq!(devices.len(), 2);
        assert!(devices[0].class_dir.ends_with("accel2"));
        assert!(devices[1].class_dir.ends_with("accel10"));
    }

    #[test]
    fn driver_absent_on_empty_root() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!SysfsInterface::driver_present(dir.path()));
        let sysfs = SysfsInterface::new(dir.path());
        assert_eq!(
            sysfs.init(InitFlags::default()),
            Err(NativeStatus::DriverNotLoaded)
        );
    }
}
