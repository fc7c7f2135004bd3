// SPDX-License-Identifier: AGPL-3.0-only

//! Library lifecycle
//!
//! One [`Library`] owns one state machine:
//!
//! ```text
//!  Uninitialized ──initialize()──▶ Initialized(epoch N)
//!        ▲                              │
//!        └──────────shutdown()──────────┘
//! ```
//!
//! Transitions and every native call happen under a single mutex. Each
//! successful `initialize` mints a new epoch; handles and event sets carry
//! the epoch they were created in and fail with `InvalidHandle` once it is
//! gone. Re-initializing is explicit: calling `initialize` twice is an error,
//! not a no-op.

use crate::config::Config;
use crate::error::{HlmlError, Result};
use crate::native::{
    select_interface, InitFlags, NativeInterface, RawDevice, RawEventSet, TextField,
};
use crate::telemetry::FirmwareVersion;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Observable lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LibraryState {
    /// No native context; nothing may be queried
    Uninitialized,
    /// Native context open, devices enumerated
    Initialized,
}

/// Generation of one initialize/shutdown cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct Epoch(u64);

impl Epoch {
    const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

/// Where `initialize` gets its native interface from
enum InterfaceSource {
    /// Chosen from the configuration on every `initialize`
    Select,
    /// Supplied by the caller, reused across cycles
    Fixed(Arc<dyn NativeInterface>),
}

/// One enumerated device, cached for the lifetime of a session
#[derive(Debug, Clone)]
pub(crate) struct EnumeratedDevice {
    pub(crate) index: u32,
    pub(crate) raw: RawDevice,
    pub(crate) uuid: Option<String>,
    pub(crate) serial: Option<String>,
}

/// Everything that only exists while `Initialized`
pub(crate) struct Session {
    pub(crate) epoch: Epoch,
    pub(crate) native: Arc<dyn NativeInterface>,
    pub(crate) devices: Vec<EnumeratedDevice>,
    pub(crate) event_sets: Vec<RawEventSet>,
    diagnostics: bool,
}

impl Session {
    pub(crate) fn device_count(&self) -> u32 {
        // Enumeration stops at the native count, which is a u32.
        #[allow(clippy::cast_possible_truncation)]
        let count = self.devices.len() as u32;
        count
    }

    pub(crate) fn device_by_raw(&self, raw: RawDevice) -> Option<&EnumeratedDevice> {
        self.devices.iter().find(|d| d.raw == raw)
    }
}

pub(crate) enum Phase {
    Uninitialized,
    Initialized(Session),
}

/// State guarded by the library lock
pub(crate) struct Core {
    pub(crate) phase: Phase,
    pub(crate) config: Config,
    /// Set when the configuration could not be loaded; fails `initialize`
    /// until a configuration is supplied.
    config_error: Option<HlmlError>,
    last_epoch: Epoch,
}

impl Core {
    /// Current session, `NotInitialized` if there is none.
    pub(crate) fn session(&mut self) -> Result<&mut Session> {
        match &mut self.phase {
            Phase::Initialized(session) => Ok(session),
            Phase::Uninitialized => Err(HlmlError::NotInitialized),
        }
    }

    /// Current session, additionally checking that `epoch` is still live.
    pub(crate) fn session_for(&mut self, epoch: Epoch) -> Result<&mut Session> {
        let session = self.session()?;
        if session.epoch == epoch {
            Ok(session)
        } else {
            Err(HlmlError::InvalidHandle)
        }
    }
}

/// State shared by a library and every handle it hands out
pub(crate) struct Shared {
    core: Mutex<Core>,
    /// Signalled on shutdown so blocked event waits return promptly
    pub(crate) wakeup: Condvar,
    source: InterfaceSource,
}

impl Shared {
    pub(crate) fn lock(&self) -> MutexGuard<'_, Core> {
        self.core.lock()
    }
}

/// An HLML library instance.
///
/// Most programs use the process-wide functions in the crate root
/// ([`crate::initialize`], [`crate::device_count`], ...), which wrap a single
/// `Library`. Constructing instances directly is useful for tests and for
/// driving a specific [`NativeInterface`].
///
/// # Handle validity
///
/// A [`DeviceHandle`](crate::DeviceHandle) or [`EventSet`](crate::EventSet)
/// is valid from the `initialize` that produced it until the next `shutdown`.
/// Using one afterwards is a contract violation; it fails with
/// `InvalidHandle` or `NotInitialized` rather than touching released native
/// state.
pub struct Library {
    pub(crate) shared: Arc<Shared>,
}

impl Library {
    /// Create an uninitialized library that picks its native interface from
    /// `config` on every `initialize`.
    pub fn new(config: Config) -> Self {
        Self::build(InterfaceSource::Select, config)
    }

    /// Create an uninitialized library configured from the `HLML_*`
    /// environment variables.
    ///
    /// An unparseable variable is not ignored: it is reported as
    /// `HlmlError::Config` by every `initialize` until
    /// [`Library::set_config`] supplies a configuration.
    pub fn from_env() -> Self {
        Self::from_config_result(Config::from_env())
    }

    pub(crate) fn from_config_result(config: Result<Config>) -> Self {
        match config {
            Ok(config) => Self::new(config),
            Err(e) => {
                warn!("{e}");
                let library = Self::new(Config::default());
                library.shared.lock().config_error = Some(e);
                library
            }
        }
    }

    /// Create an uninitialized library bound to a specific native interface.
    pub fn with_interface(native: Arc<dyn NativeInterface>) -> Self {
        Self::build(InterfaceSource::Fixed(native), Config::default())
    }

    /// Replace the configuration (takes effect at the next `initialize`;
    /// the event poll interval applies immediately).
    #[must_use]
    pub fn with_config(self, config: Config) -> Self {
        self.set_config(config);
        self
    }

    fn build(source: InterfaceSource, config: Config) -> Self {
        Self {
            shared: Arc::new(Shared {
                core: Mutex::new(Core {
                    phase: Phase::Uninitialized,
                    config,
                    config_error: None,
                    last_epoch: Epoch(0),
                }),
                wakeup: Condvar::new(),
                source,
            }),
        }
    }

    /// Replace the configuration in place.
    pub fn set_config(&self, config: Config) {
        let mut core = self.shared.lock();
        core.config = config;
        core.config_error = None;
    }

    /// Current configuration.
    pub fn config(&self) -> Config {
        self.shared.lock().config.clone()
    }

    /// Open the native interface and enumerate devices.
    ///
    /// # Errors
    ///
    /// `AlreadyInitialized` if called while initialized; any translated
    /// native failure from opening the interface or enumerating devices.
    pub fn initialize(&self) -> Result<()> {
        self.start(InitFlags { diagnostics: false })
    }

    /// Like [`Library::initialize`], additionally enabling verbose
    /// diagnostics in the native layer.
    ///
    /// # Errors
    ///
    /// Same as [`Library::initialize`].
    pub fn initialize_with_diagnostics(&self) -> Result<()> {
        self.start(InitFlags { diagnostics: true })
    }

    fn start(&self, flags: InitFlags) -> Result<()> {
        let mut core = self.shared.lock();

        if let Phase::Initialized(session) = &core.phase {
            warn!("initialize called while already initialized (epoch {})", session.epoch.0);
            return Err(HlmlError::AlreadyInitialized);
        }
        if let Some(e) = &core.config_error {
            return Err(e.clone());
        }

        let native = match &self.shared.source {
            InterfaceSource::Select => select_interface(&core.config)?,
            InterfaceSource::Fixed(native) => Arc::clone(native),
        };

        debug!("Initializing {} interface", native.kind());
        native.init(flags).map_err(|s| s.into_error("initialize"))?;

        let devices = match enumerate(native.as_ref()) {
            Ok(devices) => devices,
            Err(e) => {
                error!("Device enumeration failed: {e}");
                if let Err(status) = native.shutdown() {
                    warn!("Native shutdown after failed enumeration: {status}");
                }
                return Err(e);
            }
        };

        let epoch = core.last_epoch.next();
        core.last_epoch = epoch;

        info!(
            "HLML initialized via {} interface: {} device(s), epoch {}{}",
            native.kind(),
            devices.len(),
            epoch.0,
            if flags.diagnostics { ", diagnostics on" } else { "" }
        );

        core.phase = Phase::Initialized(Session {
            epoch,
            native,
            devices,
            event_sets: Vec::new(),
            diagnostics: flags.diagnostics,
        });

        Ok(())
    }

    /// Release every event set, close the native interface and invalidate
    /// all outstanding handles.
    ///
    /// Blocked [`EventSet::wait`](crate::EventSet::wait) calls are woken and
    /// return `NotInitialized`.
    ///
    /// # Errors
    ///
    /// `NotInitialized` if not initialized. A native shutdown failure is
    /// reported, but the library is `Uninitialized` afterwards regardless.
    pub fn shutdown(&self) -> Result<()> {
        let mut core = self.shared.lock();

        let Phase::Initialized(session) =
            std::mem::replace(&mut core.phase, Phase::Uninitialized)
        else {
            warn!("shutdown called while not initialized");
            return Err(HlmlError::NotInitialized);
        };

        for set in &session.event_sets {
            debug!("Releasing event set {} at shutdown", set.0);
            if let Err(status) = session.native.event_set_free(*set) {
                warn!("Failed to release event set {}: {status}", set.0);
            }
        }

        let result = session.native.shutdown();
        drop(core);
        self.shared.wakeup.notify_all();

        info!("HLML shut down (epoch {})", session.epoch.0);
        result.map_err(|s| s.into_error("shutdown"))
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LibraryState {
        match self.shared.lock().phase {
            Phase::Initialized(_) => LibraryState::Initialized,
            Phase::Uninitialized => LibraryState::Uninitialized,
        }
    }

    /// Whether the library is initialized.
    pub fn is_initialized(&self) -> bool {
        self.state() == LibraryState::Initialized
    }

    /// Whether the current session was opened with diagnostics.
    ///
    /// # Errors
    ///
    /// `NotInitialized` if not initialized.
    pub fn diagnostics_enabled(&self) -> Result<bool> {
        Ok(self.shared.lock().session()?.diagnostics)
    }

    /// Number of enumerated devices.
    ///
    /// # Errors
    ///
    /// `NotInitialized` if not initialized.
    pub fn device_count(&self) -> Result<u32> {
        Ok(self.shared.lock().session()?.device_count())
    }

    /// Kernel and U-Boot firmware versions of the device at `index`.
    ///
    /// # Errors
    ///
    /// `NotInitialized`, `InvalidIndex` for an index out of range, or a
    /// translated native failure.
    pub fn fw_version(&self, index: u32) -> Result<FirmwareVersion> {
        let mut core = self.shared.lock();
        let session = core.session()?;
        let count = session.device_count();
        if index >= count {
            return Err(HlmlError::InvalidIndex { index, count });
        }
        session
            .native
            .fw_version(index)
            .map_err(|s| s.into_error("firmware version"))
    }

    /// Version of the installed kernel driver.
    ///
    /// # Errors
    ///
    /// `NotInitialized` or a translated native failure.
    pub fn system_driver_version(&self) -> Result<String> {
        let mut core = self.shared.lock();
        core.session()?
            .native
            .driver_version()
            .map_err(|s| s.into_error("driver version"))
    }
}

impl fmt::Debug for Library {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Library")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Drop for Library {
    fn drop(&mut self) {
        if self.is_initialized() {
            debug!("Library dropped while initialized, shutting down");
            if let Err(e) = self.shutdown() {
                warn!("Shutdown on drop failed: {e}");
            }
        }
    }
}

/// Walk the native device list, caching the identity of each device.
///
/// A device whose UUID or serial cannot be read is still enumerated; it just
/// cannot be found by that identity.
fn enumerate(native: &dyn NativeInterface) -> Result<Vec<EnumeratedDevice>> {
    let count = native
        .device_count()
        .map_err(|s| s.into_error("device count"))?;

    let mut devices = Vec::new();
    for index in 0..count {
        let raw = native
            .device_by_index(index)
            .map_err(|s| s.into_error("device handle"))?;

        let uuid = native
            .read_text(raw, TextField::Uuid)
            .map_err(|s| warn!("Device {index}: UUID unavailable: {s}"))
            .ok();
        let serial = native
            .read_text(raw, TextField::SerialNumber)
            .map_err(|s| warn!("Device {index}: serial unavailable: {s}"))
            .ok();

        debug!(
            "Device {index}: uuid={} serial={}",
            uuid.as_deref().unwrap_or("-"),
            serial.as_deref().unwrap_or("-")
        );

        devices.push(EnumeratedDevice {
            index,
            raw,
            uuid,
            serial,
        });
    }

    Ok(devices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::{NativeStatus, SimulatedInterface};
    use std::thread;

    fn library(devices: u32) -> (Library, SimulatedInterface) {
        let sim = SimulatedInterface::new(devices);
        (Library::with_interface(Arc::new(sim.clone())), sim)
    }

    #[test]
    fn epochs_increase_per_cycle() {
        let (lib, _sim) = library(1);
        lib.initialize().unwrap();
        let first = lib.shared.lock().session().unwrap().epoch;
        lib.shutdown().unwrap();
        lib.initialize().unwrap();
        let second = lib.shared.lock().session().unwrap().epoch;
        assert!(second > first);
        lib.shutdown().unwrap();
    }

    #[test]
    fn failed_native_init_leaves_library_uninitialized() {
        let (lib, sim) = library(2);
        sim.fail_next_call(NativeStatus::DriverNotLoaded);

        let err = lib.initialize().unwrap_err();
        assert_eq!(err, HlmlError::native(NativeStatus::DriverNotLoaded));
        assert_eq!(lib.state(), LibraryState::Uninitialized);

        lib.initialize().unwrap();
        assert_eq!(lib.device_count().unwrap(), 2);
        lib.shutdown().unwrap();
    }

    #[test]
    fn failed_enumeration_closes_native_interface() {
        let (lib, sim) = library(2);
        // init succeeds, the device count query fails
        sim.fail_call_after(1, NativeStatus::Unknown);

        assert!(lib.initialize().is_err());
        assert!(!sim.is_initialized());
        assert_eq!(lib.state(), LibraryState::Uninitialized);
    }

    #[test]
    fn racing_initializers_exactly_one_wins() {
        let (lib, _sim) = library(4);
        let lib = Arc::new(lib);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let lib = Arc::clone(&lib);
                thread::spawn(move || lib.initialize().is_ok())
            })
            .collect();

        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(wins, 1);
        lib.shutdown().unwrap();
    }

    #[test]
    fn diagnostics_flag_recorded() {
        let (lib, sim) = library(1);
        lib.initialize_with_diagnostics().unwrap();
        assert!(lib.diagnostics_enabled().unwrap());
        assert!(sim.diagnostics_enabled());
        lib.shutdown().unwrap();

        lib.initialize().unwrap();
        assert!(!lib.diagnostics_enabled().unwrap());
        lib.shutdown().unwrap();
    }

    #[test]
    fn drop_shuts_down() {
        let (lib, sim) = library(1);
        lib.initialize().unwrap();
        drop(lib);
        assert!(!sim.is_initialized());
    }

    #[test]
    fn fw_version_index_checked() {
        let (lib, _sim) = library(2);
        lib.initialize().unwrap();
        assert!(lib.fw_version(1).is_ok());
        assert_eq!(
            lib.fw_version(2).unwrap_err(),
            HlmlError::InvalidIndex { index: 2, count: 2 }
        );
        lib.shutdown().unwrap();
        assert_eq!(lib.fw_version(0).unwrap_err(), HlmlError::NotInitialized);
    }

    #[test]
    fn unparseable_config_fails_initialize_until_replaced() {
        let loaded = Config::from_lookup(|key| {
            (key == "HLML_BACKEND").then(|| "simulatd".to_string())
        });
        let lib = Library::from_config_result(loaded);

        assert!(matches!(lib.initialize(), Err(HlmlError::Config { .. })));
        assert!(matches!(lib.initialize(), Err(HlmlError::Config { .. })));
        assert_eq!(lib.state(), LibraryState::Uninitialized);

        lib.set_config(Config::simulated(2));
        lib.initialize().unwrap();
        assert_eq!(lib.device_count().unwrap(), 2);
        lib.shutdown().unwrap();
    }
}
