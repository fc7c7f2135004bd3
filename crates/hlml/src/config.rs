// SPDX-License-Identifier: AGPL-3.0-only

//! Access-layer configuration
//!
//! Read from the environment:
//!
//! | Variable | Meaning | Default |
//! |----------|---------|---------|
//! | `HLML_BACKEND` | `auto`, `sysfs` or `simulated` | `auto` |
//! | `HLML_SYSFS_ROOT` | sysfs mount point | `/sys` |
//! | `HLML_SIM_DEVICES` | simulated device count | `8` |
//! | `HLML_EVENT_POLL_MS` | event wait poll interval (ms, ≥ 1) | `10` |

use crate::error::{HlmlError, Result};
use crate::native::InterfaceSelection;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Default simulated fleet size (one 8-card server)
pub const DEFAULT_SIMULATED_DEVICES: u32 = 8;

/// Default poll interval for [`EventSet::wait`](crate::EventSet::wait)
pub const DEFAULT_EVENT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Access-layer configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Which native interface `initialize` opens
    pub interface: InterfaceSelection,
    /// sysfs mount point used by the sysfs interface
    pub sysfs_root: PathBuf,
    /// Number of devices in the simulated fleet
    pub simulated_devices: u32,
    /// How often a blocked event wait re-polls the native set
    pub event_poll_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interface: InterfaceSelection::Auto,
            sysfs_root: PathBuf::from("/sys"),
            simulated_devices: DEFAULT_SIMULATED_DEVICES,
            event_poll_interval: DEFAULT_EVENT_POLL_INTERVAL,
        }
    }
}

impl Config {
    /// Configuration for a simulated fleet of `devices` accelerators.
    pub fn simulated(devices: u32) -> Self {
        Self {
            interface: InterfaceSelection::Simulated,
            simulated_devices: devices,
            ..Self::default()
        }
    }

    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `HlmlError::Config` if a variable is set but cannot be parsed.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns `HlmlError::Config` if a value is present but cannot be parsed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(backend) = lookup("HLML_BACKEND") {
            config.interface = backend.parse()?;
        }

        if let Some(root) = lookup("HLML_SYSFS_ROOT") {
            config.sysfs_root = PathBuf::from(root);
        }

        if let Some(count) = lookup("HLML_SIM_DEVICES") {
            config.simulated_devices = count.trim().parse().map_err(|e| {
                HlmlError::config(format!("HLML_SIM_DEVICES='{count}': {e}"))
            })?;
        }

        if let Some(ms) = lookup("HLML_EVENT_POLL_MS") {
            let ms: u64 = ms
                .trim()
                .parse()
                .map_err(|e| HlmlError::config(format!("HLML_EVENT_POLL_MS='{ms}': {e}")))?;
            config = config.with_event_poll_interval(Duration::from_millis(ms))?;
        }

        debug!("Loaded configuration: {config:?}");
        Ok(config)
    }

    /// Set the sysfs mount point.
    #[must_use]
    pub fn with_sysfs_root(mut self, root: impl AsRef<Path>) -> Self {
        self.sysfs_root = root.as_ref().to_path_buf();
        self
    }

    /// Set the event wait poll interval.
    ///
    /// # Errors
    ///
    /// A zero interval would spin; it is rejected with `HlmlError::Config`.
    pub fn with_event_poll_interval(mut self, interval: Duration) -> Result<Self> {
        if interval.is_zero() {
            return Err(HlmlError::config("event poll interval must be at least 1 ms"));
        }
        self.event_poll_interval = interval;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = Config::from_lookup(|_| None).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.sysfs_root, PathBuf::from("/sys"));
    }

    #[test]
    fn reads_every_variable() {
        let config = Config::from_lookup(lookup(&[
            ("HLML_BACKEND", "simulated"),
            ("HLML_SYSFS_ROOT", "/tmp/fake-sys"),
            ("HLML_SIM_DEVICES", "2"),
            ("HLML_EVENT_POLL_MS", "25"),
        ]))
        .unwrap();

        assert_eq!(config.interface, InterfaceSelection::Simulated);
        assert_eq!(config.sysfs_root, PathBuf::from("/tmp/fake-sys"));
        assert_eq!(config.simulated_devices, 2);
        assert_eq!(config.event_poll_interval, Duration::from_millis(25));
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            Config::from_lookup(lookup(&[("HLML_SIM_DEVICES", "many")])),
            Err(HlmlError::Config { .. })
        ));
        assert!(matches!(
            Config::from_lookup(lookup(&[("HLML_EVENT_POLL_MS", "0")])),
            Err(HlmlError::Config { .. })
        ));
        assert!(matches!(
            Config::from_lookup(lookup(&[("HLML_BACKEND", "cuda")])),
            Err(HlmlError::Config { .. })
        ));
    }
}
