// SPDX-License-Identifier: AGPL-3.0-only

//! Asynchronous hardware event notification
//!
//! An [`EventSet`] collects subscriptions `(device, event classes)` and lets
//! one or more threads block until one of them fires:
//!
//! ```text
//! new_event_set() ─▶ register(dev, mask)* ─▶ wait(timeout)* ─▶ delete()
//! ```
//!
//! `wait` polls the native set under the library lock, then sleeps on the
//! library condvar with the lock released. Shutdown signals the condvar, so a
//! wait with no timeout still returns once the library goes away.

use crate::device::DeviceHandle;
use crate::error::{HlmlError, Result};
use crate::lifecycle::{Epoch, Library, Shared};
use crate::native::{NativeStatus, RawEventSet};
use bitflags::bitflags;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

bitflags! {
    /// Hardware event classes
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EventTypes: u64 {
        /// ECC error detected
        const ECC_ERROR = 1 << 0;
        /// Device entered a critical (needs reset / malfunction) state
        const CRITICAL_ERROR = 1 << 1;
        /// Clock rate changed
        const CLOCK_RATE = 1 << 2;
        /// Power event
        const POWER = 1 << 3;
        /// Temperature crossed the slowdown threshold
        const THERMAL_VIOLATION = 1 << 4;
        /// PCIe or NIC link state changed
        const LINK_STATE = 1 << 5;
    }
}

/// An event delivered by [`EventSet::wait`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventData {
    /// Device the event fired on
    pub device: DeviceHandle,
    /// Class of the event
    pub event_type: EventTypes,
}

/// Result of a wait
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    /// An event was ready
    Event(EventData),
    /// The timeout elapsed with nothing ready
    TimedOut,
}

impl EventOutcome {
    /// The event, if one was delivered.
    pub fn event(self) -> Option<EventData> {
        match self {
            Self::Event(data) => Some(data),
            Self::TimedOut => None,
        }
    }

    /// Whether the wait timed out.
    pub const fn is_timed_out(&self) -> bool {
        matches!(self, Self::TimedOut)
    }
}

/// A native event set bound to one initialize cycle.
///
/// Released by [`EventSet::delete`] or on drop; shutdown releases every set
/// that is still open.
pub struct EventSet {
    shared: Arc<Shared>,
    epoch: Epoch,
    raw: RawEventSet,
    released: bool,
}

impl Library {
    /// Allocate an empty event set.
    ///
    /// # Errors
    ///
    /// `NotInitialized`, or a translated native failure.
    pub fn new_event_set(&self) -> Result<EventSet> {
        let mut core = self.shared.lock();
        let session = core.session()?;
        let raw = session
            .native
            .event_set_create()
            .map_err(|s| s.into_error("event set"))?;
        session.event_sets.push(raw);
        debug!("Created event set {}", raw.0);

        Ok(EventSet {
            shared: Arc::clone(&self.shared),
            epoch: session.epoch,
            raw,
            released: false,
        })
    }
}

impl EventSet {
    /// Subscribe `device` for the classes in `mask`.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an empty mask; `InvalidHandle` when the handle
    /// or the set is stale or the handle belongs to another library;
    /// `Unsupported` when none of the classes can be observed on the device.
    pub fn register(&self, device: &DeviceHandle, mask: EventTypes) -> Result<()> {
        if mask.is_empty() {
            return Err(HlmlError::invalid_argument("event mask is empty"));
        }
        if !Arc::ptr_eq(&self.shared, &device.shared) || device.epoch != self.epoch {
            return Err(HlmlError::InvalidHandle);
        }

        let mut core = self.shared.lock();
        let session = core.session_for(self.epoch)?;
        session
            .native
            .register_events(self.raw, device.raw, mask)
            .map_err(|s| s.into_error("event registration"))?;

        debug!(
            "Event set {}: registered device {} for {mask:?}",
            self.raw.0,
            device.index
        );
        Ok(())
    }

    /// Block until an event is ready or `timeout` elapses.
    ///
    /// `Some(Duration::ZERO)` polls once. `None` waits until an event arrives
    /// or the library is shut down.
    ///
    /// # Errors
    ///
    /// `InvalidHandle` when the set is stale, `NotInitialized` when the
    /// library was shut down (including while this call was blocked), or a
    /// translated native failure.
    pub fn wait(&self, timeout: Option<Duration>) -> Result<EventOutcome> {
        // A deadline too far away to represent is no deadline.
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));

        let mut core = self.shared.lock();
        loop {
            let poll_interval = core.config.event_poll_interval;
            let session = core.session_for(self.epoch)?;

            match session.native.event_set_poll(self.raw) {
                Ok(Some(event)) => {
                    if let Some(found) = session.device_by_raw(event.device) {
                        let device = DeviceHandle::from_enumerated(&self.shared, self.epoch, found);
                        debug!(
                            "Event set {}: {:?} on device {}",
                            self.raw.0,
                            event.event_type,
                            device.index
                        );
                        return Ok(EventOutcome::Event(EventData {
                            device,
                            event_type: event.event_type,
                        }));
                    }
                    warn!(
                        "Event set {}: dropping event for unknown device {:?}",
                        self.raw.0,
                        event.device
                    );
                    continue;
                }
                Ok(None) | Err(NativeStatus::Timeout | NativeStatus::NoData) => {}
                Err(status) => return Err(status.into_error("event wait")),
            }

            let sleep = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(EventOutcome::TimedOut);
                    }
                    poll_interval.min(deadline - now)
                }
                None => poll_interval,
            };

            self.shared.wakeup.wait_for(&mut core, sleep);
        }
    }

    /// Release the set. Registered device handles are unaffected.
    ///
    /// # Errors
    ///
    /// `InvalidHandle` or `NotInitialized` when the set was already released
    /// by a shutdown; a translated native failure otherwise.
    pub fn delete(mut self) -> Result<()> {
        self.release()
    }

    fn release(&mut self) -> Result<()> {
        self.released = true;

        let mut core = self.shared.lock();
        let session = core.session_for(self.epoch)?;
        session.event_sets.retain(|s| *s != self.raw);
        session
            .native
            .event_set_free(self.raw)
            .map_err(|s| s.into_error("event set"))?;

        debug!("Deleted event set {}", self.raw.0);
        Ok(())
    }
}

impl Drop for EventSet {
    fn drop(&mut self) {
        if !self.released {
            // Stale sets were already freed by shutdown.
            if let Err(HlmlError::NativeFailure { status }) = self.release() {
                warn!("Failed to release event set {} on drop: {status}", self.raw.0);
            }
        }
    }
}

impl fmt::Debug for EventSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSet")
            .field("raw", &self.raw)
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}
