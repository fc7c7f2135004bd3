// SPDX-License-Identifier: AGPL-3.0-only

//! Native status codes and their translation into [`HlmlError`].
//!
//! Every native call returns a [`NativeResult`]; the conversion below is the
//! single place where native codes become caller-visible errors.

use crate::error::HlmlError;
use std::fmt;

/// Result of a call into the native interface
pub type NativeResult<T> = std::result::Result<T, NativeStatus>;

/// Non-success status returned by the native hardware-management interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeStatus {
    /// Library not initialized
    Uninitialized,
    /// Invalid argument
    InvalidArgument,
    /// Feature not supported on this device
    NotSupported,
    /// Caller lacks permission
    NoPermission,
    /// Library already initialized
    AlreadyInitialized,
    /// Query found nothing
    NotFound,
    /// Caller-provided buffer too small
    InsufficientSize,
    /// Kernel driver not loaded
    DriverNotLoaded,
    /// Operation timed out
    Timeout,
    /// Device fell off the bus
    AipIsLost,
    /// Allocation failure
    Memory,
    /// No data available
    NoData,
    /// Unknown internal error
    Unknown,
    /// Any code this layer has no name for
    Other(i32),
}

impl NativeStatus {
    /// Map a raw return code. `None` for success (code 0).
    pub const fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            0 => return None,
            1 => Self::Uninitialized,
            2 => Self::InvalidArgument,
            3 => Self::NotSupported,
            4 => Self::NoPermission,
            5 => Self::AlreadyInitialized,
            6 => Self::NotFound,
            7 => Self::InsufficientSize,
            9 => Self::DriverNotLoaded,
            10 => Self::Timeout,
            15 => Self::AipIsLost,
            20 => Self::Memory,
            21 => Self::NoData,
            49 => Self::Unknown,
            other => Self::Other(other),
        })
    }

    /// Raw return code.
    pub const fn code(&self) -> i32 {
        match self {
            Self::Uninitialized => 1,
            Self::InvalidArgument => 2,
            Self::NotSupported => 3,
            Self::NoPermission => 4,
            Self::AlreadyInitialized => 5,
            Self::NotFound => 6,
            Self::InsufficientSize => 7,
            Self::DriverNotLoaded => 9,
            Self::Timeout => 10,
            Self::AipIsLost => 15,
            Self::Memory => 20,
            Self::NoData => 21,
            Self::Unknown => 49,
            Self::Other(code) => *code,
        }
    }

    const fn description(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::InvalidArgument => "invalid argument",
            Self::NotSupported => "not supported",
            Self::NoPermission => "no permission",
            Self::AlreadyInitialized => "already initialized",
            Self::NotFound => "not found",
            Self::InsufficientSize => "insufficient size",
            Self::DriverNotLoaded => "driver not loaded",
            Self::Timeout => "timeout",
            Self::AipIsLost => "device is lost",
            Self::Memory => "out of memory",
            Self::NoData => "no data",
            Self::Unknown | Self::Other(_) => "unknown error",
        }
    }

    /// Translate into a caller-visible error, naming the metric for
    /// `NotSupported`.
    pub(crate) fn into_error(self, metric: &'static str) -> HlmlError {
        match self {
            Self::Uninitialized => HlmlError::NotInitialized,
            Self::AlreadyInitialized => HlmlError::AlreadyInitialized,
            Self::InvalidArgument => {
                HlmlError::invalid_argument(format!("rejected by native interface ({metric})"))
            }
            Self::NotFound => HlmlError::not_found(metric),
            Self::NotSupported => HlmlError::Unsupported { metric },
            other => HlmlError::native(other),
        }
    }
}

impl fmt::Display for NativeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.description(), self.code())
    }
}

impl From<NativeStatus> for HlmlError {
    fn from(status: NativeStatus) -> Self {
        status.into_error("operation")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip() {
        for code in [1, 2, 3, 4, 5, 6, 7, 9, 10, 15, 20, 21, 49, 777] {
            let status = NativeStatus::from_code(code).unwrap();
            assert_eq!(status.code(), code);
        }
        assert_eq!(NativeStatus::from_code(0), None);
    }

    #[test]
    fn translation_table() {
        assert_eq!(
            HlmlError::from(NativeStatus::Uninitialized),
            HlmlError::NotInitialized
        );
        assert_eq!(
            HlmlError::from(NativeStatus::AlreadyInitialized),
            HlmlError::AlreadyInitialized
        );
        assert!(HlmlError::from(NativeStatus::InvalidArgument).is_invalid_argument());
        assert!(matches!(
            HlmlError::from(NativeStatus::NotFound),
            HlmlError::NotFound { .. }
        ));
        assert_eq!(
            NativeStatus::NotSupported.into_error("power usage"),
            HlmlError::Unsupported { metric: "power usage" }
        );
        assert_eq!(
            HlmlError::from(NativeStatus::AipIsLost),
            HlmlError::NativeFailure { status: NativeStatus::AipIsLost }
        );
        assert_eq!(
            HlmlError::from(NativeStatus::Other(99)),
            HlmlError::NativeFailure { status: NativeStatus::Other(99) }
        );
    }
}
