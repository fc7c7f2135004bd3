// SPDX-License-Identifier: AGPL-3.0-only

//! Error types for HLML access-layer operations

use crate::native::NativeStatus;
use thiserror::Error;

/// Result type alias for HLML operations
pub type Result<T> = std::result::Result<T, HlmlError>;

/// Errors that can occur during HLML operations
///
/// No raw native status code crosses into these variants except through
/// [`HlmlError::NativeFailure`], which carries the untranslated status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HlmlError {
    /// The library has not been initialized (or has been shut down)
    #[error("HLML is not initialized")]
    NotInitialized,

    /// `initialize` was called while the library was already initialized
    #[error("HLML is already initialized")]
    AlreadyInitialized,

    /// An argument was rejected (malformed identity, empty event mask, ...)
    #[error("Invalid argument: {reason}")]
    InvalidArgument {
        /// What was wrong with the argument
        reason: String,
    },

    /// Device index out of range
    #[error("Device index {index} out of range (have {count} devices)")]
    InvalidIndex {
        /// Requested index
        index: u32,
        /// Number of enumerated devices
        count: u32,
    },

    /// UUID or serial lookup found no device
    #[error("No device matches {what}")]
    NotFound {
        /// Description of the identity that was looked up
        what: String,
    },

    /// The handle belongs to a previous initialize/shutdown cycle or to
    /// another library instance
    #[error("Stale or foreign device handle")]
    InvalidHandle,

    /// The metric is not available on this device/firmware combination
    #[error("{metric} is not supported on this device")]
    Unsupported {
        /// Metric that was queried
        metric: &'static str,
    },

    /// Any native status without a dedicated variant
    #[error("Native interface failure: {status}")]
    NativeFailure {
        /// Untranslated native status
        status: NativeStatus,
    },

    /// Configuration could not be loaded
    #[error("Invalid configuration: {reason}")]
    Config {
        /// Reason for failure
        reason: String,
    },
}

impl HlmlError {
    /// Create an invalid argument error
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Create a native failure error
    pub const fn native(status: NativeStatus) -> Self {
        Self::NativeFailure { status }
    }

    /// Create a configuration error
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    /// True for every flavour of rejected argument, including out-of-range
    /// device indices.
    pub const fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument { .. } | Self::InvalidIndex { .. })
    }

    /// True when the native layer reported the metric as unavailable.
    pub const fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_index_counts_as_invalid_argument() {
        let err = HlmlError::InvalidIndex { index: 9, count: 8 };
        assert!(err.is_invalid_argument());
        assert_eq!(err.to_string(), "Device index 9 out of range (have 8 devices)");
    }

    #[test]
    fn native_failure_display_includes_code() {
        let err = HlmlError::native(NativeStatus::DriverNotLoaded);
        assert!(err.to_string().contains("driver not loaded"));
        assert!(err.to_string().contains('9'));
    }
}
