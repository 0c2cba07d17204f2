//! Layered error definitions
//!
//! Categorized by source: device / stream / config / sink.
//! Every variant maps onto one [`Status`] kind so callers can branch on the
//! kind without matching on messages.

use std::fmt;

use thiserror::Error;

use crate::{Channel, DeviceIndex, DeviceState};

/// Outcome kind of an operation.
///
/// `Success` is what an `Ok` result reports; every other kind is carried by a
/// [`ContractError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Success,
    Unsuccess,
    Error,
    EmptyParam,
    EmptyData,
    InvalidParam,
    PermissionDenied,
    NotFound,
    Timeout,
    Conflict,
    Pending,
    Cancelled,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::Success => "success",
            Status::Unsuccess => "unsuccess",
            Status::Error => "error",
            Status::EmptyParam => "empty_param",
            Status::EmptyData => "empty_data",
            Status::InvalidParam => "invalid_param",
            Status::PermissionDenied => "permission_denied",
            Status::NotFound => "not_found",
            Status::Timeout => "timeout",
            Status::Conflict => "conflict",
            Status::Pending => "pending",
            Status::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Parameter Errors =====
    /// A required list or collection argument was empty
    #[error("empty parameter: {what}")]
    EmptyParam { what: String },

    /// An argument was out of range or otherwise unusable
    #[error("invalid parameter '{field}': {message}")]
    InvalidParam { field: String, message: String },

    // ===== Device Errors =====
    /// Enumeration or a query produced no data
    #[error("empty data: {message}")]
    EmptyData { message: String },

    /// Referenced device is not part of the current enumeration
    #[error("device {index} not found")]
    NotFound { index: DeviceIndex },

    /// Operation not valid for the current device state
    #[error("cannot {operation} device {index} while {state}")]
    Conflict {
        index: DeviceIndex,
        state: DeviceState,
        operation: &'static str,
    },

    /// Hardware layer refused access
    #[error("permission denied for device '{serial}': {message}")]
    PermissionDenied { serial: String, message: String },

    /// Hardware layer reported a generic failure
    #[error("{message}")]
    Unsuccess { message: String },

    // ===== Stream Errors =====
    /// Frame wait exceeded its deadline
    #[error("frame wait timed out after {waited_ms}ms, missing channels: {missing:?}")]
    Timeout {
        waited_ms: u64,
        missing: Vec<Channel>,
    },

    /// Operation skipped because a precondition collection was empty
    #[error("cancelled: {message}")]
    Cancelled { message: String },

    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Sink Errors =====
    /// Sink write error
    #[error("sink '{sink_name}' write error: {message}")]
    SinkWrite { sink_name: String, message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ContractError {
    /// Status kind carried by this error
    pub fn status(&self) -> Status {
        match self {
            Self::EmptyParam { .. } => Status::EmptyParam,
            Self::InvalidParam { .. } => Status::InvalidParam,
            Self::EmptyData { .. } => Status::EmptyData,
            Self::NotFound { .. } => Status::NotFound,
            Self::Conflict { .. } => Status::Conflict,
            Self::PermissionDenied { .. } => Status::PermissionDenied,
            Self::Unsuccess { .. } => Status::Unsuccess,
            Self::Timeout { .. } => Status::Timeout,
            Self::Cancelled { .. } => Status::Cancelled,
            Self::ConfigParse { .. }
            | Self::ConfigValidation { .. }
            | Self::SinkWrite { .. }
            | Self::Io(_) => Status::Error,
        }
    }

    /// Create empty data error
    pub fn empty_data(message: impl Into<String>) -> Self {
        Self::EmptyData {
            message: message.into(),
        }
    }

    /// Create invalid parameter error
    pub fn invalid_param(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParam {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create state conflict error
    pub fn conflict(index: DeviceIndex, state: DeviceState, operation: &'static str) -> Self {
        Self::Conflict {
            index,
            state,
            operation,
        }
    }

    /// Create generic hardware failure
    pub fn unsuccess(message: impl Into<String>) -> Self {
        Self::Unsuccess {
            message: message.into(),
        }
    }

    /// Create cancelled error
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::Cancelled {
            message: message.into(),
        }
    }

    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create sink write error
    pub fn sink_write(sink_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkWrite {
            sink_name: sink_name.into(),
            message: message.into(),
        }
    }
}

/// Result alias
pub type Result<T> = std::result::Result<T, ContractError>;

/// Status view over a result.
pub trait StatusExt {
    /// `Status::Success` for `Ok`, the error's kind otherwise
    fn status(&self) -> Status;
}

impl<T> StatusExt for Result<T> {
    fn status(&self) -> Status {
        match self {
            Ok(_) => Status::Success,
            Err(e) => e.status(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let err = ContractError::conflict(3, DeviceState::Closed, "start streaming");
        assert_eq!(err.status(), Status::Conflict);
        assert_eq!(
            err.to_string(),
            "cannot start streaming device 3 while closed"
        );

        let timeout = ContractError::Timeout {
            waited_ms: 10,
            missing: vec![Channel::Depth],
        };
        assert_eq!(timeout.status(), Status::Timeout);
    }

    #[test]
    fn test_result_status() {
        let ok: Result<usize> = Ok(2);
        assert_eq!(ok.status(), Status::Success);

        let err: Result<usize> = Err(ContractError::empty_data("no devices"));
        assert_eq!(err.status(), Status::EmptyData);
    }
}
