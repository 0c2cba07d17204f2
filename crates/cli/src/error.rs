//! Error types for CLI operations.

use contracts::{ContractError, DeviceIndex};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Enumeration found nothing to work with
    #[error("no devices attached")]
    NoDevices(#[source] ContractError),

    #[error("none of the requested devices could be selected: {requested:?}")]
    NoDevicesSelected { requested: Vec<DeviceIndex> },

    /// Every selected device failed to open or start
    #[error("no device is streaming")]
    NoDevicesStreaming,

    #[error("device {index}: {source}")]
    Device {
        index: DeviceIndex,
        #[source]
        source: ContractError,
    },
}

impl CliError {
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    pub fn device(index: DeviceIndex, source: ContractError) -> Self {
        Self::Device { index, source }
    }
}
