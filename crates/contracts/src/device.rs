//! DeviceRecord - Registry output
//!
//! Value description of one physical depth camera.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Enumeration-order device identifier.
///
/// Signed so that negative ids coming from user input can be represented and
/// rejected as `InvalidParam` instead of wrapping.
pub type DeviceIndex = i32;

/// Device class used for default nicknames
pub const DEFAULT_DEVICE_CLASS: &str = "Kinect";

/// Opaque identity of a native device handle.
///
/// The handle itself is owned by the lifecycle controller; records only carry
/// this token so that "open" and "has a handle" can never disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HandleId(pub u64);

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handle#{}", self.0)
    }
}

/// One enumerated device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Enumeration position, unique within one snapshot
    pub index: DeviceIndex,

    /// Hardware serial; empty means unresolved
    pub serial: String,

    /// Human readable label
    pub nickname: String,

    /// Native handle while open
    #[serde(default)]
    pub native_handle: Option<HandleId>,
}

impl DeviceRecord {
    /// Create a closed record with the default nickname
    pub fn new(index: DeviceIndex, serial: impl Into<String>) -> Self {
        Self {
            index,
            serial: serial.into(),
            nickname: default_nickname(index),
            native_handle: None,
        }
    }

    /// Replace the nickname
    pub fn with_nickname(mut self, nickname: impl Into<String>) -> Self {
        self.nickname = nickname.into();
        self
    }

    /// True only while a native handle is held
    #[inline]
    pub fn is_open(&self) -> bool {
        self.native_handle.is_some()
    }

    /// True when the hardware reported a serial
    #[inline]
    pub fn has_serial(&self) -> bool {
        !self.serial.is_empty()
    }
}

/// `"{device-class}-{index}"`
pub fn default_nickname(index: DeviceIndex) -> String {
    format!("{DEFAULT_DEVICE_CLASS}-{index}")
}

/// Lifecycle state of a device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceState {
    #[default]
    Closed,
    Opened,
    Streaming,
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DeviceState::Closed => "closed",
            DeviceState::Opened => "opened",
            DeviceState::Streaming => "streaming",
        })
    }
}
