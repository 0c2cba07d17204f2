//! VisionConfig - Config Loader output
//!
//! Describes the whole acquisition run: hardware backend, which devices to
//! use, stream parameters, processing switches, logging and sink routing.

use std::fmt;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{Channel, ChannelSet, DeviceIndex};

/// Complete run configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct VisionConfig {
    /// Hardware layer selection
    #[serde(default)]
    #[validate(nested)]
    pub backend: BackendConfig,

    /// Device selection
    #[serde(default)]
    pub devices: DeviceSelectionConfig,

    /// Stream parameters
    #[serde(default)]
    #[validate(nested)]
    pub streaming: StreamingConfig,

    /// Registration switches
    #[serde(default)]
    pub registration: RegistrationConfig,

    /// Display preparation
    #[serde(default)]
    #[validate(nested)]
    pub display: DisplayConfig,

    /// Log output
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Prometheus exporter port (absent or 0 = disabled)
    #[serde(default)]
    pub metrics_port: Option<u16>,

    /// Presentation sink routing
    #[serde(default = "default_sinks")]
    #[validate(nested)]
    pub sinks: Vec<SinkConfig>,
}

fn default_sinks() -> Vec<SinkConfig> {
    vec![SinkConfig {
        name: "log".to_string(),
        sink_type: SinkType::Log,
        queue_capacity: default_queue_capacity(),
    }]
}

/// Hardware backend kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Synthetic devices, no hardware required
    #[default]
    Mock,
}

/// Hardware layer configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BackendConfig {
    #[serde(default)]
    pub kind: BackendKind,

    /// Serials of the simulated devices, in enumeration order
    #[serde(default = "default_mock_serials")]
    pub serials: Vec<String>,

    /// Capture rate of the simulated devices (Hz)
    #[serde(default = "default_frame_rate")]
    #[validate(range(min = 0.1, max = 120.0))]
    pub frame_rate_hz: f64,

    /// Channels the simulated devices never deliver
    #[serde(default)]
    pub never_deliver: ChannelSet,

    /// Serials whose open is refused with `PermissionDenied`
    #[serde(default)]
    pub deny_serials: Vec<String>,

    /// Serials whose open fails with `Unsuccess`
    #[serde(default)]
    pub fail_serials: Vec<String>,
}

fn default_mock_serials() -> Vec<String> {
    vec!["000000000001".to_string()]
}

fn default_frame_rate() -> f64 {
    30.0
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::Mock,
            serials: default_mock_serials(),
            frame_rate_hz: default_frame_rate(),
            never_deliver: ChannelSet::EMPTY,
            deny_serials: Vec::new(),
            fail_serials: Vec::new(),
        }
    }
}

/// Which enumerated devices to use
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceSelectionConfig {
    /// Device indices to select; empty selects every enumerated device
    #[serde(default)]
    pub select: Vec<DeviceIndex>,
}

/// Stream parameters
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct StreamingConfig {
    /// Channels to capture
    #[serde(default = "default_channels")]
    pub channels: ChannelSet,

    /// Per-frame-set wait deadline (milliseconds)
    #[serde(default = "default_frame_timeout_ms")]
    #[validate(range(min = 1, max = 600_000))]
    pub frame_timeout_ms: u64,

    /// Frame sets per device before the loop ends (0 = unlimited)
    #[serde(default)]
    pub max_frames: u64,
}

fn default_channels() -> ChannelSet {
    ChannelSet::ALL
}

fn default_frame_timeout_ms() -> u64 {
    10_000
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            channels: default_channels(),
            frame_timeout_ms: default_frame_timeout_ms(),
            max_frames: 0,
        }
    }
}

impl StreamingConfig {
    /// True when both planes needed for registration are captured
    pub fn can_register(&self) -> bool {
        self.channels
            .is_superset(ChannelSet::only(Channel::Color).with(Channel::Depth))
    }
}

/// Registration switches
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RegistrationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Suppress color behind nearer surfaces
    #[serde(default = "default_true")]
    pub filter_occlusions: bool,
}

fn default_true() -> bool {
    true
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            filter_occlusions: true,
        }
    }
}

/// Display preparation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Validate)]
pub struct DisplayConfig {
    #[serde(default = "default_display_width")]
    #[validate(range(min = 16, max = 7680))]
    pub width: u32,

    #[serde(default = "default_display_height")]
    #[validate(range(min = 16, max = 4320))]
    pub height: u32,
}

fn default_display_width() -> u32 {
    640
}

fn default_display_height() -> u32 {
    480
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width: default_display_width(),
            height: default_display_height(),
        }
    }
}

/// Log verbosity, ordered `None < Error < Warning < Info < Debug`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    None,
    Error,
    Warning,
    #[default]
    Info,
    Debug,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogLevel::None => "none",
            LogLevel::Error => "error",
            LogLevel::Warning => "warning",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        })
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// JSON structured logs
    Json,
    /// Human readable, multi-line
    Pretty,
    /// Compact single line
    #[default]
    Compact,
}

/// Log output
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LogLevel,

    #[serde(default)]
    pub format: LogFormat,
}

/// Sink output configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SinkConfig {
    /// Sink name
    #[validate(length(min = 1, message = "sink name cannot be empty"))]
    pub name: String,

    /// Sink type
    pub sink_type: SinkType,

    /// Queue capacity
    #[serde(default = "default_queue_capacity")]
    #[validate(range(min = 1, max = 10_000))]
    pub queue_capacity: usize,
}

fn default_queue_capacity() -> usize {
    8
}

/// Sink type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkType {
    /// Per-frame summary in the log
    Log,
    /// 2x2 mosaic published for an embedding UI
    Mosaic,
}
