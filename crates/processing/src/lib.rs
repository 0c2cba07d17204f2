//! # Processing
//!
//! Per-capture image processing, stateless apart from per-device tables.
//!
//! Responsibilities:
//! - Depth / color registration with the device calibration
//! - Depth (fixed range) and infrared (dynamic range) normalization
//! - Display preparation: RGB conversion, resizing, 2x2 mosaic
//!
//! None of these fail: malformed input degrades to zero-filled output.

pub mod display;
pub mod normalize;
pub mod processor;
pub mod registration;

pub use display::{compose_mosaic, PanelSize};
pub use normalize::{normalize_depth, normalize_infrared, DEPTH_RANGE_MM};
pub use processor::{CapturePlanes, FrameProcessor, ProcessedCapture};
pub use registration::Registration;
