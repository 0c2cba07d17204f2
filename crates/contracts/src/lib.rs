//! # Contracts
//!
//! Shared interface contracts: the data structures and traits exchanged
//! between the pipeline crates. This crate depends on no other workspace
//! crate, and every other crate depends on it.
//!
//! ## Layering
//! - Leaves on top of contracts: `config_loader`, `frame_sync`, `processing`, `observability`
//! - `device_manager` uses `frame_sync` (listeners and synchronizers are created on start)
//! - `dispatcher` uses `processing` (mosaic composition)
//! - `acquisition` drives `device_manager`, `frame_sync`, `processing` and `observability`
//! - `cli` and the integration tests wire everything together
//!
//! Dependencies only point down this list, never back up to a caller.
//!
//! ## Data Model
//! - `DeviceRecord` describes one enumerated depth camera
//! - `Frame` is one raw plane (color / depth / infrared) from the hardware layer
//! - `RegisteredFramePair` is the depth-aligned output of registration
//! - `PresentationFrame` carries display-ready images to the sinks

mod calibration;
mod channel;
mod config;
mod device;
mod error;
mod frame;
mod listener;
mod presentation;
mod sink;

pub use calibration::*;
pub use channel::{Channel, ChannelSet};
pub use config::*;
pub use device::*;
pub use error::*;
pub use frame::*;
pub use listener::{FrameListener, SharedFrameListener};
pub use presentation::*;
pub use sink::*;
