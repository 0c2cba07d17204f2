//! # Acquisition
//!
//! One blocking acquisition loop per streaming device.
//!
//! Responsibilities:
//! - Pull frame sets through the device's synchronizer
//! - Register, normalize and prepare them for display
//! - Release every frame set before the next wait
//! - Hand prepared captures to the dispatcher without blocking
//! - Stop cooperatively between iterations
//!
//! ## Usage
//!
//! ```ignore
//! let acquisition = AcquisitionLoop::for_device(&manager, 0, settings, tx, cancel.clone())?;
//! let stats = acquisition.spawn_blocking().await?;
//! ```

mod cancel;
mod device_loop;
mod stats;

pub use cancel::CancelToken;
pub use device_loop::{AcquisitionLoop, LoopSettings};
pub use stats::{AcquisitionStats, StopReason};
