//! # Frame Sync
//!
//! Joint-availability capture for a streaming device.
//!
//! Responsibilities:
//! - Collect color / depth / infrared frames pushed by the hardware layer
//! - Block (with timeout) until every requested channel has a frame
//! - Single consumer: one frame set in flight per device
//! - Recycle frame buffers through a small pool
//!
//! ## Usage
//!
//! ```ignore
//! let set = synchronizer.wait_for_frame_set(Duration::from_secs(10))?;
//! let pair = registration.apply(set.color().unwrap(), set.depth().unwrap());
//! synchronizer.release(set);
//! ```

mod frame_set;
mod listener;
mod synchronizer;

pub use frame_set::FrameSet;
pub use listener::SyncMultiFrameListener;
pub use synchronizer::FrameSynchronizer;
