//! FrameListener trait - Hardware layer delivery interface
//!
//! The hardware layer pushes every captured plane into the listener that was
//! registered for the device; the listener decides whether to keep it.

use std::sync::Arc;

use bytes::BytesMut;

use crate::Frame;

/// Receiver of raw frames from a started device
///
/// Called from the hardware layer's capture thread, so implementations must be
/// cheap and must never block on the consumer.
///
/// # Example
///
/// ```ignore
/// backend.set_listener(&handle, ChannelSet::ALL, listener.clone());
/// backend.start(&handle)?;
/// ```
pub trait FrameListener: Send + Sync {
    /// Offer a frame.
    ///
    /// Returns `true` if the listener took it, `false` if it was discarded
    /// (unregistered channel, consumer busy).
    fn on_new_frame(&self, frame: Frame) -> bool;

    /// Buffer of `len` bytes for the next frame.
    ///
    /// Listeners that pool buffers hand back a recycled one.
    fn acquire_buffer(&self, len: usize) -> BytesMut {
        BytesMut::zeroed(len)
    }
}

/// Shared listener reference held by the hardware layer
pub type SharedFrameListener = Arc<dyn FrameListener>;
