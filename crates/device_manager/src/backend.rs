//! Hardware abstraction layer
//!
//! Defines the boundary to the vendor SDK that performs raw device I/O.
//! The core never talks to hardware except through this trait.

use contracts::{
    ChannelSet, ColorCameraParams, HandleId, IrCameraParams, Result, SharedFrameListener,
};

/// Depth camera hardware layer
///
/// Abstracts enumeration, native handles and stream control so that the
/// registry and lifecycle controller work the same over real hardware and
/// the mock backend. Implementations are shared behind an `Arc` and must
/// do their own locking.
pub trait DeviceBackend: Send + Sync + 'static {
    /// Native device handle, exclusively owned by the lifecycle controller
    type Handle: Send + 'static;

    /// Re-enumerate attached devices and return how many were found.
    ///
    /// Positions `0..count` are valid for [`serial`](Self::serial) until the
    /// next call.
    fn enumerate(&self) -> usize;

    /// Serial of the device at an enumeration position; empty if unresolved
    fn serial(&self, position: usize) -> String;

    /// Open the device with this serial.
    ///
    /// # Errors
    /// - `PermissionDenied` when the OS refuses access
    /// - `Unsuccess` for any other failure
    fn open(&self, serial: &str) -> Result<Self::Handle>;

    /// Stable identity of an open handle
    fn handle_id(&self, handle: &Self::Handle) -> HandleId;

    /// Route frames of `channels` into `listener`
    fn set_listener(&self, handle: &Self::Handle, channels: ChannelSet, listener: SharedFrameListener);

    /// Detach the listener; no frames are routed until the next `set_listener`
    fn clear_listener(&self, handle: &Self::Handle);

    /// Start streaming to the registered listener
    fn start(&self, handle: &Self::Handle) -> Result<()>;

    /// Stop streaming; no-op when not streaming
    fn stop(&self, handle: &Self::Handle);

    /// Release the native handle
    fn close(&self, handle: Self::Handle);

    /// Depth camera calibration of an open device
    fn ir_camera_params(&self, handle: &Self::Handle) -> IrCameraParams;

    /// Color camera calibration of an open device
    fn color_camera_params(&self, handle: &Self::Handle) -> ColorCameraParams;

    fn firmware_version(&self, handle: &Self::Handle) -> String;
}
