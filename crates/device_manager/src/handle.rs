//! Scoped native handle
//!
//! Acquire-on-open, release-on-close-or-drop wrapper around a backend
//! handle, so that early returns and panics never leak an open device.

use std::fmt;
use std::sync::Arc;

use contracts::{ChannelSet, ContractError, HandleId, Result, SharedFrameListener};
use tracing::debug;

use crate::backend::DeviceBackend;

/// Owned native handle of an open device
pub struct ScopedHandle<B: DeviceBackend> {
    backend: Arc<B>,
    /// `None` only after release
    handle: Option<B::Handle>,
    id: HandleId,
    streaming: bool,
}

impl<B: DeviceBackend> ScopedHandle<B> {
    /// Open the device with `serial`
    pub fn open(backend: Arc<B>, serial: &str) -> Result<Self> {
        let handle = backend.open(serial)?;
        let id = backend.handle_id(&handle);
        Ok(Self {
            backend,
            handle: Some(handle),
            id,
            streaming: false,
        })
    }

    #[inline]
    pub fn id(&self) -> HandleId {
        self.id
    }

    #[inline]
    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    fn native(&self) -> Result<&B::Handle> {
        self.handle
            .as_ref()
            .ok_or_else(|| ContractError::unsuccess(format!("{} already released", self.id)))
    }

    /// Register the listener and start streaming.
    ///
    /// A refused start leaves no listener behind.
    pub fn start(&mut self, channels: ChannelSet, listener: SharedFrameListener) -> Result<()> {
        let handle = self.native()?;
        self.backend.set_listener(handle, channels, listener);
        if let Err(e) = self.backend.start(handle) {
            self.backend.clear_listener(handle);
            debug!(handle = %self.id, error = %e, "start refused, listener detached");
            return Err(e);
        }
        self.streaming = true;
        Ok(())
    }

    /// Stop streaming; no-op when not streaming
    pub fn stop(&mut self) {
        if !self.streaming {
            return;
        }
        if let Some(handle) = &self.handle {
            self.backend.stop(handle);
        }
        self.streaming = false;
    }

    /// Calibration and firmware of the open device
    pub fn with_native<T>(&self, f: impl FnOnce(&B, &B::Handle) -> T) -> Result<T> {
        let handle = self.native()?;
        Ok(f(&self.backend, handle))
    }

    /// Stop (if needed) and release the native handle
    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        self.stop();
        if let Some(handle) = self.handle.take() {
            self.backend.close(handle);
            debug!(handle = %self.id, "native handle released");
        }
    }
}

impl<B: DeviceBackend> fmt::Debug for ScopedHandle<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedHandle")
            .field("id", &self.id)
            .field("streaming", &self.streaming)
            .field("released", &self.handle.is_none())
            .finish()
    }
}

impl<B: DeviceBackend> Drop for ScopedHandle<B> {
    fn drop(&mut self) {
        self.release();
    }
}
