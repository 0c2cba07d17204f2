//! DeviceManager facade
//!
//! One registry plus one lifecycle controller over a shared backend,
//! constructed explicitly and shared as [`SharedDeviceManager`].

use std::sync::{Arc, Mutex};
use std::time::Duration;

use contracts::{
    ChannelSet, ColorCameraParams, DeviceIndex, DeviceRecord, DeviceState, IrCameraParams, Result,
};
use frame_sync::{FrameSet, FrameSynchronizer};
use tracing::{info, instrument};

use crate::backend::DeviceBackend;
use crate::lifecycle::LifecycleController;
use crate::registry::DeviceRegistry;

/// Manager shared between the CLI and the acquisition loops.
///
/// The mutex serializes every registry and lifecycle mutation.
pub type SharedDeviceManager<B> = Arc<Mutex<DeviceManager<B>>>;

/// Device registry + lifecycle controller
pub struct DeviceManager<B: DeviceBackend> {
    backend: Arc<B>,
    registry: DeviceRegistry<B>,
    lifecycle: LifecycleController<B>,
}

impl<B: DeviceBackend> DeviceManager<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            registry: DeviceRegistry::new(backend.clone()),
            lifecycle: LifecycleController::new(backend.clone()),
            backend,
        }
    }

    /// Wrap in `Arc<Mutex<_>>`
    pub fn into_shared(self) -> SharedDeviceManager<B> {
        Arc::new(Mutex::new(self))
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub fn registry(&self) -> &DeviceRegistry<B> {
        &self.registry
    }

    // ===== Registry =====

    /// Re-enumerate; open devices that vanished are released
    ///
    /// # Errors
    /// `EmptyData` when no device is attached.
    pub fn refresh(&mut self) -> Result<usize> {
        let result = self.registry.refresh();
        let released = self.lifecycle.retain_enumerated(&self.registry);
        if released > 0 {
            info!(released, "released handles of vanished devices");
        }
        result
    }

    pub fn list(&self) -> Vec<DeviceRecord> {
        self.registry.list()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    pub fn device_count(&self) -> usize {
        self.registry.len()
    }

    pub fn find(&self, index: DeviceIndex) -> Option<DeviceRecord> {
        self.registry.find(index)
    }

    pub fn select(&mut self, index: DeviceIndex) -> bool {
        self.registry.select(index)
    }

    pub fn deselect(&mut self, index: DeviceIndex) -> bool {
        self.registry.deselect(index)
    }

    pub fn clear_selection(&mut self) {
        self.registry.clear_selection();
    }

    pub fn selected(&self) -> Vec<DeviceRecord> {
        self.registry.selected()
    }

    pub fn selected_list_is_empty(&self) -> bool {
        self.registry.selected_list_is_empty()
    }

    /// # Errors
    /// `Cancelled` when the device list is empty.
    pub fn log_devices(&self) -> Result<usize> {
        self.registry.log_devices()
    }

    // ===== Lifecycle =====

    pub fn state(&self, index: DeviceIndex) -> Result<DeviceState> {
        self.lifecycle.state(&self.registry, index)
    }

    pub fn open(&mut self, index: DeviceIndex) -> Result<()> {
        self.lifecycle.open(&mut self.registry, index)
    }

    pub fn start_streaming(
        &mut self,
        index: DeviceIndex,
        channels: ChannelSet,
    ) -> Result<FrameSynchronizer> {
        self.lifecycle.start_streaming(&self.registry, index, channels)
    }

    pub fn stop_streaming(&mut self, index: DeviceIndex) -> Result<()> {
        self.lifecycle.stop_streaming(&self.registry, index)
    }

    pub fn close(&mut self, index: DeviceIndex) -> Result<()> {
        self.lifecycle.close(&mut self.registry, index)
    }

    /// Stop and close every open device
    #[instrument(name = "device_manager_close_all", skip(self))]
    pub fn close_all(&mut self) {
        self.lifecycle.close_all(&mut self.registry);
    }

    pub fn open_count(&self) -> usize {
        self.lifecycle.open_count()
    }

    /// Synchronizer of a streaming device
    pub fn synchronizer(&self, index: DeviceIndex) -> Result<FrameSynchronizer> {
        self.lifecycle.synchronizer(&self.registry, index)
    }

    /// Wait for a frame set of a streaming device.
    ///
    /// Blocks the caller; do not hold a [`SharedDeviceManager`] lock while
    /// waiting, use [`synchronizer`](Self::synchronizer) instead.
    ///
    /// # Errors
    /// `Conflict` (rejected before waiting) unless the device is `Streaming`;
    /// `Timeout` if the set is incomplete after `timeout`.
    pub fn wait_for_frame_set(&self, index: DeviceIndex, timeout: Duration) -> Result<FrameSet> {
        self.synchronizer(index)?.wait_for_frame_set(timeout)
    }

    pub fn camera_params(&self, index: DeviceIndex) -> Result<(IrCameraParams, ColorCameraParams)> {
        self.lifecycle.camera_params(&self.registry, index)
    }

    pub fn firmware_version(&self, index: DeviceIndex) -> Result<String> {
        self.lifecycle.firmware_version(&self.registry, index)
    }
}
