//! Device lifecycle controller
//!
//! State machine per device: `Closed -> Opened -> Streaming -> Opened -> Closed`.
//! Every transition validates its source state first and either completes
//! or leaves all state untouched.

use std::collections::HashMap;
use std::sync::Arc;

use contracts::{
    ChannelSet, ColorCameraParams, ContractError, DeviceIndex, DeviceRecord, DeviceState,
    IrCameraParams, Result,
};
use frame_sync::{FrameSynchronizer, SyncMultiFrameListener};
use metrics::counter;
use tracing::{debug, info, instrument, warn};

use crate::backend::DeviceBackend;
use crate::handle::ScopedHandle;
use crate::registry::DeviceRegistry;

/// Live state of an open device
struct DeviceSession<B: DeviceBackend> {
    index: DeviceIndex,
    handle: ScopedHandle<B>,
    /// Present while streaming
    synchronizer: Option<FrameSynchronizer>,
    listener: Option<Arc<SyncMultiFrameListener>>,
}

impl<B: DeviceBackend> DeviceSession<B> {
    fn state(&self) -> DeviceState {
        if self.synchronizer.is_some() {
            DeviceState::Streaming
        } else {
            DeviceState::Opened
        }
    }

    fn stop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.deactivate();
        }
        self.synchronizer = None;
        self.handle.stop();
    }
}

impl<B: DeviceBackend> Drop for DeviceSession<B> {
    fn drop(&mut self) {
        // Wake consumers blocked on this device before the handle goes away
        self.stop();
    }
}

fn record_transition(index: DeviceIndex, serial: &str, from: DeviceState, to: DeviceState) {
    counter!("vision_device_transitions_total", "to" => to.to_string()).increment(1);
    info!(device_index = index, serial = %serial, from = %from, to = %to, "device state changed");
}

/// Drives devices through open / start / stop / close.
///
/// Sessions are keyed by serial so that a re-enumeration that moves a
/// device to another index keeps its session.
pub struct LifecycleController<B: DeviceBackend> {
    backend: Arc<B>,
    sessions: HashMap<String, DeviceSession<B>>,
}

impl<B: DeviceBackend> LifecycleController<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            sessions: HashMap::new(),
        }
    }

    fn resolve(registry: &DeviceRegistry<B>, index: DeviceIndex) -> Result<DeviceRecord> {
        if index < 0 {
            return Err(ContractError::invalid_param(
                "index",
                format!("device index must be >= 0, got {index}"),
            ));
        }
        registry
            .find(index)
            .ok_or(ContractError::NotFound { index })
    }

    fn session_mut(&mut self, record: &DeviceRecord) -> Option<&mut DeviceSession<B>> {
        if record.has_serial() {
            self.sessions.get_mut(&record.serial)
        } else {
            None
        }
    }

    /// Current state of a device
    ///
    /// # Errors
    /// `NotFound` / `InvalidParam` when the index does not resolve.
    pub fn state(&self, registry: &DeviceRegistry<B>, index: DeviceIndex) -> Result<DeviceState> {
        let record = Self::resolve(registry, index)?;
        Ok(self
            .sessions
            .get(&record.serial)
            .filter(|_| record.has_serial())
            .map_or(DeviceState::Closed, DeviceSession::state))
    }

    /// Number of open devices
    pub fn open_count(&self) -> usize {
        self.sessions.len()
    }

    /// Open a closed device.
    ///
    /// # Errors
    /// - `NotFound` if the device no longer enumerates
    /// - `Conflict` if it is already open
    /// - `InvalidParam` if its serial is unresolved
    /// - `PermissionDenied` / `Unsuccess` from the hardware layer
    #[instrument(name = "lifecycle_open", skip(self, registry))]
    pub fn open(&mut self, registry: &mut DeviceRegistry<B>, index: DeviceIndex) -> Result<()> {
        let record = Self::resolve(registry, index)?;
        if let Some(session) = self.session_mut(&record) {
            return Err(ContractError::conflict(index, session.state(), "open"));
        }
        if !record.has_serial() {
            return Err(ContractError::invalid_param(
                "serial",
                format!("device {index} has no resolved serial"),
            ));
        }
        if !self.still_enumerates(&record.serial) {
            warn!(device_index = index, serial = %record.serial, "device no longer enumerates");
            return Err(ContractError::NotFound { index });
        }

        let handle = ScopedHandle::open(self.backend.clone(), &record.serial)?;
        let handle_id = handle.id();
        self.sessions.insert(
            record.serial.clone(),
            DeviceSession {
                index,
                handle,
                synchronizer: None,
                listener: None,
            },
        );
        registry.set_native_handle(index, Some(handle_id));

        record_transition(index, &record.serial, DeviceState::Closed, DeviceState::Opened);
        Ok(())
    }

    /// Start streaming `channels` on an opened device.
    ///
    /// Returns the synchronizer the acquisition loop waits on.
    ///
    /// # Errors
    /// - `Conflict` unless the device is `Opened`
    /// - `InvalidParam` if `channels` is empty
    /// - `Unsuccess` if the hardware refuses to start
    #[instrument(name = "lifecycle_start_streaming", skip(self, registry), fields(channels = %channels))]
    pub fn start_streaming(
        &mut self,
        registry: &DeviceRegistry<B>,
        index: DeviceIndex,
        channels: ChannelSet,
    ) -> Result<FrameSynchronizer> {
        let record = Self::resolve(registry, index)?;
        let Some(session) = self.session_mut(&record) else {
            return Err(ContractError::conflict(index, DeviceState::Closed, "start streaming"));
        };
        if session.state() != DeviceState::Opened {
            return Err(ContractError::conflict(index, session.state(), "start streaming"));
        }
        if channels.is_empty() {
            return Err(ContractError::invalid_param(
                "channels",
                "at least one channel is required",
            ));
        }

        let listener = Arc::new(SyncMultiFrameListener::new(index, channels));
        session.handle.start(channels, listener.clone())?;

        let synchronizer = FrameSynchronizer::new(listener.clone());
        session.listener = Some(listener);
        session.synchronizer = Some(synchronizer.clone());

        record_transition(index, &record.serial, DeviceState::Opened, DeviceState::Streaming);
        Ok(synchronizer)
    }

    /// Stop streaming. Succeeds without side effects on an `Opened` device.
    ///
    /// # Errors
    /// `Conflict` if the device is closed.
    #[instrument(name = "lifecycle_stop_streaming", skip(self, registry))]
    pub fn stop_streaming(&mut self, registry: &DeviceRegistry<B>, index: DeviceIndex) -> Result<()> {
        let record = Self::resolve(registry, index)?;
        let Some(session) = self.session_mut(&record) else {
            return Err(ContractError::conflict(index, DeviceState::Closed, "stop streaming"));
        };

        if session.state() == DeviceState::Opened {
            debug!(device_index = index, "stop streaming: already stopped");
            return Ok(());
        }

        session.stop();
        record_transition(index, &record.serial, DeviceState::Streaming, DeviceState::Opened);
        Ok(())
    }

    /// Close an open device, stopping it first if streaming.
    ///
    /// # Errors
    /// `Conflict` if the device is already closed.
    #[instrument(name = "lifecycle_close", skip(self, registry))]
    pub fn close(&mut self, registry: &mut DeviceRegistry<B>, index: DeviceIndex) -> Result<()> {
        let record = Self::resolve(registry, index)?;
        let removed = if record.has_serial() {
            self.sessions.remove(&record.serial)
        } else {
            None
        };
        let Some(mut session) = removed else {
            return Err(ContractError::conflict(index, DeviceState::Closed, "close"));
        };

        let from = session.state();
        if from == DeviceState::Streaming {
            session.stop();
            record_transition(index, &record.serial, DeviceState::Streaming, DeviceState::Opened);
        }
        drop(session);
        registry.set_native_handle(index, None);

        record_transition(index, &record.serial, DeviceState::Opened, DeviceState::Closed);
        Ok(())
    }

    /// Synchronizer of a streaming device
    ///
    /// # Errors
    /// `Conflict` unless the device is `Streaming`.
    pub fn synchronizer(
        &self,
        registry: &DeviceRegistry<B>,
        index: DeviceIndex,
    ) -> Result<FrameSynchronizer> {
        let record = Self::resolve(registry, index)?;
        let session = self.sessions.get(&record.serial).filter(|_| record.has_serial());
        match session.and_then(|s| s.synchronizer.clone()) {
            Some(synchronizer) => Ok(synchronizer),
            None => Err(ContractError::conflict(
                index,
                session.map_or(DeviceState::Closed, DeviceSession::state),
                "wait for frames on",
            )),
        }
    }

    /// Calibration of an open device
    ///
    /// # Errors
    /// `Conflict` if the device is closed.
    pub fn camera_params(
        &self,
        registry: &DeviceRegistry<B>,
        index: DeviceIndex,
    ) -> Result<(IrCameraParams, ColorCameraParams)> {
        self.with_open(registry, index, "read calibration of", |backend, handle| {
            (backend.ir_camera_params(handle), backend.color_camera_params(handle))
        })
    }

    /// Firmware version of an open device
    pub fn firmware_version(&self, registry: &DeviceRegistry<B>, index: DeviceIndex) -> Result<String> {
        self.with_open(registry, index, "read firmware of", |backend, handle| {
            backend.firmware_version(handle)
        })
    }

    fn with_open<T>(
        &self,
        registry: &DeviceRegistry<B>,
        index: DeviceIndex,
        operation: &'static str,
        f: impl FnOnce(&B, &B::Handle) -> T,
    ) -> Result<T> {
        let record = Self::resolve(registry, index)?;
        match self.sessions.get(&record.serial).filter(|_| record.has_serial()) {
            Some(session) => session.handle.with_native(f),
            None => Err(ContractError::conflict(index, DeviceState::Closed, operation)),
        }
    }

    /// Close sessions whose device vanished from the registry.
    ///
    /// Returns how many were closed.
    pub fn retain_enumerated(&mut self, registry: &DeviceRegistry<B>) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|serial, session| {
            let present = registry.find_by_serial(serial).is_some();
            if !present {
                warn!(device_index = session.index, serial = %serial, "open device disappeared, releasing handle");
            }
            present
        });

        // Indices may have moved; follow the registry
        for (serial, session) in &mut self.sessions {
            if let Some(record) = registry.find_by_serial(serial) {
                session.index = record.index;
            }
        }
        before - self.sessions.len()
    }

    /// Close every open device
    pub fn close_all(&mut self, registry: &mut DeviceRegistry<B>) {
        for (serial, session) in self.sessions.drain() {
            let index = session.index;
            drop(session);
            registry.set_native_handle(index, None);
            debug!(device_index = index, serial = %serial, "device closed");
        }
    }

    fn still_enumerates(&self, serial: &str) -> bool {
        let count = self.backend.enumerate();
        (0..count).any(|position| self.backend.serial(position) == serial)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MockBackend, MockConfig};
    use contracts::{Channel, Status, StatusExt};

    struct Fixture {
        backend: Arc<MockBackend>,
        registry: DeviceRegistry<MockBackend>,
        lifecycle: LifecycleController<MockBackend>,
    }

    fn fixture(serials: &[&str]) -> Fixture {
        let backend = Arc::new(MockBackend::with_serials(serials.iter().copied()));
        let mut registry = DeviceRegistry::new(backend.clone());
        registry.refresh().unwrap();
        let lifecycle = LifecycleController::new(backend.clone());
        Fixture {
            backend,
            registry,
            lifecycle,
        }
    }

    #[test]
    fn test_full_cycle() {
        let mut f = fixture(&["AB12"]);
        assert_eq!(f.lifecycle.state(&f.registry, 0).unwrap(), DeviceState::Closed);

        f.lifecycle.open(&mut f.registry, 0).unwrap();
        assert_eq!(f.lifecycle.state(&f.registry, 0).unwrap(), DeviceState::Opened);
        assert!(f.registry.find(0).unwrap().is_open());

        f.lifecycle
            .start_streaming(&f.registry, 0, ChannelSet::only(Channel::Depth))
            .unwrap();
        assert_eq!(f.lifecycle.state(&f.registry, 0).unwrap(), DeviceState::Streaming);
        assert_eq!(f.backend.streaming_count(), 1);

        f.lifecycle.stop_streaming(&f.registry, 0).unwrap();
        assert_eq!(f.backend.streaming_count(), 0);

        f.lifecycle.close(&mut f.registry, 0).unwrap();
        let record = f.registry.find(0).unwrap();
        assert!(!record.is_open());
        assert_eq!(record.native_handle, None);
        assert_eq!(f.backend.open_count(), 0);
    }

    #[test]
    fn test_invalid_transitions_conflict() {
        let mut f = fixture(&["AB12"]);
        let start = f
            .lifecycle
            .start_streaming(&f.registry, 0, ChannelSet::ALL)
            .map(|_| ());
        assert_eq!(start.status(), Status::Conflict);
        assert_eq!(f.lifecycle.state(&f.registry, 0).unwrap(), DeviceState::Closed);

        assert_eq!(f.lifecycle.stop_streaming(&f.registry, 0).status(), Status::Conflict);
        assert_eq!(f.lifecycle.close(&mut f.registry, 0).status(), Status::Conflict);

        f.lifecycle.open(&mut f.registry, 0).unwrap();
        assert_eq!(f.lifecycle.open(&mut f.registry, 0).status(), Status::Conflict);
        assert_eq!(f.backend.open_count(), 1);
    }

    #[test]
    fn test_empty_channels_rejected() {
        let mut f = fixture(&["AB12"]);
        f.lifecycle.open(&mut f.registry, 0).unwrap();
        let err = f
            .lifecycle
            .start_streaming(&f.registry, 0, ChannelSet::EMPTY)
            .unwrap_err();
        assert_eq!(err.status(), Status::InvalidParam);
        assert_eq!(f.lifecycle.state(&f.registry, 0).unwrap(), DeviceState::Opened);
    }

    #[test]
    fn test_refused_start_stays_opened() {
        let backend = Arc::new(MockBackend::with_config(MockConfig {
            serials: vec!["AB12".into()],
            refuse_start_serials: vec!["AB12".into()],
            ..Default::default()
        }));
        let mut registry = DeviceRegistry::new(backend.clone());
        registry.refresh().unwrap();
        let mut lifecycle = LifecycleController::new(backend.clone());

        lifecycle.open(&mut registry, 0).unwrap();
        let err = lifecycle
            .start_streaming(&registry, 0, ChannelSet::ALL)
            .unwrap_err();
        assert_eq!(err.status(), Status::Unsuccess);
        assert_eq!(lifecycle.state(&registry, 0).unwrap(), DeviceState::Opened);
        assert_eq!(backend.listener_count(), 0);
        assert_eq!(lifecycle.synchronizer(&registry, 0).status(), Status::Conflict);
    }

    #[test]
    fn test_stop_from_opened_is_noop() {
        let mut f = fixture(&["AB12"]);
        f.lifecycle.open(&mut f.registry, 0).unwrap();
        assert!(f.lifecycle.stop_streaming(&f.registry, 0).is_ok());
        assert_eq!(f.lifecycle.state(&f.registry, 0).unwrap(), DeviceState::Opened);
    }

    #[test]
    fn test_close_while_streaming_stops_first() {
        let mut f = fixture(&["AB12"]);
        f.lifecycle.open(&mut f.registry, 0).unwrap();
        let sync = f
            .lifecycle
            .start_streaming(&f.registry, 0, ChannelSet::ALL)
            .unwrap();

        f.lifecycle.close(&mut f.registry, 0).unwrap();
        assert!(!sync.is_streaming());
        assert_eq!(f.backend.streaming_count(), 0);
        assert_eq!(f.lifecycle.state(&f.registry, 0).unwrap(), DeviceState::Closed);
    }

    #[test]
    fn test_open_unplugged_device_not_found() {
        let mut f = fixture(&["AB12"]);
        f.backend.set_serials(["ZZ99"]);
        let err = f.lifecycle.open(&mut f.registry, 0).unwrap_err();
        assert_eq!(err.status(), Status::NotFound);
        assert!(!f.registry.find(0).unwrap().is_open());
    }

    #[test]
    fn test_negative_index_invalid() {
        let mut f = fixture(&["AB12"]);
        let err = f.lifecycle.open(&mut f.registry, -3).unwrap_err();
        assert_eq!(err.status(), Status::InvalidParam);
    }

    #[test]
    fn test_synchronizer_requires_streaming() {
        let mut f = fixture(&["AB12"]);
        f.lifecycle.open(&mut f.registry, 0).unwrap();
        let err = f.lifecycle.synchronizer(&f.registry, 0).unwrap_err();
        assert!(matches!(
            err,
            ContractError::Conflict {
                state: DeviceState::Opened,
                ..
            }
        ));
    }

    #[test]
    fn test_retain_enumerated_releases_vanished() {
        let mut f = fixture(&["AB12", "CD34"]);
        f.lifecycle.open(&mut f.registry, 0).unwrap();
        f.lifecycle.open(&mut f.registry, 1).unwrap();

        f.backend.set_serials(["CD34"]);
        f.registry.refresh().unwrap();
        assert_eq!(f.lifecycle.retain_enumerated(&f.registry), 1);
        assert_eq!(f.backend.open_count(), 1);
        assert_eq!(f.lifecycle.state(&f.registry, 0).unwrap(), DeviceState::Opened);
    }
}
