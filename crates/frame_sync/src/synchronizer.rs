//! Frame synchronizer - blocking frame set delivery for one streaming device

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use contracts::{ChannelSet, DeviceIndex, Result};
use tracing::{debug, instrument};

use crate::{FrameSet, SyncMultiFrameListener};

/// Consumer side of a streaming device.
///
/// Obtained from the lifecycle controller when streaming starts; stops
/// delivering (with `Conflict`) once streaming stops. Clones share the
/// same listener.
#[derive(Debug, Clone)]
pub struct FrameSynchronizer {
    listener: Arc<SyncMultiFrameListener>,
    sequence: Arc<AtomicU64>,
}

impl FrameSynchronizer {
    pub fn new(listener: Arc<SyncMultiFrameListener>) -> Self {
        Self {
            listener,
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn device_index(&self) -> DeviceIndex {
        self.listener.device_index()
    }

    /// Channels every frame set carries
    pub fn channels(&self) -> ChannelSet {
        self.listener.channels()
    }

    /// False once the device stopped streaming
    pub fn is_streaming(&self) -> bool {
        self.listener.is_active()
    }

    /// Frames discarded because a set was still in flight
    pub fn dropped_frames(&self) -> u64 {
        self.listener.dropped_frames()
    }

    /// Block until a complete frame set is available.
    ///
    /// # Errors
    /// - `Conflict` if the device is not streaming (checked before waiting)
    /// - `Timeout` if the set is still incomplete after `timeout`
    #[instrument(
        name = "frame_sync_wait",
        skip(self),
        fields(device_index = self.device_index(), timeout_ms = timeout.as_millis() as u64)
    )]
    pub fn wait_for_frame_set(&self, timeout: Duration) -> Result<FrameSet> {
        let frames = self.listener.wait_for_new_frame(timeout)?;
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(frame_seq = sequence, "frame set acquired");
        Ok(FrameSet::new(self.listener.clone(), frames, sequence))
    }

    /// Return a frame set's buffers to the hardware layer.
    ///
    /// # Panics
    /// If the set was produced by a different synchronizer.
    pub fn release(&self, mut frame_set: FrameSet) {
        assert!(
            frame_set.is_from(&self.listener),
            "frame set of device {} released through the synchronizer of device {}",
            frame_set.device_index(),
            self.device_index()
        );
        frame_set.return_buffers();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{Channel, ContractError, Frame, FrameListener};

    fn depth_only(index: DeviceIndex) -> (Arc<SyncMultiFrameListener>, FrameSynchronizer) {
        let listener = Arc::new(SyncMultiFrameListener::new(
            index,
            ChannelSet::only(Channel::Depth),
        ));
        let sync = FrameSynchronizer::new(listener.clone());
        (listener, sync)
    }

    fn push_depth(listener: &SyncMultiFrameListener) {
        listener.on_new_frame(Frame::from_f32(Channel::Depth, 1, 1, &[1000.0]));
    }

    #[test]
    fn test_wait_and_release() {
        let (listener, sync) = depth_only(0);
        push_depth(&listener);

        let set = sync.wait_for_frame_set(Duration::from_millis(10)).unwrap();
        assert_eq!(set.sequence(), 1);
        assert!(set.depth().is_some());
        assert!(set.color().is_none());
        assert!(listener.is_in_flight());

        sync.release(set);
        assert!(!listener.is_in_flight());

        push_depth(&listener);
        let set = sync.wait_for_frame_set(Duration::from_millis(10)).unwrap();
        assert_eq!(set.sequence(), 2);
        sync.release(set);
    }

    #[test]
    fn test_drop_without_release_returns_buffers() {
        let (listener, sync) = depth_only(0);
        push_depth(&listener);
        drop(sync.wait_for_frame_set(Duration::from_millis(10)).unwrap());
        assert!(!listener.is_in_flight());
    }

    #[test]
    fn test_rejects_when_not_streaming() {
        let (listener, sync) = depth_only(1);
        listener.deactivate();
        assert!(!sync.is_streaming());

        let err = sync.wait_for_frame_set(Duration::from_secs(10)).unwrap_err();
        assert!(matches!(err, ContractError::Conflict { index: 1, .. }));
    }

    #[test]
    #[should_panic(expected = "released through the synchronizer")]
    fn test_foreign_release_panics() {
        let (listener_a, sync_a) = depth_only(0);
        let (_listener_b, sync_b) = depth_only(1);
        push_depth(&listener_a);
        let set = sync_a.wait_for_frame_set(Duration::from_millis(10)).unwrap();
        sync_b.release(set);
    }
}
