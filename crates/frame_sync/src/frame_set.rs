//! FrameSet - one synchronized capture

use std::fmt;
use std::sync::Arc;

use contracts::{Channel, ChannelSet, DeviceIndex, Frame};
use tracing::warn;

use crate::SyncMultiFrameListener;

/// Frames of one capture, owned by the caller until released.
///
/// Release goes through [`FrameSynchronizer::release`](crate::FrameSynchronizer::release),
/// which consumes the set. A set dropped without release returns its buffers
/// on its own and logs a warning.
pub struct FrameSet {
    origin: Arc<SyncMultiFrameListener>,
    frames: [Option<Frame>; 3],
    sequence: u64,
    released: bool,
}

impl FrameSet {
    pub(crate) fn new(origin: Arc<SyncMultiFrameListener>, frames: Vec<Frame>, sequence: u64) -> Self {
        let mut slots = [None, None, None];
        for frame in frames {
            let slot = frame.channel.slot();
            slots[slot] = Some(frame);
        }
        Self {
            origin,
            frames: slots,
            sequence,
            released: false,
        }
    }

    /// Producing device
    pub fn device_index(&self) -> DeviceIndex {
        self.origin.device_index()
    }

    /// Per-synchronizer set counter, starting at 1
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn get(&self, channel: Channel) -> Option<&Frame> {
        self.frames[channel.slot()].as_ref()
    }

    pub fn color(&self) -> Option<&Frame> {
        self.get(Channel::Color)
    }

    pub fn depth(&self) -> Option<&Frame> {
        self.get(Channel::Depth)
    }

    pub fn infrared(&self) -> Option<&Frame> {
        self.get(Channel::Infrared)
    }

    /// Channels present in this set
    pub fn channels(&self) -> ChannelSet {
        Channel::ALL
            .into_iter()
            .filter(|c| self.frames[c.slot()].is_some())
            .collect()
    }

    pub(crate) fn is_from(&self, listener: &Arc<SyncMultiFrameListener>) -> bool {
        Arc::ptr_eq(&self.origin, listener)
    }

    /// Hand the buffers back to the listener
    pub(crate) fn return_buffers(&mut self) {
        let frames: Vec<Frame> = self.frames.iter_mut().filter_map(Option::take).collect();
        self.origin.release(frames);
        self.released = true;
    }
}

impl fmt::Debug for FrameSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameSet")
            .field("device_index", &self.device_index())
            .field("sequence", &self.sequence)
            .field("channels", &self.channels())
            .finish()
    }
}

impl Drop for FrameSet {
    fn drop(&mut self) {
        if !self.released {
            warn!(
                device_index = self.device_index(),
                sequence = self.sequence,
                "frame set dropped without release"
            );
            self.return_buffers();
        }
    }
}
