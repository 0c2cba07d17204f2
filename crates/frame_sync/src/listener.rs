//! Multi-channel frame listener with joint-availability wait.
//!
//! The hardware layer pushes frames from its capture thread; the acquisition
//! loop blocks until one frame of every registered channel is pending.
//! Buffers of released or discarded frames are kept in a small pool and
//! handed back to the producer.

use std::fmt;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use bytes::BytesMut;
use contracts::{
    Channel, ChannelSet, ContractError, DeviceIndex, DeviceState, Frame, FrameListener, Result,
};
use metrics::counter;
use tracing::{debug, trace};

/// Recycled buffers kept per listener
const POOL_CAPACITY: usize = 6;

struct ListenerState {
    /// One pending slot per channel, indexed by `Channel::slot`
    pending: [Option<Frame>; 3],
    /// A frame set has been handed out and not released yet
    in_flight: bool,
    /// Cleared when streaming stops; wakes and rejects waiters
    active: bool,
    pool: Vec<BytesMut>,
    received: u64,
    dropped: u64,
}

impl ListenerState {
    fn pending_set(&self) -> ChannelSet {
        Channel::ALL
            .into_iter()
            .filter(|c| self.pending[c.slot()].is_some())
            .collect()
    }

    fn recycle(&mut self, buffer: BytesMut) {
        if self.pool.len() < POOL_CAPACITY {
            self.pool.push(buffer);
        }
    }
}

/// Listener that collects one frame per registered channel.
///
/// Single-consumer: while a frame set is in flight, incoming frames are
/// dropped and counted.
pub struct SyncMultiFrameListener {
    device_index: DeviceIndex,
    channels: ChannelSet,
    state: Mutex<ListenerState>,
    ready: Condvar,
}

impl fmt::Debug for SyncMultiFrameListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncMultiFrameListener")
            .field("device_index", &self.device_index)
            .field("channels", &self.channels)
            .finish()
    }
}

impl SyncMultiFrameListener {
    /// Create an active listener for `channels`
    pub fn new(device_index: DeviceIndex, channels: ChannelSet) -> Self {
        Self {
            device_index,
            channels,
            state: Mutex::new(ListenerState {
                pending: [None, None, None],
                in_flight: false,
                active: true,
                pool: Vec::with_capacity(POOL_CAPACITY),
                received: 0,
                dropped: 0,
            }),
            ready: Condvar::new(),
        }
    }

    #[inline]
    pub fn device_index(&self) -> DeviceIndex {
        self.device_index
    }

    #[inline]
    pub fn channels(&self) -> ChannelSet {
        self.channels
    }

    fn lock(&self) -> MutexGuard<'_, ListenerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// False once streaming has been stopped
    pub fn is_active(&self) -> bool {
        self.lock().active
    }

    /// Stop accepting frames and wake every waiter.
    ///
    /// Pending frames are discarded into the pool.
    pub fn deactivate(&self) {
        let mut state = self.lock();
        state.active = false;
        for slot in 0..state.pending.len() {
            if let Some(frame) = state.pending[slot].take() {
                state.recycle(frame.data);
            }
        }
        drop(state);
        self.ready.notify_all();
        debug!(device_index = self.device_index, "listener deactivated");
    }

    /// True when every registered channel has a pending frame
    pub fn has_new_frame(&self) -> bool {
        let state = self.lock();
        !state.in_flight && state.pending_set().is_superset(self.channels)
    }

    /// True while a frame set is handed out
    pub fn is_in_flight(&self) -> bool {
        self.lock().in_flight
    }

    /// Frames accepted since creation
    pub fn received_frames(&self) -> u64 {
        self.lock().received
    }

    /// Frames rejected because a set was in flight
    pub fn dropped_frames(&self) -> u64 {
        self.lock().dropped
    }

    /// Block until every registered channel has a frame.
    ///
    /// Returns the frames in channel order and marks the set in flight.
    ///
    /// # Errors
    /// - `Timeout` naming the missing channels when `timeout` elapses
    /// - `Conflict` when the listener is (or becomes) inactive
    ///
    /// # Panics
    /// If a previous set has not been released.
    pub fn wait_for_new_frame(&self, timeout: Duration) -> Result<Vec<Frame>> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        assert!(
            !state.in_flight,
            "frame set requested for device {} while the previous one is still in flight",
            self.device_index
        );

        loop {
            if !state.active {
                return Err(ContractError::conflict(
                    self.device_index,
                    DeviceState::Opened,
                    "wait for frames on",
                ));
            }

            let pending = state.pending_set();
            if pending.is_superset(self.channels) {
                let frames: Vec<Frame> = self
                    .channels
                    .iter()
                    .filter_map(|c| state.pending[c.slot()].take())
                    .collect();
                state.in_flight = true;
                trace!(
                    device_index = self.device_index,
                    frames = frames.len(),
                    "frame set complete"
                );
                return Ok(frames);
            }

            let now = Instant::now();
            if now >= deadline {
                let missing = self.channels.difference(pending).iter().collect();
                return Err(ContractError::Timeout {
                    waited_ms: timeout.as_millis() as u64,
                    missing,
                });
            }

            state = self
                .ready
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Return the buffers of a consumed set and accept new frames again
    pub fn release(&self, frames: impl IntoIterator<Item = Frame>) {
        let mut state = self.lock();
        for frame in frames {
            state.recycle(frame.data);
        }
        state.in_flight = false;
    }
}

impl FrameListener for SyncMultiFrameListener {
    fn on_new_frame(&self, frame: Frame) -> bool {
        let channel = frame.channel;
        let mut state = self.lock();

        if !state.active || !self.channels.contains(channel) {
            state.recycle(frame.data);
            return false;
        }

        if state.in_flight {
            state.dropped += 1;
            state.recycle(frame.data);
            drop(state);
            counter!("vision_listener_frames_dropped_total", "channel" => channel.to_string())
                .increment(1);
            return false;
        }

        if let Some(stale) = state.pending[channel.slot()].replace(frame) {
            state.recycle(stale.data);
        }
        state.received += 1;

        let complete = state.pending_set().is_superset(self.channels);
        drop(state);
        if complete {
            self.ready.notify_all();
        }
        true
    }

    fn acquire_buffer(&self, len: usize) -> BytesMut {
        let recycled = {
            let mut state = self.lock();
            let pos = state.pool.iter().position(|b| b.capacity() >= len);
            pos.map(|pos| state.pool.swap_remove(pos))
        };

        match recycled {
            Some(mut buffer) => {
                buffer.clear();
                buffer.resize(len, 0);
                buffer
            }
            None => BytesMut::zeroed(len),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn depth_frame(value: f32) -> Frame {
        Frame::from_f32(Channel::Depth, 2, 2, &[value; 4])
    }

    fn ir_frame() -> Frame {
        Frame::from_f32(Channel::Infrared, 2, 2, &[1.0; 4])
    }

    #[test]
    fn test_waits_for_every_channel() {
        let channels = ChannelSet::only(Channel::Depth).with(Channel::Infrared);
        let listener = SyncMultiFrameListener::new(0, channels);

        assert!(listener.on_new_frame(depth_frame(1.0)));
        assert!(!listener.has_new_frame());

        let err = listener
            .wait_for_new_frame(Duration::from_millis(20))
            .unwrap_err();
        match err {
            ContractError::Timeout { missing, .. } => assert_eq!(missing, vec![Channel::Infrared]),
            other => panic!("unexpected error: {other}"),
        }

        assert!(listener.on_new_frame(ir_frame()));
        let frames = listener.wait_for_new_frame(Duration::from_millis(20)).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].channel, Channel::Depth);
        assert_eq!(frames[1].channel, Channel::Infrared);
    }

    #[test]
    fn test_newer_frame_replaces_pending() {
        let listener = SyncMultiFrameListener::new(0, ChannelSet::only(Channel::Depth));
        listener.on_new_frame(depth_frame(1.0));
        listener.on_new_frame(depth_frame(2.0));

        let frames = listener.wait_for_new_frame(Duration::from_millis(10)).unwrap();
        assert_eq!(frames[0].sample(0), 2.0);
    }

    #[test]
    fn test_drops_while_in_flight() {
        let listener = SyncMultiFrameListener::new(0, ChannelSet::only(Channel::Depth));
        listener.on_new_frame(depth_frame(1.0));
        let frames = listener.wait_for_new_frame(Duration::from_millis(10)).unwrap();

        assert!(!listener.on_new_frame(depth_frame(2.0)));
        assert_eq!(listener.dropped_frames(), 1);

        listener.release(frames);
        assert!(listener.on_new_frame(depth_frame(3.0)));
        let frames = listener.wait_for_new_frame(Duration::from_millis(10)).unwrap();
        assert_eq!(frames[0].sample(0), 3.0);
    }

    #[test]
    fn test_ignores_unregistered_channel() {
        let listener = SyncMultiFrameListener::new(0, ChannelSet::only(Channel::Depth));
        assert!(!listener.on_new_frame(ir_frame()));
        assert_eq!(listener.received_frames(), 0);
    }

    #[test]
    fn test_deactivate_wakes_waiter() {
        let listener = Arc::new(SyncMultiFrameListener::new(3, ChannelSet::ALL));
        let waiter = {
            let listener = listener.clone();
            thread::spawn(move || listener.wait_for_new_frame(Duration::from_secs(10)))
        };

        thread::sleep(Duration::from_millis(20));
        listener.deactivate();

        let err = waiter.join().unwrap().unwrap_err();
        assert!(matches!(err, ContractError::Conflict { index: 3, .. }));
    }

    #[test]
    fn test_buffer_pool_recycles() {
        let listener = SyncMultiFrameListener::new(0, ChannelSet::only(Channel::Depth));
        listener.on_new_frame(depth_frame(1.0));
        let frames = listener.wait_for_new_frame(Duration::from_millis(10)).unwrap();
        let ptr = frames[0].data.as_ptr();
        listener.release(frames);

        let buffer = listener.acquire_buffer(16);
        assert_eq!(buffer.as_ptr(), ptr);
        assert_eq!(buffer.len(), 16);
        assert!(buffer.iter().all(|b| *b == 0));
    }

    #[test]
    #[should_panic(expected = "still in flight")]
    fn test_second_wait_before_release_panics() {
        let listener = SyncMultiFrameListener::new(0, ChannelSet::only(Channel::Depth));
        listener.on_new_frame(depth_frame(1.0));
        let _frames = listener.wait_for_new_frame(Duration::from_millis(10)).unwrap();
        let _ = listener.wait_for_new_frame(Duration::from_millis(10));
    }
}
