//! Mock hardware backend
//!
//! Implements `DeviceBackend` without hardware: synthetic devices that
//! stream generated color / depth / infrared frames from a background
//! thread. Supports hot-plug simulation and injected open failures.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use contracts::{
    BackendConfig, Channel, ChannelSet, ColorCameraParams, ContractError, Frame, FrameFormat,
    FrameListener, HandleId, IrCameraParams, Result, SharedFrameListener, COLOR_HEIGHT,
    COLOR_WIDTH, DEPTH_HEIGHT, DEPTH_WIDTH,
};
use tracing::{debug, instrument, trace, warn};

use crate::backend::DeviceBackend;

/// Mock backend configuration
#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Attached device serials, in enumeration order
    pub serials: Vec<String>,
    /// Capture rate (Hz)
    pub frame_rate_hz: f64,
    /// Channels that are never produced
    pub never_deliver: ChannelSet,
    /// Serials refused with `PermissionDenied`
    pub deny_serials: Vec<String>,
    /// Serials whose open fails with `Unsuccess`
    pub fail_serials: Vec<String>,
    /// Serials that open but refuse to start streaming
    pub refuse_start_serials: Vec<String>,
    pub firmware_version: String,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            serials: vec!["000000000001".to_string()],
            frame_rate_hz: 30.0,
            never_deliver: ChannelSet::EMPTY,
            deny_serials: Vec::new(),
            fail_serials: Vec::new(),
            refuse_start_serials: Vec::new(),
            firmware_version: "4.0.3917.0".to_string(),
        }
    }
}

impl From<&BackendConfig> for MockConfig {
    fn from(config: &BackendConfig) -> Self {
        Self {
            serials: config.serials.clone(),
            frame_rate_hz: config.frame_rate_hz,
            never_deliver: config.never_deliver,
            deny_serials: config.deny_serials.clone(),
            fail_serials: config.fail_serials.clone(),
            ..Default::default()
        }
    }
}

/// Native handle of a mock device
#[derive(Debug)]
pub struct MockHandle {
    id: HandleId,
    serial: String,
}

impl MockHandle {
    pub fn serial(&self) -> &str {
        &self.serial
    }
}

struct MockDevice {
    listener: Option<(ChannelSet, SharedFrameListener)>,
    running: Arc<AtomicBool>,
    producer: Option<JoinHandle<()>>,
}

impl MockDevice {
    fn is_streaming(&self) -> bool {
        self.producer.is_some()
    }
}

/// Mock hardware backend
pub struct MockBackend {
    config: Mutex<MockConfig>,
    /// Serials captured by the last `enumerate`
    enumerated: Mutex<Vec<String>>,
    /// Open devices by handle
    devices: Mutex<HashMap<HandleId, MockDevice>>,
    next_handle: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockBackend {
    /// Create default mock backend (one attached device)
    pub fn new() -> Self {
        Self::with_config(MockConfig::default())
    }

    /// Create mock backend from configuration
    pub fn with_config(config: MockConfig) -> Self {
        Self {
            config: Mutex::new(config),
            enumerated: Mutex::new(Vec::new()),
            devices: Mutex::new(HashMap::new()),
            // Start at 1 so that handle ids are easy to spot in logs
            next_handle: AtomicU64::new(1),
        }
    }

    /// Create mock backend with the given attached serials
    pub fn with_serials<I, S>(serials: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_config(MockConfig {
            serials: serials.into_iter().map(Into::into).collect(),
            ..Default::default()
        })
    }

    /// Replace the attached devices (hot-plug simulation).
    ///
    /// Takes effect on the next `enumerate`.
    pub fn set_serials<I, S>(&self, serials: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        lock(&self.config).serials = serials.into_iter().map(Into::into).collect();
    }

    /// Number of currently open handles
    pub fn open_count(&self) -> usize {
        lock(&self.devices).len()
    }

    /// Number of devices with a running producer
    pub fn streaming_count(&self) -> usize {
        lock(&self.devices)
            .values()
            .filter(|d| d.is_streaming())
            .count()
    }

    /// Number of open devices with a listener installed
    pub fn listener_count(&self) -> usize {
        lock(&self.devices)
            .values()
            .filter(|d| d.listener.is_some())
            .count()
    }

    fn is_attached(&self, serial: &str) -> bool {
        lock(&self.config).serials.iter().any(|s| s == serial)
    }

    fn spawn_producer(
        serial: &str,
        channels: ChannelSet,
        listener: SharedFrameListener,
        frame_rate_hz: f64,
        running: Arc<AtomicBool>,
    ) -> std::io::Result<JoinHandle<()>> {
        let interval = Duration::from_secs_f64(1.0 / frame_rate_hz);
        let serial = serial.to_string();

        thread::Builder::new()
            .name(format!("mock-{serial}"))
            .spawn(move || {
                let scene = SyntheticScene::new();
                let start = Instant::now();
                let mut sequence: u32 = 0;

                debug!(serial = %serial, channels = %channels, "mock producer started");

                while running.load(Ordering::Relaxed) {
                    sequence = sequence.wrapping_add(1);
                    let timestamp_us = start.elapsed().as_micros() as u64;

                    for channel in channels.iter() {
                        let frame = scene.render(channel, listener.as_ref(), sequence, timestamp_us);
                        listener.on_new_frame(frame);
                    }

                    trace!(serial = %serial, frame_seq = sequence, "mock frames sent");
                    thread::sleep(interval);
                }

                debug!(serial = %serial, "mock producer stopped");
            })
    }

    /// Stop the producer of a device, if running
    fn stop_producer(&self, id: HandleId) {
        let producer = {
            let mut devices = lock(&self.devices);
            devices.get_mut(&id).and_then(|device| {
                device.running.store(false, Ordering::SeqCst);
                device.producer.take()
            })
        };

        if let Some(producer) = producer {
            if producer.join().is_err() {
                warn!(handle = %id, "mock producer panicked");
            }
        }
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceBackend for MockBackend {
    type Handle = MockHandle;

    fn enumerate(&self) -> usize {
        let serials = lock(&self.config).serials.clone();
        let count = serials.len();
        *lock(&self.enumerated) = serials;
        count
    }

    fn serial(&self, position: usize) -> String {
        lock(&self.enumerated)
            .get(position)
            .cloned()
            .unwrap_or_default()
    }

    #[instrument(name = "mock_backend_open", skip(self), fields(serial = %serial))]
    fn open(&self, serial: &str) -> Result<MockHandle> {
        {
            let config = lock(&self.config);
            if config.deny_serials.iter().any(|s| s == serial) {
                return Err(ContractError::PermissionDenied {
                    serial: serial.to_string(),
                    message: "mock access denied".into(),
                });
            }
            if config.fail_serials.iter().any(|s| s == serial) {
                return Err(ContractError::unsuccess(format!(
                    "mock failure opening '{serial}'"
                )));
            }
        }

        if !self.is_attached(serial) {
            return Err(ContractError::unsuccess(format!(
                "no device with serial '{serial}'"
            )));
        }

        let id = HandleId(self.next_handle.fetch_add(1, Ordering::SeqCst));
        lock(&self.devices).insert(
            id,
            MockDevice {
                listener: None,
                running: Arc::new(AtomicBool::new(false)),
                producer: None,
            },
        );

        Ok(MockHandle {
            id,
            serial: serial.to_string(),
        })
    }

    fn handle_id(&self, handle: &MockHandle) -> HandleId {
        handle.id
    }

    fn set_listener(&self, handle: &MockHandle, channels: ChannelSet, listener: SharedFrameListener) {
        if let Some(device) = lock(&self.devices).get_mut(&handle.id) {
            device.listener = Some((channels, listener));
        }
    }

    fn clear_listener(&self, handle: &MockHandle) {
        if let Some(device) = lock(&self.devices).get_mut(&handle.id) {
            device.listener = None;
        }
    }

    #[instrument(name = "mock_backend_start", skip(self, handle), fields(serial = %handle.serial))]
    fn start(&self, handle: &MockHandle) -> Result<()> {
        let (never_deliver, frame_rate_hz) = {
            let config = lock(&self.config);
            if config.refuse_start_serials.contains(&handle.serial) {
                return Err(ContractError::unsuccess(format!(
                    "mock failure starting '{}'",
                    handle.serial
                )));
            }
            (config.never_deliver, config.frame_rate_hz)
        };

        let mut devices = lock(&self.devices);
        let device = devices
            .get_mut(&handle.id)
            .ok_or_else(|| ContractError::unsuccess(format!("handle {} is not open", handle.id)))?;

        if device.is_streaming() {
            return Ok(());
        }

        let (channels, listener) = device
            .listener
            .clone()
            .ok_or_else(|| ContractError::unsuccess("no frame listener registered"))?;

        device.running.store(true, Ordering::SeqCst);
        let producer = Self::spawn_producer(
            &handle.serial,
            channels.difference(never_deliver),
            listener,
            frame_rate_hz,
            device.running.clone(),
        )?;
        device.producer = Some(producer);
        Ok(())
    }

    fn stop(&self, handle: &MockHandle) {
        self.stop_producer(handle.id);
    }

    fn close(&self, handle: MockHandle) {
        self.stop_producer(handle.id);
        lock(&self.devices).remove(&handle.id);
        debug!(serial = %handle.serial, handle = %handle.id, "mock device closed");
    }

    fn ir_camera_params(&self, _handle: &MockHandle) -> IrCameraParams {
        IrCameraParams::default()
    }

    fn color_camera_params(&self, _handle: &MockHandle) -> ColorCameraParams {
        ColorCameraParams::default()
    }

    fn firmware_version(&self, _handle: &MockHandle) -> String {
        lock(&self.config).firmware_version.clone()
    }
}

/// Pre-rendered synthetic planes, copied into pooled buffers per frame
struct SyntheticScene {
    color: Vec<u8>,
    depth: Vec<f32>,
    infrared: Vec<f32>,
}

impl SyntheticScene {
    /// Background distance (mm)
    const BACKGROUND_MM: f32 = 2000.0;
    /// Raised box distance (mm)
    const BOX_MM: f32 = 1200.0;

    fn new() -> Self {
        let mut color = Vec::with_capacity((COLOR_WIDTH * COLOR_HEIGHT * 4) as usize);
        for y in 0..COLOR_HEIGHT {
            let g = (y * 255 / (COLOR_HEIGHT - 1)) as u8;
            for x in 0..COLOR_WIDTH {
                let b = (x * 255 / (COLOR_WIDTH - 1)) as u8;
                color.extend_from_slice(&[b, g, 128, 0]);
            }
        }

        let box_x = DEPTH_WIDTH * 3 / 8..DEPTH_WIDTH * 5 / 8;
        let box_y = DEPTH_HEIGHT * 3 / 8..DEPTH_HEIGHT * 5 / 8;
        let mut depth = Vec::with_capacity((DEPTH_WIDTH * DEPTH_HEIGHT) as usize);
        let mut infrared = Vec::with_capacity((DEPTH_WIDTH * DEPTH_HEIGHT) as usize);
        for y in 0..DEPTH_HEIGHT {
            for x in 0..DEPTH_WIDTH {
                let z = if box_x.contains(&x) && box_y.contains(&y) {
                    Self::BOX_MM
                } else {
                    Self::BACKGROUND_MM
                };
                depth.push(z);
                infrared.push((x + y) as f32 * 4.0);
            }
        }

        Self {
            color,
            depth,
            infrared,
        }
    }

    fn render(
        &self,
        channel: Channel,
        listener: &dyn FrameListener,
        sequence: u32,
        timestamp_us: u64,
    ) -> Frame {
        let (bytes, width, height, format): (&[u8], u32, u32, FrameFormat) = match channel {
            Channel::Color => (&self.color, COLOR_WIDTH, COLOR_HEIGHT, FrameFormat::Bgrx),
            Channel::Depth => (
                bytemuck::cast_slice(&self.depth),
                DEPTH_WIDTH,
                DEPTH_HEIGHT,
                FrameFormat::Float,
            ),
            Channel::Infrared => (
                bytemuck::cast_slice(&self.infrared),
                DEPTH_WIDTH,
                DEPTH_HEIGHT,
                FrameFormat::Float,
            ),
        };

        let mut buffer = listener.acquire_buffer(bytes.len());
        buffer.copy_from_slice(bytes);
        Frame::new(channel, width, height, format, buffer).with_sequence(sequence, timestamp_us)
    }
}
