//! AcquisitionLoop - wait, process, release, hand off; one per device
//!
//! Runs on a blocking thread: the frame set wait is the only suspension
//! point. Per iteration, strictly in this order:
//!
//! 1. cancellation / frame limit check
//! 2. `wait_for_frame_set` (bounded by `frame_timeout`)
//! 3. registration + normalization + display preparation
//! 4. release of the frame set
//! 5. non-blocking hand-off to the dispatcher

use std::sync::PoisonError;
use std::time::{Duration, Instant};

use contracts::{
    Channel, DeviceIndex, PresentationFrame, RegistrationConfig, Result, Status, VisionConfig,
};
use device_manager::{DeviceBackend, SharedDeviceManager};
use frame_sync::FrameSynchronizer;
use observability::metrics;
use processing::{CapturePlanes, FrameProcessor, PanelSize};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::cancel::CancelToken;
use crate::stats::{AcquisitionStats, StopReason};

/// Per-loop settings taken from the run configuration
#[derive(Debug, Clone, Copy)]
pub struct LoopSettings {
    pub frame_timeout: Duration,
    /// 0 = unlimited
    pub max_frames: u64,
    pub registration: RegistrationConfig,
    pub panel_size: PanelSize,
}

impl LoopSettings {
    pub fn from_config(config: &VisionConfig) -> Self {
        Self {
            frame_timeout: Duration::from_millis(config.streaming.frame_timeout_ms),
            max_frames: config.streaming.max_frames,
            registration: config.registration,
            panel_size: PanelSize {
                width: config.display.width,
                height: config.display.height,
            },
        }
    }
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self::from_config(&VisionConfig::default())
    }
}

pub struct AcquisitionLoop {
    synchronizer: FrameSynchronizer,
    processor: FrameProcessor,
    output: mpsc::Sender<PresentationFrame>,
    settings: LoopSettings,
    cancel: CancelToken,
    serial: String,
}

impl AcquisitionLoop {
    pub fn new(
        synchronizer: FrameSynchronizer,
        processor: FrameProcessor,
        output: mpsc::Sender<PresentationFrame>,
        settings: LoopSettings,
        cancel: CancelToken,
    ) -> Self {
        Self {
            synchronizer,
            processor,
            output,
            settings,
            cancel,
            serial: String::new(),
        }
    }

    /// Loop for a streaming device of the manager.
    ///
    /// Registration uses the device calibration and is enabled when the
    /// settings ask for it and the device streams both color and depth.
    ///
    /// # Errors
    /// `Conflict` unless the device is streaming, `NotFound` / `InvalidParam`
    /// for an unknown index.
    #[instrument(name = "acquisition_loop_for_device", skip_all, fields(device_index = index))]
    pub fn for_device<B: DeviceBackend>(
        manager: &SharedDeviceManager<B>,
        index: DeviceIndex,
        settings: LoopSettings,
        output: mpsc::Sender<PresentationFrame>,
        cancel: CancelToken,
    ) -> Result<Self> {
        let manager = manager.lock().unwrap_or_else(PoisonError::into_inner);
        let synchronizer = manager.synchronizer(index)?;
        let serial = manager
            .find(index)
            .map(|record| record.serial)
            .unwrap_or_default();

        let mut processor = FrameProcessor::new(index, serial.clone(), settings.panel_size);
        let channels = synchronizer.channels();
        let can_register = channels.contains(Channel::Color) && channels.contains(Channel::Depth);
        if settings.registration.enabled && can_register {
            let (ir, color) = manager.camera_params(index)?;
            processor =
                processor.with_registration(ir, color, settings.registration.filter_occlusions);
        } else if settings.registration.enabled {
            warn!(%channels, "registration needs color and depth, disabled for this device");
        }

        let mut acquisition = Self::new(synchronizer, processor, output, settings, cancel);
        acquisition.serial = serial;
        Ok(acquisition)
    }

    pub fn device_index(&self) -> DeviceIndex {
        self.synchronizer.device_index()
    }

    /// Run until cancelled, the frame limit, or the stream going away.
    ///
    /// Timeouts are logged and counted, the device keeps streaming.
    #[instrument(
        name = "acquisition_loop_run",
        skip(self),
        fields(device_index = self.device_index(), serial = %self.serial)
    )]
    pub fn run(self) -> AcquisitionStats {
        let device_index = self.device_index();
        let started = Instant::now();
        let mut stats = AcquisitionStats::new(device_index, self.serial.clone());
        info!(
            timeout_ms = self.settings.frame_timeout.as_millis() as u64,
            max_frames = self.settings.max_frames,
            registration = self.processor.registration().is_some(),
            "acquisition loop started"
        );

        stats.stop_reason = loop {
            if self.cancel.is_cancelled() {
                break StopReason::Cancelled;
            }
            if self.settings.max_frames > 0 && stats.frames >= self.settings.max_frames {
                break StopReason::FrameLimit;
            }

            let wait_started = Instant::now();
            let frame_set = match self.synchronizer.wait_for_frame_set(self.settings.frame_timeout)
            {
                Ok(frame_set) => frame_set,
                Err(e) if e.status() == Status::Timeout => {
                    warn!(error = %e, "frame set wait timed out");
                    stats.timeouts += 1;
                    stats.metrics.record_timeout(device_index);
                    metrics::record_frame_timeout(device_index);
                    continue;
                }
                // a stop issued while cancelling still counts as cancellation
                Err(e) if e.status() == Status::Conflict => {
                    info!(reason = %e, "stream no longer active");
                    if self.cancel.is_cancelled() {
                        break StopReason::Cancelled;
                    }
                    break StopReason::StreamStopped;
                }
                Err(e) => {
                    error!(error = %e, "frame set wait failed");
                    break StopReason::Failed;
                }
            };
            let wait_ms = wait_started.elapsed().as_secs_f64() * 1000.0;

            let processing_started = Instant::now();
            let processed = self.processor.process(
                frame_set.sequence(),
                CapturePlanes {
                    color: frame_set.color(),
                    depth: frame_set.depth(),
                    infrared: frame_set.infrared(),
                },
            );
            self.synchronizer.release(frame_set);
            let processing_ms = processing_started.elapsed().as_secs_f64() * 1000.0;

            stats.frames += 1;
            stats.metrics.record_frame_set(
                device_index,
                wait_ms,
                processing_ms,
                processed.frame.registered_ratio,
            );
            metrics::record_frame_set(device_index, wait_ms, processing_ms);
            if let Some(elapsed) = processed.registration_time {
                metrics::record_registration_latency_ms(elapsed.as_secs_f64() * 1000.0);
            }
            debug!(frame_seq = processed.frame.sequence, wait_ms, processing_ms, "frame set processed");

            match self.output.try_send(processed.frame) {
                Ok(()) => {}
                Err(TrySendError::Full(frame)) => {
                    stats.dropped += 1;
                    stats.metrics.record_dropped(device_index);
                    metrics::record_presentation_dropped(device_index);
                    debug!(frame_seq = frame.sequence, "dispatcher busy, presentation dropped");
                }
                Err(TrySendError::Closed(_)) => break StopReason::OutputClosed,
            }
        };

        stats.duration = started.elapsed();
        info!(
            frames = stats.frames,
            timeouts = stats.timeouts,
            dropped = stats.dropped,
            fps = format!("{:.2}", stats.fps()),
            reason = %stats.stop_reason,
            "acquisition loop finished"
        );
        stats
    }

    /// Run on tokio's blocking pool
    pub fn spawn_blocking(self) -> JoinHandle<AcquisitionStats> {
        tokio::task::spawn_blocking(move || self.run())
    }
}
