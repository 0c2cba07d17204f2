//! Pipeline orchestrator - coordinates all components.
//!
//! Devices are enumerated, selected, opened and started on the device
//! manager; one blocking acquisition loop per streaming device feeds the
//! dispatcher. Shutdown comes from the frame limit, the run timeout or the
//! caller's signal, and always ends with every device closed.

use std::future::Future;
use std::sync::PoisonError;
use std::time::{Duration, Instant};

use acquisition::{AcquisitionLoop, AcquisitionStats, CancelToken, LoopSettings};
use anyhow::{Context, Result};
use contracts::{DeviceIndex, PresentationFrame, Status, VisionConfig};
use device_manager::{DeviceManager, MockBackend, SharedDeviceManager};
use processing::PanelSize;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{info, warn};

use super::{build_manager, PipelineStats};
use crate::error::CliError;

/// Dispatcher drain deadline after the loops have ended
const DISPATCHER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Effective run configuration
    pub vision: VisionConfig,

    /// Whole-run timeout (None = no timeout)
    pub timeout: Option<Duration>,

    /// Dispatcher input buffer size
    pub buffer_size: usize,
}

/// Main pipeline orchestrator
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Run until every loop has ended or `shutdown` resolves.
    ///
    /// # Errors
    /// Fails before acquisition starts when no device can be enumerated,
    /// selected or started, or when the sinks cannot be created.
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<PipelineStats> {
        let start_time = Instant::now();
        let vision = &self.config.vision;

        if let Some(port) = vision.metrics_port.filter(|port| *port != 0) {
            observability::init_metrics_only(port)?;
            info!(port, "metrics endpoint available");
        }

        let panel_size = PanelSize {
            width: vision.display.width,
            height: vision.display.height,
        };
        // tokio's bounded channel panics on a zero capacity
        let (frame_tx, frame_rx) =
            mpsc::channel::<PresentationFrame>(self.config.buffer_size.max(1));
        let dispatcher = dispatcher::create_dispatcher(vision.sinks.clone(), panel_size, frame_rx)
            .context("failed to create dispatcher")?;
        let active_sinks = dispatcher.sink_names().len();
        let dispatcher_handle = dispatcher.spawn();
        info!(active_sinks, "dispatcher started");

        let mut manager = build_manager(vision);
        let streaming = match start_devices(&mut manager, vision) {
            Ok(streaming) => streaming,
            Err(e) => {
                manager.close_all();
                return Err(e);
            }
        };
        let manager = manager.into_shared();

        let cancel = CancelToken::new();
        let settings = LoopSettings::from_config(vision);
        let mut loops = JoinSet::new();
        for &index in &streaming {
            match AcquisitionLoop::for_device(&manager, index, settings, frame_tx.clone(), cancel.clone())
            {
                Ok(acquisition) => {
                    loops.spawn_blocking(move || acquisition.run());
                }
                Err(e) => warn!(device_index = index, error = %e, "acquisition loop not started"),
            }
        }
        // the dispatcher ends once every loop has dropped its sender
        drop(frame_tx);
        info!(devices = loops.len(), "acquisition running");

        let devices = self
            .wait_for_loops(&mut loops, &manager, &streaming, &cancel, shutdown)
            .await;

        info!("shutting down pipeline");
        manager
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .close_all();

        let sinks = match tokio::time::timeout(DISPATCHER_DRAIN_TIMEOUT, dispatcher_handle).await {
            Ok(Ok(sinks)) => sinks,
            Ok(Err(e)) => {
                warn!(error = %e, "dispatcher task failed");
                Vec::new()
            }
            Err(_) => {
                warn!(
                    timeout_secs = DISPATCHER_DRAIN_TIMEOUT.as_secs(),
                    "dispatcher did not drain in time"
                );
                Vec::new()
            }
        };

        let stats = PipelineStats {
            devices,
            sinks,
            duration: start_time.elapsed(),
        };
        info!(
            frames = stats.total_frames(),
            duration_secs = stats.duration.as_secs_f64(),
            fps = format!("{:.2}", stats.fps()),
            "pipeline shutdown complete"
        );
        Ok(stats)
    }

    /// Collect loop results; the timeout and `shutdown` cancel the loops and
    /// stop streaming so that blocked waits return immediately.
    async fn wait_for_loops(
        &self,
        loops: &mut JoinSet<AcquisitionStats>,
        manager: &SharedDeviceManager<MockBackend>,
        streaming: &[DeviceIndex],
        cancel: &CancelToken,
        shutdown: impl Future<Output = ()>,
    ) -> Vec<AcquisitionStats> {
        let timeout = self.config.timeout;
        let deadline = async move {
            match timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(deadline);
        tokio::pin!(shutdown);

        let mut devices = Vec::with_capacity(streaming.len());
        loop {
            tokio::select! {
                joined = loops.join_next() => match joined {
                    Some(Ok(stats)) => devices.push(stats),
                    Some(Err(e)) => warn!(error = %e, "acquisition loop aborted"),
                    None => break,
                },
                () = &mut shutdown, if !cancel.is_cancelled() => {
                    warn!("shutdown signal received, stopping acquisition");
                    stop_all(manager, streaming, cancel);
                }
                () = &mut deadline, if !cancel.is_cancelled() => {
                    warn!(timeout_secs = timeout.map(|t| t.as_secs()), "pipeline timed out");
                    stop_all(manager, streaming, cancel);
                }
            }
        }

        devices.sort_by_key(|stats| stats.device_index);
        devices
    }
}

fn stop_all(manager: &SharedDeviceManager<MockBackend>, streaming: &[DeviceIndex], cancel: &CancelToken) {
    cancel.cancel();
    let mut manager = manager.lock().unwrap_or_else(PoisonError::into_inner);
    for &index in streaming {
        if let Err(e) = manager.stop_streaming(index) {
            warn!(device_index = index, error = %e, "failed to stop streaming");
        }
    }
}

/// Enumerate, select, open and start; returns the streaming devices.
///
/// Devices that fail to open or start are skipped; the run fails only when
/// none is left.
fn start_devices(
    manager: &mut DeviceManager<MockBackend>,
    config: &VisionConfig,
) -> Result<Vec<DeviceIndex>> {
    match manager.refresh() {
        Ok(count) => info!(count, "devices enumerated"),
        Err(e) if e.status() == Status::EmptyData => return Err(CliError::NoDevices(e).into()),
        Err(e) => return Err(e).context("device enumeration failed"),
    }
    if let Err(e) = manager.log_devices() {
        warn!(error = %e, "failed to log devices");
    }

    let requested: Vec<DeviceIndex> = if config.devices.select.is_empty() {
        manager.list().iter().map(|record| record.index).collect()
    } else {
        config.devices.select.clone()
    };
    for &index in &requested {
        if !manager.select(index) {
            warn!(device_index = index, "device cannot be selected");
        }
    }
    let selected = manager.selected();
    if selected.is_empty() {
        return Err(CliError::NoDevicesSelected { requested }.into());
    }

    let channels = config.streaming.channels;
    let mut streaming = Vec::with_capacity(selected.len());
    for record in selected {
        let index = record.index;
        if let Err(e) = manager.open(index) {
            warn!(serial = %record.serial, error = %CliError::device(index, e), "device not opened");
            continue;
        }
        match manager.start_streaming(index, channels) {
            Ok(_) => {
                info!(device_index = index, serial = %record.serial, %channels, "streaming started");
                streaming.push(index);
            }
            Err(e) => {
                warn!(serial = %record.serial, error = %CliError::device(index, e), "streaming not started");
                if let Err(e) = manager.close(index) {
                    warn!(device_index = index, error = %e, "failed to close device");
                }
            }
        }
    }

    if streaming.is_empty() {
        return Err(CliError::NoDevicesStreaming.into());
    }
    Ok(streaming)
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{ChannelSet, SinkConfig, SinkType};

    fn vision(serials: &[&str]) -> VisionConfig {
        let mut config = VisionConfig::default();
        config.backend.serials = serials.iter().map(|s| s.to_string()).collect();
        config.backend.frame_rate_hz = 120.0;
        config.streaming.frame_timeout_ms = 500;
        config.display.width = 32;
        config.display.height = 24;
        config
    }

    fn pipeline(config: VisionConfig) -> Pipeline {
        Pipeline::new(PipelineConfig {
            vision: config,
            timeout: None,
            buffer_size: 8,
        })
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_runs_to_frame_limit() {
        let mut config = vision(&["AB12", "CD34"]);
        config.streaming.max_frames = 3;
        config.sinks.push(SinkConfig {
            name: "screen".to_string(),
            sink_type: SinkType::Mosaic,
            queue_capacity: 8,
        });

        let stats = pipeline(config).run(std::future::pending()).await.unwrap();
        assert_eq!(stats.devices.len(), 2);
        assert!(stats.devices.iter().all(|d| d.frames == 3));
        assert_eq!(stats.devices[0].serial, "AB12");
        assert_eq!(stats.sinks.len(), 2);
        for (_, report) in &stats.sinks {
            assert_eq!(report.devices.len(), 2);
            assert!(report.devices.values().all(|counts| counts.offered() == 3));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_zero_buffer_size_is_clamped() {
        let mut config = vision(&["AB12"]);
        config.streaming.max_frames = 2;

        let stats = Pipeline::new(PipelineConfig {
            vision: config,
            timeout: None,
            buffer_size: 0,
        })
        .run(std::future::pending())
        .await
        .unwrap();
        assert_eq!(stats.devices.len(), 1);
        assert_eq!(stats.devices[0].frames, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_shutdown_signal_cancels_loops() {
        let stats = pipeline(vision(&["AB12"]))
            .run(tokio::time::sleep(Duration::from_millis(100)))
            .await
            .unwrap();
        assert_eq!(stats.devices.len(), 1);
        assert_eq!(stats.devices[0].stop_reason, acquisition::StopReason::Cancelled);
    }

    #[tokio::test]
    async fn test_no_devices() {
        let err = pipeline(vision(&[])).run(std::future::pending()).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<CliError>(), Some(CliError::NoDevices(_))));
    }

    #[tokio::test]
    async fn test_unknown_selection() {
        let mut config = vision(&["AB12"]);
        config.devices.select = vec![5];
        let err = pipeline(config).run(std::future::pending()).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CliError>(),
            Some(CliError::NoDevicesSelected { requested }) if requested == &vec![5]
        ));
    }

    #[tokio::test]
    async fn test_denied_devices_are_skipped() {
        let mut config = vision(&["AB12"]);
        config.backend.deny_serials = vec!["AB12".to_string()];
        let err = pipeline(config).run(std::future::pending()).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<CliError>(), Some(CliError::NoDevicesStreaming)));
    }

    #[test]
    fn test_start_devices_partial_failure() {
        let mut config = vision(&["AB12", "CD34"]);
        config.backend.fail_serials = vec!["CD34".to_string()];
        config.streaming.channels = ChannelSet::ALL;
        let mut manager = build_manager(&config);

        let streaming = start_devices(&mut manager, &config).unwrap();
        assert_eq!(streaming, vec![0]);
        manager.close_all();
        assert_eq!(manager.open_count(), 0);
    }
}
