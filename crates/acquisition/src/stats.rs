//! Acquisition loop statistics

use std::fmt;
use std::time::Duration;

use contracts::DeviceIndex;
use observability::AcquisitionMetricsAggregator;

/// Why a loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Cancelled,
    /// `max_frames` frame sets were processed
    FrameLimit,
    /// Streaming was stopped underneath the loop
    StreamStopped,
    /// The dispatcher input is gone
    OutputClosed,
    /// Unexpected wait failure
    Failed,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StopReason::Cancelled => "cancelled",
            StopReason::FrameLimit => "frame limit reached",
            StopReason::StreamStopped => "stream stopped",
            StopReason::OutputClosed => "output closed",
            StopReason::Failed => "failed",
        })
    }
}

/// Result of one device loop
#[derive(Debug, Clone)]
pub struct AcquisitionStats {
    pub device_index: DeviceIndex,
    pub serial: String,
    /// Frame sets processed
    pub frames: u64,
    pub timeouts: u64,
    /// Presentation frames rejected by a full dispatcher queue
    pub dropped: u64,
    pub duration: Duration,
    pub stop_reason: StopReason,
    pub metrics: AcquisitionMetricsAggregator,
}

impl AcquisitionStats {
    pub(crate) fn new(device_index: DeviceIndex, serial: impl Into<String>) -> Self {
        Self {
            device_index,
            serial: serial.into(),
            frames: 0,
            timeouts: 0,
            dropped: 0,
            duration: Duration::ZERO,
            stop_reason: StopReason::Cancelled,
            metrics: AcquisitionMetricsAggregator::new(),
        }
    }

    pub fn fps(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.frames as f64 / secs
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fps() {
        let mut stats = AcquisitionStats::new(0, "AB12");
        assert_eq!(stats.fps(), 0.0);
        stats.frames = 60;
        stats.duration = Duration::from_secs(2);
        assert!((stats.fps() - 30.0).abs() < 1e-9);
    }
}
