//! Pipeline statistics.

use std::time::Duration;

use acquisition::AcquisitionStats;
use dispatcher::SinkReport;
use observability::{AcquisitionMetricsAggregator, MetricsSummary};

/// Statistics from a pipeline run
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    /// One entry per acquisition loop, by device index
    pub devices: Vec<AcquisitionStats>,

    /// Final delivery report of each sink
    pub sinks: Vec<(String, SinkReport)>,

    /// Total duration of the pipeline run
    pub duration: Duration,
}

impl PipelineStats {
    pub fn total_frames(&self) -> u64 {
        self.devices.iter().map(|d| d.frames).sum()
    }

    pub fn total_timeouts(&self) -> u64 {
        self.devices.iter().map(|d| d.timeouts).sum()
    }

    pub fn total_dropped(&self) -> u64 {
        self.devices.iter().map(|d| d.dropped).sum()
    }

    /// Frame sets per second over all devices
    pub fn fps(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.total_frames() as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Merged per-device metrics of every loop
    pub fn metrics_summary(&self) -> MetricsSummary {
        let mut aggregator = AcquisitionMetricsAggregator::new();
        for device in &self.devices {
            aggregator.merge(device.metrics.clone());
        }
        aggregator.summary()
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                    Pipeline Statistics                       ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");

        println!("📊 Overview");
        println!("   ├─ Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   ├─ Frame sets: {}", self.total_frames());
        println!("   ├─ Timeouts: {}", self.total_timeouts());
        println!("   ├─ Dropped presentations: {}", self.total_dropped());
        println!("   ├─ FPS: {:.2}", self.fps());
        println!("   ├─ Devices: {}", self.devices.len());
        println!("   └─ Sinks: {}", self.sinks.len());

        if !self.devices.is_empty() {
            println!("\n📷 Devices");
            for device in &self.devices {
                println!(
                    "   ├─ [{}] {}: {} frame sets, {:.2} fps, {}",
                    device.device_index,
                    device.serial,
                    device.frames,
                    device.fps(),
                    device.stop_reason
                );
            }
        }

        if !self.sinks.is_empty() {
            println!("\n📤 Sinks");
            for (name, report) in &self.sinks {
                let totals = report.totals();
                println!(
                    "   ├─ {}: {} written, {} failed, {} dropped, {} superseded",
                    name, totals.written, totals.failed, totals.dropped, totals.superseded
                );
                for (device_index, counts) in &report.devices {
                    println!(
                        "   │   └─ [{}] {} written, {} dropped, last #{}",
                        device_index,
                        counts.written,
                        counts.dropped,
                        counts
                            .last_sequence
                            .map_or_else(|| "-".to_string(), |seq| seq.to_string())
                    );
                }
            }
        }

        println!("\n{}", self.metrics_summary());
    }
}
