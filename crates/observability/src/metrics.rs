//! Acquisition metrics
//!
//! `record_*` feed the `metrics` facade (exported by Prometheus when
//! enabled); [`AcquisitionMetricsAggregator`] keeps in-memory statistics
//! for the summary printed at the end of a run.

use std::collections::BTreeMap;
use std::fmt;

use contracts::DeviceIndex;
use metrics::{counter, histogram};

fn device_label(device_index: DeviceIndex) -> String {
    device_index.to_string()
}

/// One frame set acquired and processed
pub fn record_frame_set(device_index: DeviceIndex, wait_ms: f64, processing_ms: f64) {
    let device = device_label(device_index);
    counter!("vision_frame_sets_total", "device" => device.clone()).increment(1);
    histogram!("vision_frame_wait_ms", "device" => device.clone()).record(wait_ms);
    histogram!("vision_processing_ms", "device" => device).record(processing_ms);
}

/// A wait that ran into its deadline
pub fn record_frame_timeout(device_index: DeviceIndex) {
    counter!("vision_frame_timeouts_total", "device" => device_label(device_index)).increment(1);
}

/// A presentation frame that never reached the dispatcher
pub fn record_presentation_dropped(device_index: DeviceIndex) {
    counter!(
        "vision_presentation_dropped_total",
        "device" => device_label(device_index)
    )
    .increment(1);
}

pub fn record_registration_latency_ms(latency_ms: f64) {
    histogram!("vision_registration_latency_ms").record(latency_ms);
}

/// Per-device in-memory statistics
#[derive(Debug, Clone, Default)]
pub struct AcquisitionMetricsAggregator {
    devices: BTreeMap<DeviceIndex, DeviceStats>,
}

#[derive(Debug, Clone, Default)]
struct DeviceStats {
    frame_sets: u64,
    timeouts: u64,
    dropped: u64,
    wait_ms: RunningStats,
    processing_ms: RunningStats,
    registered_ratio: RunningStats,
}

impl AcquisitionMetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_frame_set(
        &mut self,
        device_index: DeviceIndex,
        wait_ms: f64,
        processing_ms: f64,
        registered_ratio: Option<f32>,
    ) {
        let stats = self.devices.entry(device_index).or_default();
        stats.frame_sets += 1;
        stats.wait_ms.push(wait_ms);
        stats.processing_ms.push(processing_ms);
        if let Some(ratio) = registered_ratio {
            stats.registered_ratio.push(f64::from(ratio));
        }
    }

    pub fn record_timeout(&mut self, device_index: DeviceIndex) {
        self.devices.entry(device_index).or_default().timeouts += 1;
    }

    pub fn record_dropped(&mut self, device_index: DeviceIndex) {
        self.devices.entry(device_index).or_default().dropped += 1;
    }

    /// Fold another aggregator in (one per acquisition loop)
    pub fn merge(&mut self, other: AcquisitionMetricsAggregator) {
        for (index, stats) in other.devices {
            let entry = self.devices.entry(index).or_default();
            entry.frame_sets += stats.frame_sets;
            entry.timeouts += stats.timeouts;
            entry.dropped += stats.dropped;
            entry.wait_ms.merge(&stats.wait_ms);
            entry.processing_ms.merge(&stats.processing_ms);
            entry.registered_ratio.merge(&stats.registered_ratio);
        }
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            devices: self
                .devices
                .iter()
                .map(|(&device_index, stats)| DeviceSummary {
                    device_index,
                    frame_sets: stats.frame_sets,
                    timeouts: stats.timeouts,
                    dropped: stats.dropped,
                    timeout_rate: rate(stats.timeouts, stats.frame_sets + stats.timeouts),
                    wait_ms: StatsSummary::from(&stats.wait_ms),
                    processing_ms: StatsSummary::from(&stats.processing_ms),
                    registered_ratio: StatsSummary::from(&stats.registered_ratio),
                })
                .collect(),
        }
    }
}

fn rate(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub devices: Vec<DeviceSummary>,
}

#[derive(Debug, Clone, Default)]
pub struct DeviceSummary {
    pub device_index: DeviceIndex,
    pub frame_sets: u64,
    pub timeouts: u64,
    pub dropped: u64,
    /// Percent of waits that timed out
    pub timeout_rate: f64,
    pub wait_ms: StatsSummary,
    pub processing_ms: StatsSummary,
    pub registered_ratio: StatsSummary,
}

impl MetricsSummary {
    pub fn total_frame_sets(&self) -> u64 {
        self.devices.iter().map(|d| d.frame_sets).sum()
    }
}

impl fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Acquisition Summary ===")?;
        if self.devices.is_empty() {
            return writeln!(f, "No frames acquired");
        }
        for device in &self.devices {
            writeln!(f, "Device {}:", device.device_index)?;
            writeln!(f, "  Frame sets: {}", device.frame_sets)?;
            writeln!(
                f,
                "  Timeouts: {} ({:.2}%)",
                device.timeouts, device.timeout_rate
            )?;
            writeln!(f, "  Dropped presentations: {}", device.dropped)?;
            writeln!(f, "  Wait (ms): {}", device.wait_ms)?;
            writeln!(f, "  Processing (ms): {}", device.processing_ms)?;
            writeln!(f, "  Registered ratio: {}", device.registered_ratio)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// Online mean / variance (Welford)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    /// Combine two sample sets (Chan et al. parallel update)
    pub fn merge(&mut self, other: &RunningStats) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 {
            *self = other.clone();
            return;
        }
        let count = self.count + other.count;
        let delta = other.mean - self.mean;
        self.m2 += other.m2 + delta * delta * (self.count * other.count) as f64 / count as f64;
        self.mean += delta * other.count as f64 / count as f64;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
        self.count = count;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// Sample variance
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}
