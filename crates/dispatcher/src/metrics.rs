//! Per-sink delivery accounting, broken down by device
//!
//! Every capture offered to a sink ends in exactly one outcome: written,
//! failed, dropped at a full queue, or superseded by a newer capture of the
//! same device on a latest-only sink.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use contracts::{DeviceIndex, PresentationFrame};

/// Outcomes of one device's captures at one sink
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryCounts {
    pub written: u64,
    pub failed: u64,
    /// Rejected because the sink queue was full
    pub dropped: u64,
    /// Skipped in favour of a newer capture of the same device
    pub superseded: u64,
    /// Sequence of the last capture the sink consumed
    pub last_sequence: Option<u64>,
}

impl DeliveryCounts {
    /// Captures offered to the sink
    pub fn offered(&self) -> u64 {
        self.written + self.failed + self.dropped + self.superseded
    }

    fn merge(&mut self, other: &DeliveryCounts) {
        self.written += other.written;
        self.failed += other.failed;
        self.dropped += other.dropped;
        self.superseded += other.superseded;
        self.last_sequence = self.last_sequence.max(other.last_sequence);
    }
}

/// Accounting of one sink worker, shared between handle and worker
#[derive(Debug, Default)]
pub struct SinkMetrics {
    queue_len: AtomicUsize,
    devices: Mutex<BTreeMap<DeviceIndex, DeliveryCounts>>,
}

impl SinkMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_len(&self) -> usize {
        self.queue_len.load(Ordering::Relaxed)
    }

    pub fn set_queue_len(&self, len: usize) {
        self.queue_len.store(len, Ordering::Relaxed);
    }

    pub fn record_written(&self, frame: &PresentationFrame) {
        self.update(frame, |counts| {
            counts.written += 1;
            counts.last_sequence = Some(frame.sequence);
        });
    }

    pub fn record_failed(&self, frame: &PresentationFrame) {
        self.update(frame, |counts| {
            counts.failed += 1;
            counts.last_sequence = Some(frame.sequence);
        });
    }

    pub fn record_dropped(&self, frame: &PresentationFrame) {
        self.update(frame, |counts| counts.dropped += 1);
    }

    pub fn record_superseded(&self, frame: &PresentationFrame) {
        self.update(frame, |counts| counts.superseded += 1);
    }

    /// Counts of one device, zero if it never reached this sink
    pub fn device(&self, device_index: DeviceIndex) -> DeliveryCounts {
        self.lock().get(&device_index).copied().unwrap_or_default()
    }

    pub fn snapshot(&self) -> SinkReport {
        SinkReport {
            queue_len: self.queue_len(),
            devices: self.lock().clone(),
        }
    }

    fn update(&self, frame: &PresentationFrame, apply: impl FnOnce(&mut DeliveryCounts)) {
        apply(self.lock().entry(frame.device_index).or_default());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<DeviceIndex, DeliveryCounts>> {
        self.devices.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Point-in-time copy for the end-of-run report
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SinkReport {
    pub queue_len: usize,
    pub devices: BTreeMap<DeviceIndex, DeliveryCounts>,
}

impl SinkReport {
    /// Sum over all devices; `last_sequence` is the highest seen
    pub fn totals(&self) -> DeliveryCounts {
        self.devices
            .values()
            .fold(DeliveryCounts::default(), |mut acc, counts| {
                acc.merge(counts);
                acc
            })
    }
}
