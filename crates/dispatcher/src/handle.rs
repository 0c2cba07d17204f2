//! SinkHandle - one sink behind its own bounded queue and worker task
//!
//! A full queue rejects the newest capture. A latest-only sink additionally
//! has its backlog collapsed to the newest capture of each device before
//! every write round, so a slow display shows current images instead of
//! working through stale ones.

use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument, trace, warn};

use contracts::{DataSink, DeviceIndex, PresentationFrame};

use crate::metrics::SinkMetrics;

pub struct SinkHandle {
    name: String,
    tx: mpsc::Sender<PresentationFrame>,
    metrics: Arc<SinkMetrics>,
    worker: JoinHandle<()>,
}

impl SinkHandle {
    /// Spawn the worker task; must run inside a tokio runtime
    pub fn spawn<S: DataSink + Send + 'static>(sink: S, queue_capacity: usize) -> Self {
        let name = sink.name().to_string();
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let metrics = Arc::new(SinkMetrics::new());

        let worker = tokio::spawn(sink_worker(sink, rx, Arc::clone(&metrics)));

        Self {
            name,
            tx,
            metrics,
            worker,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metrics(&self) -> &Arc<SinkMetrics> {
        &self.metrics
    }

    /// Queue a capture without waiting.
    ///
    /// Returns false when it was dropped (queue full or worker gone).
    pub fn try_send(&self, frame: PresentationFrame) -> bool {
        match self.tx.try_send(frame) {
            Ok(()) => {
                self.metrics
                    .set_queue_len(self.tx.max_capacity() - self.tx.capacity());
                true
            }
            Err(mpsc::error::TrySendError::Full(frame)) => {
                self.metrics.record_dropped(&frame);
                warn!(
                    sink = %self.name,
                    device_index = frame.device_index,
                    frame_seq = frame.sequence,
                    dropped = self.metrics.device(frame.device_index).dropped,
                    "sink queue full, capture dropped"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(frame)) => {
                self.metrics.record_dropped(&frame);
                error!(sink = %self.name, "sink worker closed unexpectedly");
                false
            }
        }
    }

    /// Close the queue and wait for the worker to drain it
    #[instrument(name = "sink_handle_shutdown", skip(self), fields(sink = %self.name))]
    pub async fn shutdown(self) {
        drop(self.tx);
        if let Err(e) = self.worker.await {
            error!(sink = %self.name, error = ?e, "sink worker panicked");
        }
        debug!(sink = %self.name, "sink handle shut down");
    }
}

#[instrument(
    name = "sink_worker_loop",
    skip_all,
    fields(sink = %sink.name(), latest_only = sink.latest_only())
)]
async fn sink_worker<S: DataSink>(
    mut sink: S,
    mut rx: mpsc::Receiver<PresentationFrame>,
    metrics: Arc<SinkMetrics>,
) {
    debug!("sink worker started");
    let latest_only = sink.latest_only();

    while let Some(first) = rx.recv().await {
        let mut round = vec![first];
        if latest_only {
            while let Ok(frame) = rx.try_recv() {
                round.push(frame);
            }
            round = keep_latest_per_device(round, &metrics);
        }
        metrics.set_queue_len(rx.len());

        for frame in &round {
            match sink.write(frame).await {
                Ok(()) => metrics.record_written(frame),
                Err(e) => {
                    // a failed write never stops the worker
                    metrics.record_failed(frame);
                    error!(
                        device_index = frame.device_index,
                        frame_seq = frame.sequence,
                        error = %e,
                        "sink write failed"
                    );
                }
            }
        }
    }

    if let Err(e) = sink.flush().await {
        error!(error = %e, "flush failed on shutdown");
    }
    if let Err(e) = sink.close().await {
        error!(error = %e, "close failed on shutdown");
    }

    debug!("sink worker stopped");
}

/// Newest capture of each device, in arrival order; the rest are counted
/// as superseded.
fn keep_latest_per_device(
    round: Vec<PresentationFrame>,
    metrics: &SinkMetrics,
) -> Vec<PresentationFrame> {
    let mut newest: BTreeMap<DeviceIndex, usize> = BTreeMap::new();
    for (position, frame) in round.iter().enumerate() {
        newest.insert(frame.device_index, position);
    }

    round
        .into_iter()
        .enumerate()
        .filter_map(|(position, frame)| {
            if newest.get(&frame.device_index) == Some(&position) {
                Some(frame)
            } else {
                trace!(
                    device_index = frame.device_index,
                    frame_seq = frame.sequence,
                    "capture superseded"
                );
                metrics.record_superseded(&frame);
                None
            }
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use contracts::{Channel, ContractError, DisplayImage};
    use std::sync::atomic::{AtomicU64, Ordering};
    use tokio::time::{sleep, Duration};

    pub(crate) fn presentation(device_index: i32, sequence: u64) -> PresentationFrame {
        PresentationFrame {
            device_index,
            serial: format!("SN{device_index}"),
            sequence,
            registered_ratio: None,
            panels: vec![DisplayImage::black(Channel::Depth, 4, 3)],
        }
    }

    struct CountingSink {
        name: String,
        write_count: Arc<AtomicU64>,
        should_fail: bool,
        delay_ms: u64,
        latest_only: bool,
    }

    impl CountingSink {
        fn new(name: &str, write_count: Arc<AtomicU64>) -> Self {
            Self {
                name: name.to_string(),
                write_count,
                should_fail: false,
                delay_ms: 0,
                latest_only: false,
            }
        }
    }

    impl DataSink for CountingSink {
        fn name(&self) -> &str {
            &self.name
        }

        fn latest_only(&self) -> bool {
            self.latest_only
        }

        async fn write(&mut self, _frame: &PresentationFrame) -> Result<(), ContractError> {
            if self.delay_ms > 0 {
                sleep(Duration::from_millis(self.delay_ms)).await;
            }
            if self.should_fail {
                return Err(ContractError::sink_write(&self.name, "rejected"));
            }
            self.write_count.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }

        async fn flush(&mut self) -> Result<(), ContractError> {
            Ok(())
        }

        async fn close(&mut self) -> Result<(), ContractError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_sink_handle_delivers_in_order() {
        let write_count = Arc::new(AtomicU64::new(0));
        let handle = SinkHandle::spawn(CountingSink::new("test", write_count.clone()), 10);

        for i in 0..5 {
            assert!(handle.try_send(presentation(0, i)));
        }

        handle.shutdown().await;
        assert_eq!(write_count.load(Ordering::Relaxed), 5);
    }

    #[tokio::test]
    async fn test_full_queue_drops_newest() {
        let write_count = Arc::new(AtomicU64::new(0));
        let mut sink = CountingSink::new("slow", write_count.clone());
        sink.delay_ms = 100;
        let handle = SinkHandle::spawn(sink, 2);

        let accepted = (0..10).filter(|&i| handle.try_send(presentation(0, i))).count();

        assert!(accepted < 10);
        assert_eq!(handle.metrics().device(0).dropped, 10 - accepted as u64);

        handle.shutdown().await;
        assert_eq!(write_count.load(Ordering::Relaxed), accepted as u64);
    }

    #[tokio::test]
    async fn test_failing_sink_keeps_running() {
        let mut sink = CountingSink::new("failing", Arc::new(AtomicU64::new(0)));
        sink.should_fail = true;
        let handle = SinkHandle::spawn(sink, 10);

        for i in 0..3 {
            handle.try_send(presentation(0, i));
        }
        let metrics = handle.metrics().clone();
        handle.shutdown().await;

        let counts = metrics.device(0);
        assert_eq!(counts.failed, 3);
        assert_eq!(counts.written, 0);
        assert_eq!(counts.last_sequence, Some(2));
    }

    #[tokio::test]
    async fn test_latest_only_sink_skips_stale_captures() {
        let write_count = Arc::new(AtomicU64::new(0));
        let mut sink = CountingSink::new("display", write_count.clone());
        sink.delay_ms = 20;
        sink.latest_only = true;
        let handle = SinkHandle::spawn(sink, 16);

        for i in 0..6 {
            assert!(handle.try_send(presentation(0, i)));
            assert!(handle.try_send(presentation(1, i)));
        }
        let metrics = handle.metrics().clone();
        handle.shutdown().await;

        for device in 0..2 {
            let counts = metrics.device(device);
            assert_eq!(counts.written + counts.superseded, 6);
            assert!(counts.superseded > 0);
            assert_eq!(counts.dropped, 0);
            assert_eq!(counts.last_sequence, Some(5));
        }
        assert_eq!(
            write_count.load(Ordering::Relaxed),
            metrics.snapshot().totals().written
        );
    }

    #[test]
    fn test_keep_latest_preserves_arrival_order() {
        let metrics = SinkMetrics::new();
        let round = vec![
            presentation(0, 1),
            presentation(1, 1),
            presentation(0, 2),
            presentation(2, 1),
            presentation(1, 2),
        ];

        let kept: Vec<_> = keep_latest_per_device(round, &metrics)
            .iter()
            .map(|f| (f.device_index, f.sequence))
            .collect();
        assert_eq!(kept, vec![(0, 2), (2, 1), (1, 2)]);
        assert_eq!(metrics.device(0).superseded, 1);
        assert_eq!(metrics.device(1).superseded, 1);
        assert_eq!(metrics.device(2).superseded, 0);
    }
}
