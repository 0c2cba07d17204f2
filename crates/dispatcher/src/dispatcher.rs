//! Dispatcher - fan-out of prepared captures to sinks

use std::collections::{HashMap, HashSet};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument};

use contracts::{PresentationFrame, SinkConfig, SinkType};
use processing::PanelSize;

use crate::error::DispatcherError;
use crate::handle::SinkHandle;
use crate::metrics::SinkReport;
use crate::sinks::{LogSink, MosaicBoard, MosaicSink};

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub sinks: Vec<SinkConfig>,
    /// Mosaic panel size for frames without panels
    pub panel_size: PanelSize,
}

pub struct DispatcherBuilder {
    config: DispatcherConfig,
    input_rx: mpsc::Receiver<PresentationFrame>,
}

impl DispatcherBuilder {
    pub fn new(config: DispatcherConfig, input_rx: mpsc::Receiver<PresentationFrame>) -> Self {
        Self { config, input_rx }
    }

    /// Spawn one worker per sink; must run inside a tokio runtime
    ///
    /// # Errors
    /// `NoSinks` for an empty list, `DuplicateSink` for a repeated name.
    #[instrument(
        name = "dispatcher_builder_build",
        skip(self),
        fields(sink_count = self.config.sinks.len())
    )]
    pub fn build(self) -> Result<Dispatcher, DispatcherError> {
        if self.config.sinks.is_empty() {
            return Err(DispatcherError::NoSinks);
        }
        let mut names = HashSet::new();
        if let Some(dup) = self
            .config
            .sinks
            .iter()
            .find(|s| !names.insert(s.name.as_str()))
        {
            return Err(DispatcherError::DuplicateSink(dup.name.clone()));
        }

        let mut handles = Vec::with_capacity(self.config.sinks.len());
        let mut mosaics = HashMap::new();
        for sink_config in &self.config.sinks {
            let (handle, board) = create_sink_handle(sink_config, self.config.panel_size);
            if let Some(board) = board {
                mosaics.insert(sink_config.name.clone(), board);
            }
            handles.push(handle);
        }

        Ok(Dispatcher {
            handles,
            mosaics,
            input_rx: self.input_rx,
        })
    }
}

#[instrument(
    name = "dispatcher_create_sink_handle",
    skip(config, panel_size),
    fields(sink = %config.name, sink_type = ?config.sink_type)
)]
fn create_sink_handle(
    config: &SinkConfig,
    panel_size: PanelSize,
) -> (SinkHandle, Option<watch::Receiver<MosaicBoard>>) {
    match config.sink_type {
        SinkType::Log => {
            let sink = LogSink::new(&config.name);
            (SinkHandle::spawn(sink, config.queue_capacity), None)
        }
        SinkType::Mosaic => {
            let sink = MosaicSink::new(&config.name, panel_size);
            let board = sink.subscribe();
            (SinkHandle::spawn(sink, config.queue_capacity), Some(board))
        }
    }
}

pub struct Dispatcher {
    handles: Vec<SinkHandle>,
    mosaics: HashMap<String, watch::Receiver<MosaicBoard>>,
    input_rx: mpsc::Receiver<PresentationFrame>,
}

impl Dispatcher {
    /// Dispatcher over prebuilt handles
    pub fn with_handles(
        handles: Vec<SinkHandle>,
        input_rx: mpsc::Receiver<PresentationFrame>,
    ) -> Self {
        Self {
            handles,
            mosaics: HashMap::new(),
            input_rx,
        }
    }

    pub fn sink_names(&self) -> Vec<&str> {
        self.handles.iter().map(SinkHandle::name).collect()
    }

    /// Board of a mosaic sink, by sink name
    pub fn mosaic_board(&self, sink: &str) -> Option<watch::Receiver<MosaicBoard>> {
        self.mosaics.get(sink).cloned()
    }

    pub fn metrics(&self) -> Vec<(String, SinkReport)> {
        collect_metrics(&self.handles)
    }

    /// Fan out until every input sender is dropped, then drain the sinks.
    ///
    /// Returns the final per-sink metrics.
    #[instrument(name = "dispatcher_run", skip(self))]
    pub async fn run(mut self) -> Vec<(String, SinkReport)> {
        info!(sinks = self.handles.len(), "dispatcher started");

        let mut frame_count: u64 = 0;
        while let Some(frame) = self.input_rx.recv().await {
            frame_count += 1;
            self.dispatch_frame(&frame);

            if frame_count.is_multiple_of(100) {
                debug!(frames = frame_count, "dispatcher progress");
            }
        }

        info!(frames = frame_count, "dispatcher input closed, shutting down");

        let metrics_handles: Vec<_> = self
            .handles
            .iter()
            .map(|h| (h.name().to_string(), h.metrics().clone()))
            .collect();
        for handle in self.handles {
            handle.shutdown().await;
        }

        info!("dispatcher shutdown complete");
        metrics_handles
            .into_iter()
            .map(|(name, metrics)| (name, metrics.snapshot()))
            .collect()
    }

    pub fn spawn(self) -> JoinHandle<Vec<(String, SinkReport)>> {
        tokio::spawn(self.run())
    }

    fn dispatch_frame(&self, frame: &PresentationFrame) {
        for handle in &self.handles {
            handle.try_send(frame.clone());
        }
    }
}

fn collect_metrics(handles: &[SinkHandle]) -> Vec<(String, SinkReport)> {
    handles
        .iter()
        .map(|h| (h.name().to_string(), h.metrics().snapshot()))
        .collect()
}

/// Build a dispatcher from sink configs
///
/// # Errors
/// See [`DispatcherBuilder::build`].
pub fn create_dispatcher(
    sinks: Vec<SinkConfig>,
    panel_size: PanelSize,
    input_rx: mpsc::Receiver<PresentationFrame>,
) -> Result<Dispatcher, DispatcherError> {
    DispatcherBuilder::new(DispatcherConfig { sinks, panel_size }, input_rx).build()
}
