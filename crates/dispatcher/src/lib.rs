//! # Dispatcher
//!
//! Presentation fan-out.
//!
//! Responsibilities:
//! - Consume `PresentationFrame`s from the acquisition loops
//! - Fan out to every configured sink
//! - Isolate slow sinks: bounded per-sink queues, newest frame dropped when full
//! - Account every capture per sink and device (written, failed, dropped, superseded)

pub mod dispatcher;
pub mod error;
pub mod handle;
pub mod metrics;
pub mod sinks;

pub use contracts::{DataSink, PresentationFrame};
pub use dispatcher::{create_dispatcher, Dispatcher, DispatcherBuilder, DispatcherConfig};
pub use error::DispatcherError;
pub use handle::SinkHandle;
pub use metrics::{DeliveryCounts, SinkMetrics, SinkReport};
pub use sinks::{LogSink, Mosaic, MosaicBoard, MosaicSink};
