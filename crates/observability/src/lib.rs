//! # Observability
//!
//! Tracing setup and acquisition metrics.
//!
//! - `tracing` subscriber in Json / Pretty / Compact format
//! - The five-level log scale (`none` < `error` < `warning` < `info` < `debug`)
//!   mapped onto `tracing` filters
//! - Prometheus exporter, optional
//! - In-memory aggregation for the end-of-run summary
//!
//! ```ignore
//! observability::init_with_config(ObservabilityConfig::from_vision(&config))?;
//! metrics::record_frame_set(0, wait_ms, processing_ms);
//! ```

pub mod metrics;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use contracts::{LogFormat, LogLevel};

pub use crate::metrics::{
    record_frame_set, record_frame_timeout, record_presentation_dropped,
    record_registration_latency_ms, AcquisitionMetricsAggregator, DeviceSummary, MetricsSummary,
    RunningStats, StatsSummary,
};

#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    pub log_format: LogFormat,
    /// Prometheus port; `None` or `0` disables the exporter
    pub metrics_port: Option<u16>,
    /// Used when `RUST_LOG` is unset
    pub default_log_level: LogLevel,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Compact,
            metrics_port: None,
            default_log_level: LogLevel::Info,
        }
    }
}

impl ObservabilityConfig {
    pub fn from_vision(config: &contracts::VisionConfig) -> Self {
        Self {
            log_format: config.logging.format,
            metrics_port: config.metrics_port,
            default_log_level: config.logging.level,
        }
    }
}

/// `tracing` filter of a log level; `None` silences everything
pub fn level_filter(level: LogLevel) -> LevelFilter {
    match level {
        LogLevel::None => LevelFilter::OFF,
        LogLevel::Error => LevelFilter::ERROR,
        LogLevel::Warning => LevelFilter::WARN,
        LogLevel::Info => LevelFilter::INFO,
        LogLevel::Debug => LevelFilter::DEBUG,
    }
}

/// Install the global subscriber and, if configured, the Prometheus exporter.
///
/// # Errors
/// Fails if a global subscriber or recorder is already installed.
pub fn init_with_config(config: ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(level_filter(config.default_log_level).into())
        .from_env_lossy();

    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_names(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .try_init(),
        LogFormat::Pretty => registry.with(fmt::layer().pretty()).try_init(),
        LogFormat::Compact => registry
            .with(fmt::layer().compact().with_thread_names(true))
            .try_init(),
    }
    .context("failed to initialize tracing subscriber")?;

    if let Some(port) = config.metrics_port.filter(|p| *p != 0) {
        init_metrics_only(port)?;
    }

    tracing::debug!(
        log_format = ?config.log_format,
        level = %config.default_log_level,
        metrics_port = ?config.metrics_port,
        "observability initialized"
    );
    Ok(())
}

/// Prometheus exporter only, when tracing is set up elsewhere
pub fn init_metrics_only(port: u16) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("failed to install Prometheus recorder")?;

    tracing::info!(port, "Prometheus metrics endpoint initialized");
    Ok(())
}
