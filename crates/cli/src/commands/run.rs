//! `run` command implementation.

use anyhow::{Context, Result};
use std::time::Duration;
use tracing::{error, info};

use contracts::VisionConfig;

use crate::cli::RunArgs;
use crate::pipeline::{Pipeline, PipelineConfig};
use crate::settings::resolve_run_config;

/// Execute the `run` command
pub async fn run_pipeline(args: &RunArgs) -> Result<()> {
    let config = resolve_run_config(args)?;

    info!(
        devices = config.backend.serials.len(),
        channels = %config.streaming.channels,
        max_frames = config.streaming.max_frames,
        registration = config.registration.enabled,
        sinks = config.sinks.len(),
        "configuration loaded"
    );

    // Dry run - just validate and exit
    if args.dry_run {
        info!("dry run mode - configuration is valid, exiting");
        print_config_summary(&config);
        return Ok(());
    }

    let pipeline = Pipeline::new(PipelineConfig {
        vision: config,
        timeout: (args.timeout > 0).then(|| Duration::from_secs(args.timeout)),
        buffer_size: args.buffer_size,
    });

    info!("starting pipeline");
    let stats = pipeline
        .run(shutdown_signal())
        .await
        .context("pipeline execution failed")?;

    info!(
        frames = stats.total_frames(),
        timeouts = stats.total_timeouts(),
        dropped = stats.total_dropped(),
        duration_secs = stats.duration.as_secs_f64(),
        fps = format!("{:.2}", stats.fps()),
        "pipeline completed"
    );
    stats.print_summary();
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
///
/// A handler that cannot be installed is logged and never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(config: &VisionConfig) {
    println!("\n=== Configuration Summary ===\n");
    println!("Backend: {:?}", config.backend.kind);
    println!("  Serials: {}", config.backend.serials.join(", "));
    println!("  Frame rate: {} Hz", config.backend.frame_rate_hz);

    if config.devices.select.is_empty() {
        println!("\nDevices: all enumerated");
    } else {
        println!("\nDevices: {:?}", config.devices.select);
    }

    println!("\nStreaming:");
    println!("  Channels: {}", config.streaming.channels);
    println!("  Frame timeout: {} ms", config.streaming.frame_timeout_ms);
    if config.streaming.max_frames == 0 {
        println!("  Max frames: unlimited");
    } else {
        println!("  Max frames: {}", config.streaming.max_frames);
    }

    println!("\nRegistration: {}", if config.registration.enabled { "on" } else { "off" });
    if config.registration.enabled {
        println!("  Occlusion filter: {}", config.registration.filter_occlusions);
    }
    println!("Display: {}x{}", config.display.width, config.display.height);

    println!("\nSinks ({}):", config.sinks.len());
    for sink in &config.sinks {
        println!("  - {} ({:?}, queue {})", sink.name, sink.sink_type, sink.queue_capacity);
    }

    println!();
}
