//! `validate` command implementation.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use contracts::{SinkType, VisionConfig};

use crate::cli::ValidateArgs;

#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    backend: String,
    device_count: usize,
    channels: String,
    frame_timeout_ms: u64,
    max_frames: u64,
    registration: bool,
    display: String,
    sink_count: usize,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("failed to serialize validation result")?;
        println!("{json}");
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("file not found: {}", args.config.display())),
            warnings: Vec::new(),
            summary: None,
        };
    }

    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(config) => ValidationResult {
            valid: true,
            config_path,
            error: None,
            warnings: collect_warnings(&config),
            summary: Some(summarize(&config)),
        },
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: Vec::new(),
            summary: None,
        },
    }
}

fn summarize(config: &VisionConfig) -> ConfigSummary {
    ConfigSummary {
        backend: format!("{:?}", config.backend.kind).to_lowercase(),
        device_count: config.backend.serials.len(),
        channels: config.streaming.channels.to_string(),
        frame_timeout_ms: config.streaming.frame_timeout_ms,
        max_frames: config.streaming.max_frames,
        registration: config.registration.enabled,
        display: format!("{}x{}", config.display.width, config.display.height),
        sink_count: config.sinks.len(),
    }
}

/// Non-fatal issues
fn collect_warnings(config: &VisionConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    let starved = config
        .streaming
        .channels
        .iter()
        .filter(|c| config.backend.never_deliver.contains(*c))
        .map(|c| c.to_string())
        .collect::<Vec<_>>();
    if !starved.is_empty() {
        warnings.push(format!(
            "backend never delivers {} - every frame set wait will time out",
            starved.join(", ")
        ));
    }

    let device_count = config.backend.serials.len() as i32;
    for index in &config.devices.select {
        if *index >= device_count {
            warnings.push(format!(
                "devices.select contains {index}, only {device_count} device(s) configured"
            ));
        }
    }

    if config.backend.serials.iter().any(String::is_empty) {
        warnings.push("backend.serials contains an empty serial - that device cannot be opened".into());
    }

    if config.sinks.is_empty() {
        warnings.push("no sinks configured - `run` needs at least one".into());
    } else if !config.sinks.iter().any(|s| s.sink_type == SinkType::Mosaic) {
        warnings.push("no mosaic sink configured - nothing is composed for display".into());
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(summary) = &result.summary {
            println!("\n  Backend: {} ({} devices)", summary.backend, summary.device_count);
            println!("  Channels: {}", summary.channels);
            println!("  Frame timeout: {} ms", summary.frame_timeout_ms);
            println!("  Max frames: {}", summary.max_frames);
            println!("  Registration: {}", summary.registration);
            println!("  Display: {}", summary.display);
            println!("  Sinks: {}", summary.sink_count);
        }

        if !result.warnings.is_empty() {
            println!("\n⚠ Warnings:");
            for warning in &result.warnings {
                println!("  - {warning}");
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(error) = &result.error {
            println!("\n  Error: {error}");
        }
    }
}
