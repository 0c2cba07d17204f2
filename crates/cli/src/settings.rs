//! Effective configuration: file (or defaults) with CLI overrides on top.

use anyhow::{Context, Result};
use tracing::info;

use config_loader::ConfigLoader;
use contracts::{ChannelSet, VisionConfig};

use crate::cli::{DeviceArgs, RunArgs};
use crate::error::CliError;

/// Load the configuration file, or the defaults when none is given
pub fn load_config(args: &DeviceArgs) -> Result<VisionConfig> {
    let mut config = match &args.config {
        Some(path) => {
            if !path.exists() {
                return Err(CliError::config_not_found(path.display().to_string()).into());
            }
            ConfigLoader::load_from_path(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?
        }
        None => VisionConfig::default(),
    };

    if let Some(serials) = &args.serials {
        info!(?serials, "overriding device serials from CLI");
        config.backend.serials = serials.clone();
    }
    ConfigLoader::validate(&config).context("invalid configuration")?;
    Ok(config)
}

/// Configuration for `run`
pub fn resolve_run_config(args: &RunArgs) -> Result<VisionConfig> {
    let mut config = load_config(&args.device)?;
    apply_run_overrides(&mut config, args);
    ConfigLoader::validate(&config).context("invalid configuration after CLI overrides")?;
    Ok(config)
}

fn apply_run_overrides(config: &mut VisionConfig, args: &RunArgs) {
    if let Some(select) = &args.select {
        config.devices.select = select.clone();
    }
    if let Some(channels) = &args.channels {
        config.streaming.channels = channels.iter().map(|c| (*c).into()).collect::<ChannelSet>();
        // registration follows the requested channels
        if config.registration.enabled && !config.streaming.can_register() {
            info!(
                channels = %config.streaming.channels,
                "registration disabled, color and depth are not both streamed"
            );
            config.registration.enabled = false;
        }
    }
    if let Some(max_frames) = args.max_frames {
        config.streaming.max_frames = max_frames;
    }
    if let Some(timeout_ms) = args.frame_timeout_ms {
        config.streaming.frame_timeout_ms = timeout_ms;
    }
    if args.no_registration {
        config.registration.enabled = false;
    }
    if let Some(port) = args.metrics_port {
        config.metrics_port = Some(port);
    }
}
