//! CLI argument definitions using clap.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use contracts::{Channel, DeviceIndex, LogLevel};

/// vision - multi-device depth camera acquisition
#[derive(Parser, Debug)]
#[command(
    name = "vision",
    author,
    version,
    about = "Depth camera acquisition with depth/color registration",
    long_about = "Enumerates attached depth cameras, streams color, depth and infrared,\n\
                  registers depth onto color and hands display-ready images to the\n\
                  configured sinks. Runs against simulated devices by default."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "VISION_VERBOSE")]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format (overrides the config file)
    #[arg(long, value_enum, global = true, env = "VISION_LOG_FORMAT")]
    pub log_format: Option<LogFormatArg>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Level forced by `-v` / `-q`, if any
    pub fn level_override(&self) -> Option<LogLevel> {
        if self.quiet {
            Some(LogLevel::Error)
        } else if self.verbose > 0 {
            Some(LogLevel::Debug)
        } else {
            None
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Enumerate attached devices
    List(ListArgs),

    /// Validate a configuration file without touching devices
    Validate(ValidateArgs),

    /// Stream from the selected devices until stopped
    Run(RunArgs),
}

impl Commands {
    /// Config file named by the command, if any
    pub fn config_path(&self) -> Option<&PathBuf> {
        match self {
            Commands::List(args) => args.device.config.as_ref(),
            Commands::Validate(args) => Some(&args.config),
            Commands::Run(args) => args.device.config.as_ref(),
        }
    }
}

/// Options shared by commands that talk to devices
#[derive(Args, Debug, Clone, Default)]
pub struct DeviceArgs {
    /// Configuration file (TOML or JSON); built-in defaults when absent
    #[arg(short, long, env = "VISION_CONFIG")]
    pub config: Option<PathBuf>,

    /// Simulated device serials, overriding the configuration
    #[arg(long, value_delimiter = ',', env = "VISION_SERIALS")]
    pub serials: Option<Vec<String>>,
}

#[derive(Parser, Debug, Clone)]
pub struct ListArgs {
    #[command(flatten)]
    pub device: DeviceArgs,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Configuration file to validate
    #[arg(short, long, default_value = "vision.toml", env = "VISION_CONFIG")]
    pub config: PathBuf,

    /// Output the result as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub device: DeviceArgs,

    /// Device indices to stream (default: configuration, else all)
    #[arg(long, value_delimiter = ',')]
    pub select: Option<Vec<DeviceIndex>>,

    /// Channels to stream
    #[arg(long, value_enum, value_delimiter = ',')]
    pub channels: Option<Vec<ChannelArg>>,

    /// Frame sets per device before stopping (0 = unlimited)
    #[arg(long, env = "VISION_MAX_FRAMES")]
    pub max_frames: Option<u64>,

    /// Frame set wait deadline in milliseconds
    #[arg(long)]
    pub frame_timeout_ms: Option<u64>,

    /// Stop after this many seconds (0 = run until interrupted)
    #[arg(long, default_value = "0", env = "VISION_TIMEOUT")]
    pub timeout: u64,

    /// Skip depth/color registration
    #[arg(long)]
    pub no_registration: bool,

    /// Prometheus port (0 = disabled)
    #[arg(long, env = "VISION_METRICS_PORT")]
    pub metrics_port: Option<u16>,

    /// Dispatcher input queue size (at least 1)
    #[arg(
        long,
        default_value = "16",
        env = "VISION_BUFFER_SIZE",
        value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..)
    )]
    pub buffer_size: usize,

    /// Resolve and validate the configuration, then exit
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum LogFormatArg {
    Json,
    Pretty,
    Compact,
}

impl From<LogFormatArg> for contracts::LogFormat {
    fn from(format: LogFormatArg) -> Self {
        match format {
            LogFormatArg::Json => contracts::LogFormat::Json,
            LogFormatArg::Pretty => contracts::LogFormat::Pretty,
            LogFormatArg::Compact => contracts::LogFormat::Compact,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelArg {
    Color,
    Depth,
    #[value(alias = "ir")]
    Infrared,
}

impl From<ChannelArg> for Channel {
    fn from(channel: ChannelArg) -> Self {
        match channel {
            ChannelArg::Color => Channel::Color,
            ChannelArg::Depth => Channel::Depth,
            ChannelArg::Infrared => Channel::Infrared,
        }
    }
}
