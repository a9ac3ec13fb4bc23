//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Output format for commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    /// One JSON document per line
    Json,
}

impl OutputFormat {
    /// Parse a format name stored in the config file.
    pub fn from_name(name: &str) -> Option<Self> {
        <Self as ValueEnum>::from_str(name, true).ok()
    }
}

/// Reusable device connection arguments
#[derive(Debug, Clone, Args)]
pub struct DeviceArgs {
    /// Device name, address or platform id, or use PULSE_DEVICE env var
    #[arg(short, long, env = "PULSE_DEVICE")]
    pub device: Option<String>,

    /// Accept any advertising device instead of known wearables only
    #[arg(long)]
    pub all: bool,

    /// Device selection and connection timeout in seconds
    #[arg(short = 'T', long, default_value = "15")]
    pub timeout: u64,
}

#[derive(Parser)]
#[command(name = "pulse")]
#[command(author, version, about = "CLI for BLE wearable telemetry", long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Output format (defaults to the configured format, then text)
    #[arg(short, long, global = true, value_enum)]
    pub format: Option<OutputFormat>,

    /// Write output to file instead of stdout
    #[arg(short, long, global = true)]
    pub output: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan for nearby wearables
    Scan {
        /// Scan timeout in seconds
        #[arg(short, long, default_value = "5")]
        timeout: u64,

        /// Show every advertising device
        #[arg(long)]
        all: bool,
    },

    /// Connect, list services and characteristics, then disconnect
    Discover {
        #[command(flatten)]
        device: DeviceArgs,
    },

    /// Stream decoded samples from a device
    Watch {
        #[command(flatten)]
        device: DeviceArgs,

        /// Stop after this many samples (0 for unlimited)
        #[arg(short = 'n', long, default_value = "0")]
        count: u64,
    },

    /// Stream samples from the synthetic generator
    Simulate {
        /// Seed for reproducible samples
        #[arg(long)]
        seed: Option<u64>,

        /// Stop after this many samples (0 for unlimited)
        #[arg(short = 'n', long, default_value = "0")]
        count: u64,

        /// Time compression factor applied to every sample interval
        #[arg(long, default_value = "1.0", value_parser = parse_speed)]
        speed: f64,
    },

    /// Manage CLI configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// Configuration keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ConfigKey {
    /// Default device identifier
    Device,
    /// Default output format
    Format,
    /// Default connection timeout in seconds
    Timeout,
    /// Disable colored output
    NoColor,
    /// Comma-separated name prefixes used for device selection
    NamePrefixes,
    /// Comma-separated service UUIDs used for device selection
    Services,
}

/// Configuration subcommands
#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Get a configuration value
    Get {
        /// Configuration key
        #[arg(value_enum)]
        key: ConfigKey,
    },

    /// Set a configuration value
    Set {
        /// Configuration key
        #[arg(value_enum)]
        key: ConfigKey,
        /// Configuration value
        value: String,
    },

    /// Unset (remove) a configuration value
    Unset {
        /// Configuration key to remove
        #[arg(value_enum)]
        key: ConfigKey,
    },

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init,
}

fn parse_speed(value: &str) -> Result<f64, String> {
    let speed: f64 = value
        .parse()
        .map_err(|_| format!("'{value}' is not a number"))?;
    if speed.is_finite() && speed > 0.0 {
        Ok(speed)
    } else {
        Err("speed must be a positive number".to_string())
    }
}
