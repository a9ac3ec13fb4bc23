//! Simulate command implementation.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use pulse_core::{SampleSource, SyntheticOptions, SyntheticSource};

use crate::cli::OutputFormat;
use crate::commands::watch::{StreamOptions, ctrl_c, stream_events};
use crate::util::OutputSink;

/// Arguments for the simulate command.
pub struct SimulateArgs {
    pub seed: Option<u64>,
    pub count: u64,
    pub speed: f64,
    pub format: OutputFormat,
    pub output: Option<PathBuf>,
    pub quiet: bool,
    pub no_color: bool,
}

pub async fn cmd_simulate(args: SimulateArgs) -> Result<()> {
    let source = SyntheticSource::new(synthetic_options(args.seed, args.speed));
    let mut sink = OutputSink::open(args.output.as_ref())?;
    let events = source.bus().receiver();

    if !args.quiet {
        eprintln!("Generating synthetic samples... (press Ctrl+C to stop)");
    }
    source.start().await;

    let options = StreamOptions {
        format: args.format,
        count: args.count,
        no_color: args.no_color,
    };
    stream_events(&source, events, &options, &mut sink, ctrl_c()).await?;
    Ok(())
}

/// Default synthetic timers compressed by `speed`.
fn synthetic_options(seed: Option<u64>, speed: f64) -> SyntheticOptions {
    let defaults = SyntheticOptions::default();
    let options = SyntheticOptions::default()
        .heart_rate_interval(scaled(defaults.heart_rate_interval, speed))
        .steps_interval(scaled(defaults.steps_interval, speed))
        .spo2_interval(scaled(defaults.spo2_interval, speed))
        .battery_interval(scaled(defaults.battery_interval, speed));
    match seed {
        Some(seed) => options.seed(seed),
        None => options,
    }
}

fn scaled(interval: Duration, speed: f64) -> Duration {
    let nanos = (interval.as_nanos() as f64 / speed).round() as u64;
    Duration::from_nanos(nanos).max(Duration::from_millis(1))
}
