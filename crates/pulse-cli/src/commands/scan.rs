//! Scan command implementation.

use std::path::PathBuf;

use anyhow::{Context, Result};
use pulse_core::{ScanOptions, scan};

use crate::cli::OutputFormat;
use crate::config::{Config, base_selector};
use crate::format::{format_scan_json, format_scan_text};
use crate::style;
use crate::util::write_output;

pub async fn cmd_scan(
    timeout: u64,
    all: bool,
    format: OutputFormat,
    output: Option<&PathBuf>,
    quiet: bool,
    no_color: bool,
    config: &Config,
) -> Result<()> {
    let options = ScanOptions::new()
        .duration_secs(timeout)
        .selector(base_selector(all, config)?);

    let spinner = if matches!(format, OutputFormat::Text) {
        style::scanning_spinner(timeout, quiet)
    } else {
        None
    };

    let devices = scan::scan_with_options(options).await;
    style::finish(spinner);
    let devices = devices.context("Failed to scan for devices")?;

    let content = match format {
        OutputFormat::Json => format_scan_json(&devices)?,
        OutputFormat::Text => format_scan_text(&devices, no_color),
    };

    write_output(output, &content)
}
