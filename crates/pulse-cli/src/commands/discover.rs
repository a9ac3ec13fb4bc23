//! Discover command implementation.

use std::path::PathBuf;

use anyhow::{Context, Result};
use pulse_core::{BtleCentral, DeviceSession};

use crate::cli::{DeviceArgs, OutputFormat};
use crate::commands::DEFAULT_CONNECT_TIMEOUT;
use crate::config::{Config, resolve_selector, resolve_timeout, session_config};
use crate::format::{DiscoverySummary, format_discovery_json, format_discovery_text};
use crate::style;
use crate::util::write_output;

pub async fn cmd_discover(
    args: DeviceArgs,
    format: OutputFormat,
    output: Option<&PathBuf>,
    quiet: bool,
    no_color: bool,
    config: &Config,
) -> Result<()> {
    let target = args.device.clone();
    let selector = resolve_selector(args.device, args.all, config)?;
    let timeout = resolve_timeout(args.timeout, config, DEFAULT_CONNECT_TIMEOUT);

    let central = BtleCentral::new()
        .await
        .context("Failed to open Bluetooth adapter")?;
    let session = DeviceSession::with_config(central, session_config(timeout, selector))?;

    let spinner = style::connecting_spinner(target.as_deref(), quiet);
    let connected = session.connect(None).await;
    let device = match connected {
        Ok(device) => device,
        Err(e) => {
            style::finish(spinner);
            return Err(e).context("Failed to connect");
        }
    };

    let services = session.services().await;
    let info = session.device_info().await;
    let battery = session.battery_level().await;
    session.disconnect().await;
    style::finish(spinner);

    let summary = DiscoverySummary {
        device: &device,
        services: &services,
        info: info.as_ref(),
        battery,
    };
    let content = match format {
        OutputFormat::Json => format_discovery_json(&summary, session.decoders())?,
        OutputFormat::Text => format_discovery_text(&summary, session.decoders(), no_color),
    };

    write_output(output, &content)
}
