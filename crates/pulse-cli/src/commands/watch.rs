//! Watch command implementation.
//!
//! Both `watch` and `simulate` print events through [`stream_events`], so a
//! synthetic source and a real device produce identical output.

use std::future::Future;
use std::path::PathBuf;

use anyhow::{Context, Result};
use pulse_core::{BtleCentral, DeviceSession, SampleSource, SessionEvent};
use time::OffsetDateTime;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::warn;

use crate::cli::{DeviceArgs, OutputFormat};
use crate::commands::DEFAULT_CONNECT_TIMEOUT;
use crate::config::{Config, resolve_selector, resolve_timeout, session_config};
use crate::format::format_event;
use crate::style;
use crate::util::OutputSink;

/// Arguments for the watch command.
pub struct WatchArgs {
    pub device: DeviceArgs,
    pub count: u64,
    pub format: OutputFormat,
    pub output: Option<PathBuf>,
    pub quiet: bool,
    pub no_color: bool,
}

/// How streamed events are rendered and when streaming stops.
#[derive(Debug, Clone, Copy)]
pub struct StreamOptions {
    pub format: OutputFormat,
    /// Stop after this many samples; 0 streams until interrupted.
    pub count: u64,
    pub no_color: bool,
}

pub async fn cmd_watch(args: WatchArgs, config: &Config) -> Result<()> {
    let WatchArgs {
        device,
        count,
        format,
        output,
        quiet,
        no_color,
    } = args;

    let target = device.device.clone();
    let selector = resolve_selector(device.device, device.all, config)?;
    let timeout = resolve_timeout(device.timeout, config, DEFAULT_CONNECT_TIMEOUT);

    let central = BtleCentral::new()
        .await
        .context("Failed to open Bluetooth adapter")?;
    let session = DeviceSession::with_config(central, session_config(timeout, selector))?;
    let mut sink = OutputSink::open(output.as_ref())?;
    let events = session.bus().receiver();

    let spinner = style::connecting_spinner(target.as_deref(), quiet);
    let connected = session.connect(None).await;
    style::finish(spinner);
    connected.context("Failed to connect")?;
    if !quiet {
        eprintln!("Streaming... (press Ctrl+C to stop)");
    }

    let options = StreamOptions {
        format,
        count,
        no_color,
    };
    stream_events(&session, events, &options, &mut sink, ctrl_c()).await?;
    Ok(())
}

/// Resolves on Ctrl+C, or never if the signal handler cannot be installed.
pub async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}

/// Print events from `source` until `count` samples were seen, the source
/// disconnects, or `shutdown` resolves. The source is shut down before
/// returning and its final lifecycle events are printed.
///
/// Returns the number of samples printed.
pub async fn stream_events<S, F>(
    source: &S,
    mut events: broadcast::Receiver<SessionEvent>,
    options: &StreamOptions,
    sink: &mut OutputSink,
    shutdown: F,
) -> Result<u64>
where
    S: SampleSource + ?Sized,
    F: Future<Output = ()>,
{
    let streamed = pump(&mut events, options, sink, shutdown).await;
    source.shutdown().await;
    let samples = streamed?;

    while let Ok(event) = events.try_recv() {
        if event.is_transition() {
            emit(&event, options, sink)?;
        }
    }
    Ok(samples)
}

async fn pump<F>(
    events: &mut broadcast::Receiver<SessionEvent>,
    options: &StreamOptions,
    sink: &mut OutputSink,
    shutdown: F,
) -> Result<u64>
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut samples = 0;

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                eprintln!("\nShutting down...");
                return Ok(samples);
            }
            event = events.recv() => match event {
                Ok(event) => {
                    emit(&event, options, sink)?;
                    match event {
                        SessionEvent::Sample { .. } => {
                            samples += 1;
                            if options.count > 0 && samples >= options.count {
                                return Ok(samples);
                            }
                        }
                        SessionEvent::Disconnected { .. } => return Ok(samples),
                        _ => {}
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Output fell behind, skipped {} events", skipped);
                }
                Err(RecvError::Closed) => return Ok(samples),
            }
        }
    }
}

fn emit(event: &SessionEvent, options: &StreamOptions, sink: &mut OutputSink) -> Result<()> {
    let line = format_event(
        event,
        options.format,
        OffsetDateTime::now_utc(),
        options.no_color,
    )?;
    sink.write_line(&line)
}
