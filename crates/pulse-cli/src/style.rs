//! Terminal styling: spinners and table borders.

use std::io::{self, IsTerminal};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tabled::Table;
use tabled::settings::Style;

/// Braille dots animation.
const SPINNER_TICK_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

const SPINNER_TICK_MS: u64 = 80;

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars(SPINNER_TICK_CHARS)
}

/// A ticking spinner on stderr, or `None` when quiet or stderr is not a
/// terminal.
pub fn spinner(message: impl Into<String>, quiet: bool) -> Option<ProgressBar> {
    if quiet || !io::stderr().is_terminal() {
        return None;
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(spinner_style());
    pb.set_message(message.into());
    pb.enable_steady_tick(Duration::from_millis(SPINNER_TICK_MS));
    Some(pb)
}

pub fn scanning_spinner(timeout_secs: u64, quiet: bool) -> Option<ProgressBar> {
    spinner(
        format!("Scanning for wearables... ({timeout_secs}s)"),
        quiet,
    )
}

pub fn connecting_spinner(target: Option<&str>, quiet: bool) -> Option<ProgressBar> {
    let message = match target {
        Some(target) => format!("Connecting to {target}..."),
        None => "Connecting...".to_string(),
    };
    spinner(message, quiet)
}

/// Clear a spinner before output is written.
pub fn finish(spinner: Option<ProgressBar>) {
    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }
}

/// Rounded borders, or blank ones for plain output.
pub fn apply_table_style(table: &mut Table, no_color: bool) {
    if no_color {
        table.with(Style::blank());
    } else {
        table.with(Style::rounded());
    }
}
