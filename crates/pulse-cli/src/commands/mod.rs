//! Command implementations.

mod config;
mod discover;
mod scan;
mod simulate;
mod watch;

pub use config::cmd_config;
pub use discover::cmd_discover;
pub use scan::cmd_scan;
pub use simulate::{SimulateArgs, cmd_simulate};
pub use watch::{WatchArgs, cmd_watch};

/// Default device selection and connection timeout, in seconds.
pub const DEFAULT_CONNECT_TIMEOUT: u64 = 15;
