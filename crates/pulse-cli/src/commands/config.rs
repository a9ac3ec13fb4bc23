//! Config command implementation.

use std::path::Path;

use anyhow::{Context, Result, bail};

use crate::cli::ConfigAction;
use crate::config::Config;

/// Run a config subcommand against the file at `path`.
pub fn cmd_config(action: ConfigAction, path: &Path, quiet: bool) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = Config::load_from(path);
            let content = toml::to_string_pretty(&config).context("Failed to serialize config")?;
            print!("{}", content);
        }
        ConfigAction::Get { key } => match Config::load_from(path).get(key) {
            Some(value) => println!("{}", value),
            None => println!("(not set)"),
        },
        ConfigAction::Set { key, value } => {
            let mut config = Config::load_from(path);
            config.set(key, &value)?;
            config.save_to(path)?;
            if !quiet {
                eprintln!("Set {:?} = {}", key, value);
            }
        }
        ConfigAction::Unset { key } => {
            let mut config = Config::load_from(path);
            config.unset(key);
            config.save_to(path)?;
            if !quiet {
                eprintln!("Unset {:?}", key);
            }
        }
        ConfigAction::Path => println!("{}", path.display()),
        ConfigAction::Init => {
            if path.exists() {
                bail!("Config file already exists: {}", path.display());
            }
            Config::default().save_to(path)?;
            if !quiet {
                eprintln!("Created {}", path.display());
            }
        }
    }
    Ok(())
}
