//! Configuration file management.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use pulse_core::{DeviceSelector, SessionConfig};
use pulse_types::uuid::from_short;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cli::{ConfigKey, OutputFormat};

/// Configuration file structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Default device identifier
    #[serde(default)]
    pub device: Option<String>,

    /// Default output format
    #[serde(default)]
    pub format: Option<String>,

    /// Disable colored output
    #[serde(default)]
    pub no_color: bool,

    /// Connection timeout in seconds
    #[serde(default)]
    pub timeout: Option<u64>,

    /// Name prefixes accepted during device selection
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub name_prefixes: Vec<String>,

    /// Service UUIDs accepted during device selection
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<String>,
}

impl Config {
    /// Get the config file path
    pub fn path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pulse")
            .join("config.toml")
    }

    /// Load config from file, or return default if not found
    pub fn load() -> Self {
        Self::load_from(&Self::path())
    }

    pub fn load_from(path: &Path) -> Self {
        if path.exists() {
            match fs::read_to_string(path) {
                Ok(content) => match toml::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        eprintln!("Warning: Failed to parse config: {}", e);
                    }
                },
                Err(e) => {
                    eprintln!("Warning: Failed to read config: {}", e);
                }
            }
        }
        Self::default()
    }

    /// Save config to file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        Ok(())
    }

    /// Current value of `key`, if set.
    pub fn get(&self, key: ConfigKey) -> Option<String> {
        match key {
            ConfigKey::Device => self.device.clone(),
            ConfigKey::Format => self.format.clone(),
            ConfigKey::Timeout => self.timeout.map(|t| t.to_string()),
            ConfigKey::NoColor => Some(self.no_color.to_string()),
            ConfigKey::NamePrefixes => {
                (!self.name_prefixes.is_empty()).then(|| self.name_prefixes.join(","))
            }
            ConfigKey::Services => (!self.services.is_empty()).then(|| self.services.join(",")),
        }
    }

    /// Validate and store `value` under `key`.
    pub fn set(&mut self, key: ConfigKey, value: &str) -> Result<()> {
        match key {
            ConfigKey::Device => self.device = Some(value.to_string()),
            ConfigKey::Format => {
                if OutputFormat::from_name(value).is_none() {
                    bail!("Invalid format '{}'. Use: text, json", value);
                }
                self.format = Some(value.to_lowercase());
            }
            ConfigKey::Timeout => {
                let timeout: u64 = value
                    .parse()
                    .with_context(|| format!("Invalid timeout '{}'", value))?;
                if timeout == 0 {
                    bail!("Timeout must be greater than 0");
                }
                self.timeout = Some(timeout);
            }
            ConfigKey::NoColor => {
                self.no_color = value
                    .parse()
                    .with_context(|| format!("Invalid value '{}'. Use: true, false", value))?;
            }
            ConfigKey::NamePrefixes => self.name_prefixes = split_list(value),
            ConfigKey::Services => {
                let services = split_list(value);
                for service in &services {
                    parse_service_uuid(service)?;
                }
                self.services = services;
            }
        }
        Ok(())
    }

    pub fn unset(&mut self, key: ConfigKey) {
        match key {
            ConfigKey::Device => self.device = None,
            ConfigKey::Format => self.format = None,
            ConfigKey::Timeout => self.timeout = None,
            ConfigKey::NoColor => self.no_color = false,
            ConfigKey::NamePrefixes => self.name_prefixes.clear(),
            ConfigKey::Services => self.services.clear(),
        }
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse a service filter: a 16-bit assigned number (`180d`, `0x180D`) or a
/// full UUID.
pub fn parse_service_uuid(value: &str) -> Result<Uuid> {
    let hex = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);
    if hex.len() == 4
        && let Ok(short) = u16::from_str_radix(hex, 16)
    {
        return Ok(from_short(short));
    }
    Uuid::parse_str(value).with_context(|| format!("Invalid service UUID '{}'", value))
}

/// Resolve device from arg, env var, or config.
pub fn resolve_device(device: Option<String>, config: &Config) -> Option<String> {
    device.or_else(|| config.device.clone())
}

/// Resolve timeout: use provided value, fall back to config, then default
pub fn resolve_timeout(cmd_timeout: u64, config: &Config, default: u64) -> u64 {
    if cmd_timeout != default {
        cmd_timeout
    } else {
        config.timeout.unwrap_or(default)
    }
}

/// Resolve output format: flag, then config, then text.
pub fn resolve_format(format: Option<OutputFormat>, config: &Config) -> OutputFormat {
    format
        .or_else(|| config.format.as_deref().and_then(OutputFormat::from_name))
        .unwrap_or_default()
}

/// Device filter without an identifier.
///
/// `all` explores every advertising device. Otherwise configured name
/// prefixes and services replace the built-in wearable filter when present.
pub fn base_selector(all: bool, config: &Config) -> Result<DeviceSelector> {
    if all {
        return Ok(DeviceSelector::accept_all());
    }
    if config.name_prefixes.is_empty() && config.services.is_empty() {
        return Ok(DeviceSelector::wearables());
    }

    let mut selector = DeviceSelector::accept_all();
    for prefix in &config.name_prefixes {
        selector = selector.with_name_prefix(prefix.clone());
    }
    for service in &config.services {
        selector = selector.with_service(parse_service_uuid(service)?);
    }
    Ok(selector)
}

/// Build the device selector for a connecting command.
pub fn resolve_selector(
    device: Option<String>,
    all: bool,
    config: &Config,
) -> Result<DeviceSelector> {
    let selector = base_selector(all, config)?;
    Ok(match resolve_device(device, config) {
        Some(identifier) => selector.with_identifier(identifier),
        None => selector,
    })
}

/// Session configuration for a connecting command.
pub fn session_config(timeout_secs: u64, selector: DeviceSelector) -> SessionConfig {
    let timeout = Duration::from_secs(timeout_secs);
    SessionConfig::new()
        .selection_timeout(timeout)
        .connect_timeout(timeout)
        .default_selector(selector)
}
