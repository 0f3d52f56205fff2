pub mod structs;

use anyhow::{Context, Result, anyhow};
use std::fs;
use std::path::{Path, PathBuf};
use structs::prelude::*;

pub fn path() -> Result<PathBuf> {
    match home::home_dir() {
        Some(home) => Ok(home.join(".tpadmin").join("config.toml")),
        None => Err(anyhow!("Impossible to get your home directory")),
    }
}

/// Reads `~/.tpadmin/config.toml`, writing the defaults there first if it does not exist.
pub fn read() -> Result<Config> { read_from(&path()?) }

pub fn read_from(config_path: &Path) -> Result<Config> {
    if !config_path.is_file() {
        Config::default().save_to(config_path)?;
        log::info!("created config file {}", config_path.display());
    }

    let contents = fs::read_to_string(config_path).with_context(|| format!("Cannot read config {}", config_path.display()))?;
    toml::from_str(&contents).with_context(|| format!("Cannot parse config {}", config_path.display()))
}

impl Config {
    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("Cannot create {}", parent.display()))?;
        }

        let contents = toml::to_string(self).context("Cannot serialize config")?;
        fs::write(config_path, contents).with_context(|| format!("Error writing config {}", config_path.display()))
    }

    /// Applies command line overrides for a single run.
    pub fn with_overrides(mut self, host: Option<String>, port: Option<u16>) -> Self {
        if let Some(host) = host {
            self.server.host = host;
        }
        if let Some(port) = port {
            self.server.port = port;
        }
        self
    }
}
