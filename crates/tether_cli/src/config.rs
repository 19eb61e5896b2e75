//! Tether configuration file handling
//!
//! `tether.toml` holds the feature table the headless system-info service
//! answers from, and defaults for the `simulate` command:
//!
//! ```toml
//! [features]
//! "http://tizen.org/feature/multimedia.raw_video" = true
//!
//! [simulate]
//! items = 4
//! delete_mode = "deferred"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use tether_core::headless::{DeleteMode, HeadlessSystemInfo};

/// Default config file name looked up in the working directory
pub const CONFIG_FILE: &str = "tether.toml";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct TetherConfig {
    /// Feature key -> supported
    #[serde(default)]
    pub features: BTreeMap<String, bool>,
    #[serde(default)]
    pub simulate: SimulateConfig,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SimulateConfig {
    /// Grid items to create
    #[serde(default = "default_items")]
    pub items: usize,
    #[serde(default)]
    pub delete_mode: DeleteModeConfig,
}

fn default_items() -> usize {
    3
}

impl Default for SimulateConfig {
    fn default() -> Self {
        Self {
            items: default_items(),
            delete_mode: DeleteModeConfig::default(),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeleteModeConfig {
    #[default]
    Synchronous,
    Deferred,
}

impl From<DeleteModeConfig> for DeleteMode {
    fn from(mode: DeleteModeConfig) -> Self {
        match mode {
            DeleteModeConfig::Synchronous => DeleteMode::Synchronous,
            DeleteModeConfig::Deferred => DeleteMode::Deferred,
        }
    }
}

impl TetherConfig {
    /// Load an explicit config file, or `tether.toml` from `dir` if present
    ///
    /// A missing default file yields the default config; a missing explicit
    /// file is an error.
    pub fn load(explicit: Option<&Path>, dir: &Path) -> Result<Self> {
        match explicit {
            Some(path) => Self::load_file(path),
            None => {
                let path = dir.join(CONFIG_FILE);
                if path.exists() {
                    Self::load_file(&path)
                } else {
                    tracing::debug!("No {} in {}, using defaults", CONFIG_FILE, dir.display());
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn load_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn system_info(&self) -> HeadlessSystemInfo {
        self.features
            .iter()
            .map(|(key, supported)| (key.clone(), *supported))
            .collect()
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }
}
