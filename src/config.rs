use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::filter::{PipelineConfig, StageLabels};

/// Environment variable naming an optional JSON configuration file.
pub const CONFIG_ENV: &str = "MOOW_CONFIG";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("at least one group must be configured")]
    NoGroups,
    #[error("group '{0}' has an empty key")]
    EmptyKey(String),
    #[error("group key '{0}' is used more than once")]
    DuplicateKey(String),
}

// ---------------------------------------------------------------------------
// Application configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Window title.
    pub title: String,
    /// One independent tab per group.
    pub groups: Vec<GroupConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "One Trick MOOW".into(),
            groups: vec![
                GroupConfig::new("Consortium MOOW Pro", "pro"),
                GroupConfig::new("Consortium MOOW Sup", "sup"),
            ],
        }
    }
}

impl AppConfig {
    /// Read the file named by `MOOW_CONFIG`, or fall back to the defaults.
    pub fn load() -> Result<Self> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_file(Path::new(&path)),
            None => Ok(Self::default()),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config = Self::from_json(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        log::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: AppConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Group keys namespace widget ids, so they must be unique and non-empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.groups.is_empty() {
            return Err(ConfigError::NoGroups);
        }
        let mut seen = BTreeSet::new();
        for group in &self.groups {
            if group.key.trim().is_empty() {
                return Err(ConfigError::EmptyKey(group.name.clone()));
            }
            if !seen.insert(group.key.as_str()) {
                return Err(ConfigError::DuplicateKey(group.key.clone()));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Per-group configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupConfig {
    /// Display name, also the first segment of export file names.
    pub name: String,
    /// Namespace for this group's interactive inputs.
    pub key: String,
    /// Show the row count after each filter stage.
    pub report_stage_counts: bool,
    /// "No filter" option shown first in each dropdown.
    pub sentinels: StageLabels,
    /// File name segment used when a stage is unfiltered.
    pub placeholders: StageLabels,
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self::new("Consortium", "group")
    }
}

impl GroupConfig {
    pub fn new(name: &str, key: &str) -> Self {
        Self {
            name: name.to_string(),
            key: key.to_string(),
            report_stage_counts: true,
            sentinels: StageLabels::default_sentinels(),
            placeholders: StageLabels::default_placeholders(),
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            sentinels: self.sentinels.clone(),
            report_stage_counts: self.report_stage_counts,
        }
    }
}
