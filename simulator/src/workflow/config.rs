use crate::generator::profile::GeneratorConfig;
use anyhow::{ensure, Context};
use clap::ValueEnum;
use rfidcore::prelude::{ScanConfig, DEFAULT_POLL_INTERVAL_MS, DEFAULT_STOP_GRACE_MS, DEFAULT_STORE_KEY};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Which screen of the handheld app the session drives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    /// Collect unassigned tags and name them.
    Assign,
    /// Report which named objects are present or missing.
    Check,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorkflowConfig {
    pub mode: SessionMode,
    pub ticks: u32,
    pub poll_interval_ms: u64,
    pub stop_grace_ms: u64,
    /// Directory for the assignment document; in-memory when unset.
    pub store_dir: Option<PathBuf>,
    pub store_key: String,
    pub radio: GeneratorConfig,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            mode: SessionMode::Assign,
            ticks: 6,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            stop_grace_ms: DEFAULT_STOP_GRACE_MS,
            store_dir: None,
            store_key: DEFAULT_STORE_KEY.to_string(),
            radio: GeneratorConfig::default(),
        }
    }
}

impl WorkflowConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading workflow config {}", path_ref.display()))?;
        let config: WorkflowConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing workflow config {}", path_ref.display()))?;
        config
            .validate()
            .with_context(|| format!("validating workflow config {}", path_ref.display()))?;
        Ok(config)
    }

    pub fn from_args(
        mode: SessionMode,
        ticks: u32,
        poll_interval_ms: u64,
        store_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            mode,
            ticks,
            poll_interval_ms,
            store_dir,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(self.poll_interval_ms > 0, "poll_interval_ms must be positive");
        ensure!(!self.store_key.trim().is_empty(), "store_key must not be empty");
        self.radio.validate()
    }

    pub fn to_scan_config(&self) -> ScanConfig {
        ScanConfig {
            poll_interval_ms: self.poll_interval_ms,
            stop_grace_ms: self.stop_grace_ms,
        }
    }
}
