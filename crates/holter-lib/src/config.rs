use crate::detectors::{ecg::EcgPipelineConfig, pvc::PvcConfig};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// File-level settings: `[pvc]` and `[detector]` tables, both optional.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HolterConfig {
    pub pvc: PvcConfig,
    pub detector: EcgPipelineConfig,
}

impl HolterConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let cfg: HolterConfig = toml::from_str(text).context("parsing holter config")?;
        cfg.pvc.validate()?;
        Ok(cfg)
    }
}

pub fn load_config(path: &Path) -> Result<HolterConfig> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    HolterConfig::from_toml_str(&contents)
        .with_context(|| format!("invalid config {}", path.display()))
}
