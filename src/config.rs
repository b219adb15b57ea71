// src/config.rs
//
// Run settings, read from an optional YAML file. Every field has a default,
// so an empty file (or none at all) is a valid configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::debug;

use crate::validate::DEFAULT_SUM_TOLERANCE;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// One sub-directory of questionnaires per company.
    pub companies_dir: PathBuf,
    pub workbook: PathBuf,
    /// Audit files; `audit/` next to the workbook when unset.
    pub audit_dir: Option<PathBuf>,
    pub database_dir: PathBuf,
    pub references: ReferenceSources,
    pub sum_tolerance: f64,
}

/// Local paths or http(s) URLs of the reference tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReferenceSources {
    pub companies: String,
    pub re100: String,
    pub sbti: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            companies_dir: PathBuf::from("data/companies"),
            workbook: PathBuf::from("output/workbook.csv"),
            audit_dir: None,
            database_dir: PathBuf::from("database"),
            references: ReferenceSources::default(),
            sum_tolerance: DEFAULT_SUM_TOLERANCE,
        }
    }
}

impl Default for ReferenceSources {
    fn default() -> Self {
        Self {
            companies: "data/companies.csv".to_string(),
            re100: "data/re100.csv".to_string(),
            sbti: "data/sbti.csv".to_string(),
        }
    }
}

impl PipelineConfig {
    pub fn from_yaml(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(text).context("parsing pipeline config")?;
        config.check()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let config = Self::from_yaml(&text).with_context(|| format!("in {}", path.display()))?;
        debug!(path = %path.display(), ?config, "loaded config");
        Ok(config)
    }

    /// `path` when given, the defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_path(p),
            None => Ok(Self::default()),
        }
    }

    pub fn audit_dir(&self) -> PathBuf {
        self.audit_dir.clone().unwrap_or_else(|| {
            self.workbook
                .parent()
                .map(|p| p.join("audit"))
                .unwrap_or_else(|| PathBuf::from("audit"))
        })
    }

    fn check(&self) -> Result<()> {
        if !(0.0..1.0).contains(&self.sum_tolerance) {
            anyhow::bail!("sum_tolerance must lie in 0..1, got {}", self.sum_tolerance);
        }
        Ok(())
    }
}
