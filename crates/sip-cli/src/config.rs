//! Optional TOML configuration for the `sip` binary.
//!
//! ```toml
//! [parse]
//! record_root = "/harvest/record"
//! unique_element = "/harvest/record/@id"
//!
//! [runner]
//! workers = 8
//!
//! [stats]
//! sample_size = 50
//! ```
//!
//! Every table and field is optional; missing values fall back to the
//! library defaults. Command-line flags are applied on top afterwards.

use std::path::Path as FsPath;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sip_map::ParallelOptions;
use sip_model::{ParseOptions, Path};
use sip_stats::StatsOptions;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SipConfig {
    pub parse: ParseOptions,
    pub runner: ParallelOptions,
    pub stats: StatsOptions,
}

impl SipConfig {
    /// Read a configuration file, or the defaults when `path` is `None`.
    pub fn load(path: Option<&FsPath>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("parse config {}", path.display()))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Apply the record-splitting flags shared by `map` and `stats`.
    #[must_use]
    pub fn with_record_overrides(
        mut self,
        record_root: Option<&Path>,
        unique_element: Option<&Path>,
    ) -> Self {
        if let Some(record_root) = record_root {
            self.parse.record_root = record_root.clone();
        }
        if let Some(unique_element) = unique_element {
            self.parse.unique_element = Some(unique_element.clone());
        }
        self
    }

    #[must_use]
    pub fn with_workers(mut self, workers: Option<usize>) -> Self {
        if let Some(workers) = workers {
            self.runner.workers = workers;
        }
        self
    }
}
