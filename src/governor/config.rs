// SPDX-License-Identifier: MIT

//! Governor configuration
//!
//! Values come from an optional YAML file, then `RULEGUARD_*` environment
//! variables override individual fields.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use super::drift::DEFAULT_SIGNIFICANCE;
use super::error::{GovernorError, Result};
use super::policy::DEFAULT_MAX_RETRIES;
use super::profiler::DEFAULT_OUTLIER_THRESHOLD;
use crate::flow::graph::DEFAULT_MAX_STEPS;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernorConfig {
    /// Directory relative dataset URIs resolve against
    pub data_root: PathBuf,
    /// Durable checkpoints; in memory when unset
    pub checkpoint_dir: Option<PathBuf>,
    /// Durable profile and drift reports; in memory when unset
    pub artifact_dir: Option<PathBuf>,
    /// YAML routing table replacing the built-in graph
    pub workflow_file: Option<PathBuf>,
    pub max_retries: u32,
    /// Step cap of every run; also overrides a `workflow_file`'s own cap
    pub max_steps: u32,
    pub significance: f64,
    pub outlier_threshold: f64,
    /// Cap on rows counted by a rule query
    pub row_limit: Option<u64>,
    pub port: u16,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("."),
            checkpoint_dir: None,
            artifact_dir: None,
            workflow_file: None,
            max_retries: DEFAULT_MAX_RETRIES,
            max_steps: DEFAULT_MAX_STEPS,
            significance: DEFAULT_SIGNIFICANCE,
            outlier_threshold: DEFAULT_OUTLIER_THRESHOLD,
            row_limit: None,
            port: 3000,
        }
    }
}

impl GovernorConfig {
    /// Load from an optional YAML file and the process environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let content = fs::read_to_string(path).map_err(|e| {
                    GovernorError::config(format!("cannot read {}: {}", path.display(), e))
                })?;
                Self::from_yaml(&content)?
            }
            None => Self::default(),
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply `RULEGUARD_*` overrides from a variable lookup
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("RULEGUARD_DATA_ROOT") {
            self.data_root = PathBuf::from(v);
        }
        if let Some(v) = lookup("RULEGUARD_CHECKPOINT_DIR") {
            self.checkpoint_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("RULEGUARD_ARTIFACT_DIR") {
            self.artifact_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("RULEGUARD_WORKFLOW_FILE") {
            self.workflow_file = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("RULEGUARD_MAX_RETRIES") {
            self.max_retries = parse_var("RULEGUARD_MAX_RETRIES", &v)?;
        }
        if let Some(v) = lookup("RULEGUARD_MAX_STEPS") {
            self.max_steps = parse_var("RULEGUARD_MAX_STEPS", &v)?;
        }
        if let Some(v) = lookup("RULEGUARD_SIGNIFICANCE") {
            self.significance = parse_var("RULEGUARD_SIGNIFICANCE", &v)?;
        }
        if let Some(v) = lookup("RULEGUARD_OUTLIER_THRESHOLD") {
            self.outlier_threshold = parse_var("RULEGUARD_OUTLIER_THRESHOLD", &v)?;
        }
        if let Some(v) = lookup("RULEGUARD_ROW_LIMIT") {
            self.row_limit = Some(parse_var("RULEGUARD_ROW_LIMIT", &v)?);
        }
        if let Some(v) = lookup("RULEGUARD_PORT") {
            self.port = parse_var("RULEGUARD_PORT", &v)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.significance > 0.0 && self.significance < 1.0) {
            return Err(GovernorError::config(format!(
                "significance must be in (0, 1), got {}",
                self.significance
            )));
        }
        if self.max_steps == 0 {
            return Err(GovernorError::config("max_steps must be at least 1"));
        }
        if !(self.outlier_threshold > 0.0) {
            return Err(GovernorError::config(format!(
                "outlier_threshold must be positive, got {}",
                self.outlier_threshold
            )));
        }
        Ok(())
    }
}

fn parse_var<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| GovernorError::config(format!("invalid value for {}: '{}'", key, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = GovernorConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.max_steps, 50);
        assert_eq!(config.significance, 0.05);
        assert_eq!(config.outlier_threshold, 3.0);
        assert!(config.checkpoint_dir.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = GovernorConfig::from_yaml(
            r#"
data_root: /srv/data
checkpoint_dir: /srv/checkpoints
max_retries: 5
"#,
        )
        .unwrap();
        assert_eq!(config.data_root, PathBuf::from("/srv/data"));
        assert_eq!(config.checkpoint_dir, Some(PathBuf::from("/srv/checkpoints")));
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.max_steps, 50);
        assert_eq!(config.port, 3000);
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("RULEGUARD_MAX_STEPS", "12"),
            ("RULEGUARD_SIGNIFICANCE", "0.01"),
            ("RULEGUARD_ROW_LIMIT", "1000"),
            ("RULEGUARD_ARTIFACT_DIR", "/tmp/artifacts"),
        ]
        .into_iter()
        .collect();
        let mut config = GovernorConfig::default();
        config
            .apply_overrides(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.max_steps, 12);
        assert_eq!(config.significance, 0.01);
        assert_eq!(config.row_limit, Some(1000));
        assert_eq!(config.artifact_dir, Some(PathBuf::from("/tmp/artifacts")));
    }

    #[test]
    fn test_bad_override_is_config_error() {
        let mut config = GovernorConfig::default();
        let err = config
            .apply_overrides(|key| (key == "RULEGUARD_PORT").then(|| "http".to_string()))
            .unwrap_err();
        assert!(matches!(err, GovernorError::Config(_)));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = GovernorConfig {
            significance: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = GovernorConfig {
            max_steps: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ruleguard.yaml");
        std::fs::write(&path, "max_retries: 1\nport: 8080\n").unwrap();
        let config = GovernorConfig::from_yaml(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(config.max_retries, 1);
        assert_eq!(config.port, 8080);

        let missing = GovernorConfig::load(Some(&dir.path().join("missing.yaml")));
        assert!(matches!(missing, Err(GovernorError::Config(_))));
    }
}
