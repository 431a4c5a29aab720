//! Configuration for the `wft` binary
//!
//! Read from `--config PATH` or `~/.config/wftrace/config.toml`. Every field
//! has a default, so a missing file or a partial file is fine. Command-line
//! flags override what is loaded here.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::state::WorkflowExecutionStatus;
use crate::updates::UpdateOptions;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config {path}: {source}")]
    Toml {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("fold status \"{0}\" not recognized")]
    UnknownFoldStatus(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct TraceConfig {
    /// How traces are followed and drawn
    #[serde(default)]
    pub trace: TraceSettings,

    /// Where histories are read from
    #[serde(default)]
    pub history: HistoryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TraceSettings {
    /// Child workflow hops to follow (-1 = unlimited)
    #[serde(default = "default_depth")]
    pub depth: i32,

    /// Maximum histories fetched at once
    #[serde(default = "default_concurrency")]
    pub concurrency: i64,

    /// Comma-separated statuses whose child workflows are folded
    #[serde(default = "default_fold")]
    pub fold: String,

    /// Expand and fetch every child regardless of status
    #[serde(default)]
    pub no_fold: bool,

    /// Redraw period in milliseconds
    #[serde(default = "default_update_period_ms")]
    pub update_period_ms: u64,
}

fn default_depth() -> i32 {
    -1
}

fn default_concurrency() -> i64 {
    10
}

fn default_fold() -> String {
    "completed,canceled,terminated".to_string()
}

fn default_update_period_ms() -> u64 {
    1000
}

impl Default for TraceSettings {
    fn default() -> Self {
        Self {
            depth: default_depth(),
            concurrency: default_concurrency(),
            fold: default_fold(),
            no_fold: false,
            update_period_ms: default_update_period_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryConfig {
    /// Directory holding `<workflow id>.jsonl` history files
    #[serde(default = "default_history_dir")]
    pub dir: PathBuf,

    /// How often a live history file is re-read, in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_history_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_poll_interval_ms() -> u64 {
    250
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            dir: default_history_dir(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl TraceConfig {
    /// Default location: `<config dir>/wftrace/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("wftrace").join("config.toml"))
    }

    /// Load configuration from `path`, or defaults if it does not exist
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&content).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load from an explicit path, else the default location, else defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => match Self::default_path() {
                Some(path) => Self::load(&path),
                None => Ok(Self::default()),
            },
        }
    }

    pub fn fold_status(&self) -> Result<Vec<WorkflowExecutionStatus>, ConfigError> {
        parse_fold_status(&self.trace.fold)
    }

    pub fn update_options(&self) -> Result<UpdateOptions, ConfigError> {
        Ok(UpdateOptions {
            fetch_all: self.trace.no_fold,
            fold_status: self.fold_status()?,
            depth: self.trace.depth,
            concurrency: self.trace.concurrency,
        })
    }
}

/// Parse a comma-separated status list such as `completed,canceled`.
/// Names are case-insensitive and use no separators (`timedout`, `continueasnew`).
pub fn parse_fold_status(list: &str) -> Result<Vec<WorkflowExecutionStatus>, ConfigError> {
    list.split(',')
        .map(|name| match name.trim().to_lowercase().as_str() {
            "running" => Ok(WorkflowExecutionStatus::Running),
            "completed" => Ok(WorkflowExecutionStatus::Completed),
            "failed" => Ok(WorkflowExecutionStatus::Failed),
            "canceled" => Ok(WorkflowExecutionStatus::Canceled),
            "terminated" => Ok(WorkflowExecutionStatus::Terminated),
            "timedout" => Ok(WorkflowExecutionStatus::TimedOut),
            "continueasnew" => Ok(WorkflowExecutionStatus::ContinuedAsNew),
            _ => Err(ConfigError::UnknownFoldStatus(name.to_string())),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = TraceConfig::default();
        assert_eq!(config.trace.depth, -1);
        assert_eq!(config.trace.concurrency, 10);
        assert_eq!(config.trace.update_period_ms, 1000);
        assert!(!config.trace.no_fold);
        assert_eq!(
            config.fold_status().unwrap(),
            vec![
                WorkflowExecutionStatus::Completed,
                WorkflowExecutionStatus::Canceled,
                WorkflowExecutionStatus::Terminated
            ]
        );
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = TraceConfig::load(&temp_dir.path().join("config.toml")).unwrap();
        assert_eq!(config, TraceConfig::default());
    }

    #[test]
    fn test_load_partial_config() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[trace]
depth = 2
fold = "failed"

[history]
dir = "/var/histories"
"#,
        )
        .unwrap();

        let config = TraceConfig::load(&path).unwrap();
        assert_eq!(config.trace.depth, 2);
        assert_eq!(config.trace.concurrency, 10);
        assert_eq!(config.history.dir, PathBuf::from("/var/histories"));
        assert_eq!(config.history.poll_interval_ms, 250);

        let options = config.update_options().unwrap();
        assert_eq!(options.fold_status, vec![WorkflowExecutionStatus::Failed]);
        assert_eq!(options.depth, 2);
    }

    #[test]
    fn test_load_invalid_toml() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, "[trace\ndepth = ").unwrap();
        assert!(matches!(TraceConfig::load(&path), Err(ConfigError::Toml { .. })));
    }

    #[test]
    fn test_parse_fold_status() {
        assert_eq!(
            parse_fold_status("Running,TIMEDOUT,continueasnew").unwrap(),
            vec![
                WorkflowExecutionStatus::Running,
                WorkflowExecutionStatus::TimedOut,
                WorkflowExecutionStatus::ContinuedAsNew
            ]
        );
        let err = parse_fold_status("completed,paused").unwrap_err();
        assert_eq!(err.to_string(), "fold status \"paused\" not recognized");
    }
}
