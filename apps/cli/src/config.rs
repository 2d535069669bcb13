//! CLI preference file support.
//!
//! Preferences are read from `~/.sweeper/config.toml` and then `./.sweeperrc`;
//! values in the local file override the global one. Command-line flags
//! override both.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use sweeper_training::FailurePolicy;
use thiserror::Error;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    /// Log level used when `--log-level` is not given
    pub log_level: Option<String>,

    /// Failure policy used when neither the flags nor the sweep file set one
    pub failure_policy: Option<FailurePolicy>,

    /// Sweep file used when `--config` is not given
    pub config: Option<PathBuf>,

    pub output: OutputConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Always use JSON output
    pub always_json: bool,
}

#[derive(Debug, Error)]
pub enum PreferencesError {
    #[error("No preferences file at {0}")]
    Missing(String),

    #[error("Cannot read preferences {0}")]
    Unreadable(String),

    #[error("Malformed preferences {0}")]
    Malformed(String),
}

pub type PreferencesResult<T> = std::result::Result<T, PreferencesError>;

impl Preferences {
    pub fn from_file(path: &Path) -> PreferencesResult<Self> {
        if !path.exists() {
            return Err(PreferencesError::Missing(path.display().to_string()));
        }

        let text = std::fs::read_to_string(path).map_err(|e| PreferencesError::Unreadable(format!("{}: {e}", path.display())))?;
        toml::from_str(&text).map_err(|e| PreferencesError::Malformed(format!("{}: {e}", path.display())))
    }

    pub fn global_path() -> PathBuf {
        dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".sweeper").join("config.toml")
    }

    pub fn local_path() -> PathBuf {
        PathBuf::from(".sweeperrc")
    }

    /// Load the global file, then the local one on top of it.
    ///
    /// A missing file is ignored; an unreadable one is logged and ignored.
    pub fn discover() -> Self {
        let mut prefs = Self::default();
        for path in [Self::global_path(), Self::local_path()] {
            match Self::from_file(&path) {
                Ok(found) => prefs.merge(&found),
                Err(PreferencesError::Missing(_)) => {}
                Err(e) => eprintln!("warning: ignoring preferences: {e}"),
            }
        }
        prefs
    }

    /// Values set in `other` override values in `self`.
    pub fn merge(&mut self, other: &Self) {
        self.log_level = other.log_level.clone().or_else(|| self.log_level.take());
        self.failure_policy = other.failure_policy.or(self.failure_policy);
        self.config = other.config.clone().or_else(|| self.config.take());
        self.output.always_json |= other.output.always_json;
    }
}

/// Load and merge the global and local preference files.
pub fn load_preferences() -> Preferences {
    Preferences::discover()
}
