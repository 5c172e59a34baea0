/// Configuration for a history: capacity and exhaustion policies.
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Number of changes a history keeps before overwriting the oldest.
const DEFAULT_CAPACITY: usize = 20;

/// File name looked up next to the executable when no path is given.
const CONFIG_FILE_NAME: &str = "undo-ring.json";

/// Environment variable overriding the config file location.
const CONFIG_ENV_VAR: &str = "UNDO_RING_CONFIG";

/// What an undo or redo does when there is nothing left to replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExhaustionPolicy {
    /// Return normally without touching the target.
    #[default]
    Ignore,
    /// Fail with `NothingToUndo` / `NothingToRedo`.
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Ring capacity (minimum 1).
    pub capacity: usize,
    pub undo_policy: ExhaustionPolicy,
    pub redo_policy: ExhaustionPolicy,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            undo_policy: ExhaustionPolicy::Ignore,
            redo_policy: ExhaustionPolicy::Ignore,
        }
    }
}

impl HistoryConfig {
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_undo_policy(mut self, policy: ExhaustionPolicy) -> Self {
        self.undo_policy = policy;
        self
    }

    pub fn with_redo_policy(mut self, policy: ExhaustionPolicy) -> Self {
        self.redo_policy = policy;
        self
    }

    /// Clamps values into their valid ranges.
    pub fn sanitize(&mut self) {
        self.capacity = self.capacity.max(1);
    }

    /// Loads config from `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid JSON.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: HistoryConfig = serde_json::from_str(&contents)?;
        config.sanitize();
        Ok(config)
    }

    /// Loads config from `path`, falling back to defaults.
    ///
    /// A missing file is not an error. A file that exists but cannot be
    /// read or parsed is logged and left untouched.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load history config at {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Saves config to `path` as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Resolves the config file path.
///
/// Resolution order:
/// 1. `UNDO_RING_CONFIG` environment variable
/// 2. `undo-ring.json` next to the executable
pub fn resolve_config_path() -> PathBuf {
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        return PathBuf::from(path);
    }
    let exe = std::env::current_exe().unwrap_or_else(|_| PathBuf::from("."));
    exe.parent().unwrap_or(Path::new(".")).join(CONFIG_FILE_NAME)
}
