//! Library configuration.
//!
//! Loaded from TOML or built programmatically. Every field has a serde
//! default so a partial (or empty) config file is valid. The `llm`,
//! `tokenizer` and `clock` capabilities are injected at construction
//! time, not deserialized.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding `observations.md`, `audit.jsonl` and `sessions/`.
    /// Created 0700 on first use. Tilde-expanded.
    #[serde(default = "default_storage_path")]
    pub storage_path: String,

    /// Directory holding per-run checkpoint files (`<run_id>.json`).
    #[serde(default = "default_runs_path")]
    pub runs_path: String,

    /// Buffered session tokens that trigger Observer compression.
    #[serde(default = "default_observer_threshold")]
    pub observer_threshold: u32,

    /// Observation-log tokens that trigger a Reflector rewrite.
    #[serde(default = "default_reflector_threshold")]
    pub reflector_threshold: u32,

    /// Per-entry size budget enforced by the sanitizer.
    #[serde(default = "default_max_entry_chars")]
    pub max_entry_chars: usize,

    /// Token-overlap score below which an instruction counts as drifted.
    #[serde(default = "default_anchor_drift_threshold")]
    pub anchor_drift_threshold: f64,

    /// Per-call LLM deadline in seconds.
    #[serde(default = "default_llm_deadline_secs")]
    pub llm_deadline_secs: u64,

    /// Whether `RunState::reset(step)` also clears every later step.
    #[serde(default)]
    pub reset_clears_following: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_path: default_storage_path(),
            runs_path: default_runs_path(),
            observer_threshold: default_observer_threshold(),
            reflector_threshold: default_reflector_threshold(),
            max_entry_chars: default_max_entry_chars(),
            anchor_drift_threshold: default_anchor_drift_threshold(),
            llm_deadline_secs: default_llm_deadline_secs(),
            reset_clears_following: false,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Resolved storage directory (tilde-expanded).
    pub fn storage_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.storage_path).into_owned())
    }

    pub fn runs_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.runs_path).into_owned())
    }

    /// Per-run session transcripts live under the storage directory.
    pub fn sessions_dir(&self) -> PathBuf {
        self.storage_dir().join("sessions")
    }

    pub fn llm_deadline(&self) -> Duration {
        Duration::from_secs(self.llm_deadline_secs)
    }
}

fn default_storage_path() -> String {
    "memory".to_string()
}

fn default_runs_path() -> String {
    "runs".to_string()
}

fn default_observer_threshold() -> u32 {
    30_000
}

fn default_reflector_threshold() -> u32 {
    40_000
}

fn default_max_entry_chars() -> usize {
    2048
}

fn default_anchor_drift_threshold() -> f64 {
    0.2
}

fn default_llm_deadline_secs() -> u64 {
    120
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.observer_threshold, 30_000);
        assert_eq!(config.reflector_threshold, 40_000);
        assert_eq!(config.max_entry_chars, 2048);
        assert!((config.anchor_drift_threshold - 0.2).abs() < f64::EPSILON);
        assert!(!config.reset_clears_following);
    }

    #[test]
    fn partial_toml_overrides_only_named_keys() {
        let config: Config =
            toml::from_str("observer_threshold = 500\nstorage_path = \"/tmp/mem\"\n").unwrap();
        assert_eq!(config.observer_threshold, 500);
        assert_eq!(config.storage_path, "/tmp/mem");
        assert_eq!(config.reflector_threshold, 40_000);
    }

    #[test]
    fn save_load_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");

        let mut config = Config::default();
        config.observer_threshold = 123;
        config.reset_clears_following = true;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.observer_threshold, 123);
        assert!(loaded.reset_clears_following);
    }

    #[test]
    fn tilde_paths_are_expanded() {
        let config = Config {
            storage_path: "~/ctx/memory".to_string(),
            ..Config::default()
        };
        assert!(!config.storage_dir().to_string_lossy().contains('~'));
    }
}
