//! Per-run JSON checkpoints for idempotent pipeline resume.
//!
//! One file per run under the runs directory. Every mutation persists
//! atomically (temp + rename), so a crash either left the previous
//! checkpoint intact or the new one complete — never a torn file. A
//! step flipped done is never un-done except by an explicit reset; a
//! repeated `complete` preserves the first successful result.
//!
//! A run-state file is owned by a single orchestrator; concurrent
//! writers to the same run id are undefined behavior.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    InProgress,
    Complete,
    Failed,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepRecord {
    pub done: bool,
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    run_id: String,
    status: RunStatus,
    /// Insertion-ordered: `completed_steps` reports steps in the order
    /// they were first recorded.
    steps: IndexMap<String, StepRecord>,

    #[serde(skip)]
    path: PathBuf,
    #[serde(skip)]
    reset_clears_following: bool,
}

impl RunState {
    /// Load the checkpoint for a run id, or start a fresh in-progress
    /// one when no file exists yet.
    pub fn load(runs_dir: &Path, run_id: &str) -> Result<Self> {
        fs::create_dir_all(runs_dir)?;
        let path = runs_dir.join(format!("{}.json", run_id));

        if path.exists() {
            let content = fs::read_to_string(&path)?;
            let mut state: RunState = serde_json::from_str(&content)?;
            state.path = path;
            debug!(run_id, steps = state.steps.len(), "run state loaded");
            Ok(state)
        } else {
            Ok(Self {
                run_id: run_id.to_string(),
                status: RunStatus::InProgress,
                steps: IndexMap::new(),
                path,
                reset_clears_following: false,
            })
        }
    }

    /// Configure whether `reset` also clears every step recorded after
    /// the one being reset.
    pub fn with_reset_clears_following(mut self, clears: bool) -> Self {
        self.reset_clears_following = clears;
        self
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record a step as done. Idempotent: repeating a completed step is
    /// a no-op that preserves the first result. Returns whether the
    /// call changed anything.
    pub fn complete(&mut self, step: &str, result: Value) -> Result<bool> {
        if let Some(record) = self.steps.get(step)
            && record.done
        {
            debug!(step, "step already complete; keeping first result");
            return Ok(false);
        }
        let record = self.steps.entry(step.to_string()).or_default();
        record.done = true;
        record.result = Some(result);
        record.completed_at = Some(Utc::now());
        record.error = None;
        self.persist()?;
        Ok(true)
    }

    /// Record a step failure and mark the run failed. The step stays
    /// not-done so a retry can complete it.
    pub fn fail(&mut self, step: &str, error: &str) -> Result<()> {
        let record = self.steps.entry(step.to_string()).or_default();
        record.error = Some(error.to_string());
        self.status = RunStatus::Failed;
        warn!(step, error, "run step failed");
        self.persist()
    }

    /// Names of completed steps, in first-recorded order.
    pub fn completed_steps(&self) -> Vec<String> {
        self.steps
            .iter()
            .filter(|(_, record)| record.done)
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn step(&self, name: &str) -> Option<&StepRecord> {
        self.steps.get(name)
    }

    /// Rewind one step — the only way a done step becomes not-done.
    /// Clears later steps too when configured. The run returns to
    /// in-progress.
    pub fn reset(&mut self, step: &str) -> Result<()> {
        let Some(index) = self.steps.get_index_of(step) else {
            debug!(step, "reset of unknown step ignored");
            return Ok(());
        };
        let last = if self.reset_clears_following {
            self.steps.len() - 1
        } else {
            index
        };
        for i in index..=last {
            if let Some((_, record)) = self.steps.get_index_mut(i) {
                *record = StepRecord::default();
            }
        }
        self.status = RunStatus::InProgress;
        self.persist()
    }

    /// Mark the whole run complete.
    pub fn finish(&mut self) -> Result<()> {
        self.status = RunStatus::Complete;
        self.persist()
    }

    /// Atomic write: a failed persist leaves the prior file intact.
    fn persist(&self) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        let tmp = self.path.with_extension(format!(
            "{}.{}.tmp",
            std::process::id(),
            Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ));
        let mut file = File::create(&tmp)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
        drop(file);
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
