//! The rolling per-run message buffer.
//!
//! Every message noted during a run is appended as one JSON line to
//! `sessions/<run_id>.jsonl` and held in memory for Observer
//! compression. Reopening the same run id replays the file, so a
//! crashed pipeline resumes with its buffered messages and token
//! accounting intact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::adapter::{Role, Tokenizer};
use crate::error::Result;
use crate::security::Trust;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMessage {
    pub role: Role,
    pub content: String,
    pub trust: Trust,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    pub ts: DateTime<Utc>,
}

pub struct SessionBuffer {
    path: PathBuf,
    messages: Vec<SessionMessage>,
    token_count: u32,
}

impl SessionBuffer {
    /// Open (or create) the buffer for a run, replaying any existing
    /// transcript. Corrupted lines are skipped with a warning.
    pub fn open(sessions_dir: &Path, run_id: &str, tokenizer: &dyn Tokenizer) -> Result<Self> {
        fs::create_dir_all(sessions_dir)?;
        let path = sessions_dir.join(format!("{}.jsonl", run_id));

        let mut messages = Vec::new();
        let mut token_count = 0u32;
        if path.exists() {
            let content = fs::read_to_string(&path)?;
            for line in content.lines() {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<SessionMessage>(line) {
                    Ok(message) => {
                        token_count += tokenizer.count(&message.content);
                        messages.push(message);
                    }
                    Err(e) => warn!("skipping corrupt session line: {}", e),
                }
            }
            if !messages.is_empty() {
                debug!(
                    run_id,
                    replayed = messages.len(),
                    "session buffer replayed"
                );
            }
        }

        Ok(Self {
            path,
            messages,
            token_count,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn messages(&self) -> &[SessionMessage] {
        &self.messages
    }

    pub fn token_count(&self) -> u32 {
        self.token_count
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn has_external(&self) -> bool {
        self.messages.iter().any(|m| m.trust == Trust::External)
    }

    /// Append a message to the transcript and the in-memory buffer.
    pub fn push(&mut self, message: SessionMessage, tokenizer: &dyn Tokenizer) -> Result<()> {
        let json = serde_json::to_string(&message)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", json)?;

        self.token_count += tokenizer.count(&message.content);
        self.messages.push(message);
        Ok(())
    }

    /// Discard processed messages after a successful Observer pass.
    pub fn clear(&mut self) -> Result<()> {
        fs::write(&self.path, "")?;
        self.messages.clear();
        self.token_count = 0;
        Ok(())
    }
}
