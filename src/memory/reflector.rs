//! Threshold-triggered merge/rewrite of the observation log.
//!
//! The Reflector is the only destructive writer in the system. It feeds
//! the whole log to the LLM, parses the merged result, and swaps the
//! file atomically. The safety guard refuses the swap when a non-empty
//! response parses to zero entries — a confused model must never be
//! able to erase memory.

use chrono::{DateTime, NaiveDate, Utc};
use std::time::Duration;
use tracing::{info, warn};

use super::observation::{Observation, Priority, parse_log};
use super::store::ObservationLog;
use crate::adapter::{LlmAdapter, Message};
use crate::error::Result;
use crate::security::{Sanitizer, WriteSource};

pub const REFLECTOR_SYSTEM_PROMPT: &str = "\
You maintain an agent's long-term observation log.

Rewrite the log below into a smaller, equivalent one. Preserve the priority
markers (🔴/🟡/🟢) and the observed_on/event_date headers of the entries you
keep. Merge duplicates and entries superseded by newer information, keeping
the newest dates. Keep every URL and file path intact. Never invent entries.
Separate entries with one blank line and output nothing but entries.";

pub struct Reflector {
    threshold: u32,
}

impl Reflector {
    pub fn new(threshold: u32) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// True when the log's token count warrants a consolidation pass.
    pub fn should_run(&self, log_tokens: u32) -> bool {
        log_tokens > self.threshold
    }

    /// Consolidate the log in place. Returns true when the log was
    /// rewritten, false when the pass was skipped (empty log, or the
    /// safety guard fired). On a skip the file bytes and the audit
    /// chain are untouched.
    pub fn consolidate(
        &self,
        llm: &dyn LlmAdapter,
        sanitizer: &Sanitizer,
        log: &ObservationLog,
        today: NaiveDate,
        now: DateTime<Utc>,
        deadline: Duration,
    ) -> Result<bool> {
        let observations = log.load(today)?;
        if observations.is_empty() {
            return Ok(false);
        }

        let rendered = observations
            .iter()
            .map(Observation::serialize_entry)
            .collect::<Vec<_>>()
            .join("\n\n");

        let response = llm.complete(
            REFLECTOR_SYSTEM_PROMPT,
            &[Message::user(rendered)],
            deadline,
        )?;

        let (parsed, _malformed) = parse_log(&response, today);
        if parsed.is_empty() {
            // Guard: a non-empty response with nothing parseable means
            // the model lost the format. Skipping is the 🔴-grade event;
            // the log itself stays byte-identical.
            if !response.trim().is_empty() {
                warn!(
                    response_chars = response.chars().count(),
                    "reflection produced no parseable entries; log left untouched"
                );
            }
            return Ok(false);
        }

        let merged: Vec<Observation> = parsed
            .into_iter()
            .map(|mut obs| {
                let cleaned = sanitizer.clean_internal(&obs.body);
                if cleaned.truncated() {
                    obs.priority = Priority::Red;
                }
                obs.body = cleaned.text;
                obs
            })
            .collect();

        log.rewrite(&merged, WriteSource::Reflector, now)?;
        info!(
            before = observations.len(),
            after = merged.len(),
            "observation log consolidated"
        );
        Ok(true)
    }
}
