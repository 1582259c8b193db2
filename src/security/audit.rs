//! Append-only, hash-chained write audit log.
//!
//! Stored as `audit.jsonl` beside the observation file. Each record
//! carries the SHA-256 of the full observation file *after* the write it
//! describes, plus the previous record's hash, forming a tamper-evident
//! chain over the history of observation-log states.
//!
//! # Format
//!
//! One JSON object per line (JSONL):
//!
//! | Field | Description |
//! |-------|-------------|
//! | `ts` | Write timestamp (RFC 3339) |
//! | `source` | `init`, `observer`, `reflector`, `anchor` or `manual` |
//! | `char_delta` | Signed character growth of the observation file |
//! | `log_sha256` | SHA-256 of the observation file after the write |
//! | `prev_sha256` | `log_sha256` of the previous record (chain link) |
//! | `provenance` | Inline [`ProvenanceTag`] for the written content |
//!
//! # Chain integrity
//!
//! The first record links to [`EMPTY_SHA256`], the hash of the empty
//! observation file. On load the observation file's hash must equal the
//! last record's `log_sha256`; any out-of-band edit is detected before a
//! single byte is served. A record that fails to parse makes the chain
//! unusable: that is fatal, no recovery segment is written.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::hash::EMPTY_SHA256;
use super::provenance::{ProvenanceTag, WriteSource};
use crate::error::{Error, Result};

pub const AUDIT_FILENAME: &str = "audit.jsonl";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub ts: DateTime<Utc>,
    pub source: WriteSource,
    pub char_delta: i64,
    /// SHA-256 of the observation file contents after the write.
    pub log_sha256: String,
    /// `log_sha256` of the preceding record, [`EMPTY_SHA256`] for the first.
    pub prev_sha256: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance: Option<ProvenanceTag>,
}

#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    /// Point at the audit file inside a storage directory. No I/O.
    pub fn open(storage_dir: &Path) -> Self {
        Self {
            path: storage_dir.join(AUDIT_FILENAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The observation-file hash recorded by the most recent write, or
    /// the empty-file hash when nothing has been recorded yet.
    pub fn last_log_sha256(&self) -> Result<String> {
        if !self.path.exists() {
            return Ok(EMPTY_SHA256.to_string());
        }
        let content = fs::read_to_string(&self.path)?;
        match content.lines().rev().find(|l| !l.trim().is_empty()) {
            Some(last) => {
                let record: AuditRecord = serde_json::from_str(last).map_err(|e| {
                    Error::AuditChainBroken(format!("unparseable last record: {}", e))
                })?;
                Ok(record.log_sha256)
            }
            None => Ok(EMPTY_SHA256.to_string()),
        }
    }

    /// Append a record for a completed write and fsync the audit file.
    ///
    /// `log_sha256` must be the hash of the observation file as it now
    /// exists on disk. The chain link is derived from the current last
    /// record; a corrupt last record refuses the append.
    pub fn append(
        &self,
        ts: DateTime<Utc>,
        source: WriteSource,
        char_delta: i64,
        log_sha256: String,
        provenance: Option<ProvenanceTag>,
    ) -> Result<AuditRecord> {
        let prev_sha256 = self.last_log_sha256()?;
        let record = AuditRecord {
            ts,
            source,
            char_delta,
            log_sha256,
            prev_sha256,
            provenance,
        };

        let json = serde_json::to_string(&record)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", json)?;
        file.sync_all()?;

        debug!(
            source = source.as_str(),
            char_delta, "audit record appended"
        );
        Ok(record)
    }

    /// Read and parse every record. Any unparseable line is fatal.
    pub fn records(&self) -> Result<Vec<AuditRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.path)?;
        let mut records = Vec::new();
        for (i, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let record: AuditRecord = serde_json::from_str(line).map_err(|e| {
                Error::AuditChainBroken(format!("record {} unparseable: {}", i, e))
            })?;
            records.push(record);
        }
        Ok(records)
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.records()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Verify that every record links to its predecessor's state hash
    /// and that the first record starts from the empty file.
    pub fn verify_chain(&self) -> Result<()> {
        let records = self.records()?;
        let Some(first) = records.first() else {
            return Ok(());
        };
        if first.prev_sha256 != EMPTY_SHA256 {
            return Err(Error::AuditChainBroken(
                "first record does not start from the empty file".to_string(),
            ));
        }
        for (i, pair) in records.windows(2).enumerate() {
            if pair[1].prev_sha256 != pair[0].log_sha256 {
                return Err(Error::AuditChainBroken(format!(
                    "record {} does not link to record {}",
                    i + 1,
                    i
                )));
            }
        }
        Ok(())
    }
}

/// Replay a chain of records, returning the final state hash. Used to
/// check that the recorded history reproduces the current file hash.
pub fn replay_chain(records: &[AuditRecord]) -> String {
    records
        .last()
        .map(|r| r.log_sha256.clone())
        .unwrap_or_else(|| EMPTY_SHA256.to_string())
}
