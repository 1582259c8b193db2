//! The observation file: load, append, atomic rewrite, tamper check.
//!
//! `observations.md` is human-readable UTF-8, entries separated by one
//! blank line, append-only between Reflector passes. Every mutation
//! happens under the exclusive storage lock and lands via temp file +
//! fsync + rename, so readers never see a partial write. Every mutation
//! is followed by an audit record binding the new file hash into the
//! chain; every verifying read checks the current hash against the last
//! record before serving a single entry.

use chrono::{DateTime, NaiveDate, Utc};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

use super::observation::{Observation, parse_log};
use crate::adapter::Tokenizer;
use crate::concurrency::MemoryLock;
use crate::error::{Error, Result};
use crate::security::{AuditLog, EMPTY_SHA256, ProvenanceTag, Trust, WriteSource, sha256_hex};

pub const OBSERVATIONS_FILENAME: &str = "observations.md";

pub struct ObservationLog {
    path: PathBuf,
    audit: AuditLog,
    lock: MemoryLock,
    /// Running count of malformed entries skipped during loads.
    malformed: AtomicU64,
}

impl ObservationLog {
    /// Point at the observation file inside a storage directory. No I/O.
    pub fn open(storage_dir: &Path) -> Self {
        Self {
            path: storage_dir.join(OBSERVATIONS_FILENAME),
            audit: AuditLog::open(storage_dir),
            lock: MemoryLock::new(storage_dir),
            malformed: AtomicU64::new(0),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// Create an empty observation file plus its genesis audit record.
    /// Returns true when the file was created, false when it existed.
    pub fn init(&self, now: DateTime<Utc>) -> Result<bool> {
        let _guard = self.lock.exclusive()?;
        if self.path.exists() {
            return Ok(false);
        }
        fs::write(&self.path, "")?;
        restrict_file_mode(&self.path)?;
        self.audit
            .append(now, WriteSource::Init, 0, EMPTY_SHA256.to_string(), None)?;
        info!("Created {}", self.path.display());
        Ok(true)
    }

    /// Load all observations after verifying the file hash against the
    /// audit chain. Malformed entries are skipped and counted, never
    /// fatal; a hash mismatch is fatal and no data is returned.
    pub fn load(&self, fallback_date: NaiveDate) -> Result<Vec<Observation>> {
        let bytes = {
            let _guard = self.lock.shared()?;
            let bytes = fs::read(&self.path)?;
            self.verify_bytes(&bytes)?;
            bytes
        };
        // Parse outside the lock; the snapshot is already consistent
        let text = String::from_utf8_lossy(&bytes);
        let (observations, malformed) = parse_log(&text, fallback_date);
        if malformed > 0 {
            warn!(malformed, "skipped malformed observation entries");
            self.malformed.fetch_add(malformed as u64, Ordering::Relaxed);
        }
        Ok(observations)
    }

    /// Append one observation. The write is atomic and individually
    /// chained: partial appends cannot reach disk.
    pub fn append(
        &self,
        observation: &Observation,
        source: WriteSource,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let _guard = self.lock.exclusive()?;
        let old = self.read_verified()?;

        let entry = observation.serialize_entry();
        let new = if old.trim().is_empty() {
            format!("{}\n", entry)
        } else {
            format!("{}\n\n{}\n", old.trim_end(), entry)
        };

        let tag = ProvenanceTag::new(
            source,
            observation.trust,
            observation.origin.clone(),
            now,
            &entry,
        );
        self.replace_contents(&old, &new, tag)?;
        debug!(source = source.as_str(), "observation appended");
        Ok(())
    }

    /// Replace the whole log with a fresh observation sequence. Only the
    /// Reflector (and explicit manual compaction) may do this.
    pub fn rewrite(
        &self,
        observations: &[Observation],
        source: WriteSource,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let _guard = self.lock.exclusive()?;
        let old = self.read_verified()?;

        let mut new = observations
            .iter()
            .map(Observation::serialize_entry)
            .collect::<Vec<_>>()
            .join("\n\n");
        if !new.is_empty() {
            new.push('\n');
        }

        let tag = ProvenanceTag::new(source, Trust::Internal, None, now, &new);
        self.replace_contents(&old, &new, tag)?;
        info!(
            source = source.as_str(),
            entries = observations.len(),
            "observation log rewritten"
        );
        Ok(())
    }

    /// Token size of the raw file, for the Reflector trigger.
    pub fn size_tokens(&self, tokenizer: &dyn Tokenizer) -> Result<u32> {
        let _guard = self.lock.shared()?;
        let text = fs::read_to_string(&self.path)?;
        Ok(tokenizer.count(&text))
    }

    /// Malformed entries skipped across the lifetime of this handle.
    pub fn malformed_entries(&self) -> u64 {
        self.malformed.load(Ordering::Relaxed)
    }

    fn read_verified(&self) -> Result<String> {
        let bytes = fs::read(&self.path)?;
        self.verify_bytes(&bytes)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn verify_bytes(&self, bytes: &[u8]) -> Result<()> {
        let expected = self.audit.last_log_sha256()?;
        let actual = sha256_hex(bytes);
        if actual != expected {
            return Err(Error::TamperDetected(format!(
                "{}: file hash {} != audited {}",
                self.path.display(),
                actual,
                expected
            )));
        }
        Ok(())
    }

    /// Swap file contents atomically, then chain the new state hash.
    fn replace_contents(&self, old: &str, new: &str, tag: ProvenanceTag) -> Result<()> {
        write_atomic(&self.path, new)?;
        let char_delta = new.chars().count() as i64 - old.chars().count() as i64;
        self.audit.append(
            tag.ts,
            tag.source,
            char_delta,
            sha256_hex(new.as_bytes()),
            Some(tag),
        )?;
        Ok(())
    }
}

/// Write to a unique temp file, fsync, then rename over the target.
fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let tmp = path.with_extension(format!(
        "{}.{}.tmp",
        std::process::id(),
        Utc::now().timestamp_nanos_opt().unwrap_or_default()
    ));
    let mut file = File::create(&tmp)?;
    file.write_all(content.as_bytes())?;
    file.sync_all()?;
    drop(file);
    restrict_file_mode(&tmp)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(unix)]
fn restrict_file_mode(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_file_mode(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::HeuristicTokenizer;
    use crate::memory::observation::Priority;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn open_initialized(dir: &Path) -> ObservationLog {
        let log = ObservationLog::open(dir);
        assert!(log.init(Utc::now()).unwrap());
        log
    }

    #[test]
    fn init_writes_genesis_record() {
        let tmp = tempfile::tempdir().unwrap();
        let log = open_initialized(tmp.path());

        assert_eq!(fs::read_to_string(log.path()).unwrap(), "");
        let records = log.audit().records().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].source, WriteSource::Init);
        assert_eq!(records[0].char_delta, 0);
        assert_eq!(records[0].log_sha256, EMPTY_SHA256);
    }

    #[test]
    fn init_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let log = open_initialized(tmp.path());
        assert!(!log.init(Utc::now()).unwrap());
        assert_eq!(log.audit().len().unwrap(), 1);
    }

    #[test]
    fn append_chains_hash_of_file_after_write() {
        let tmp = tempfile::tempdir().unwrap();
        let log = open_initialized(tmp.path());

        let obs = Observation::new(Priority::Red, date(2026, 2, 20), "token expired");
        log.append(&obs, WriteSource::Observer, Utc::now()).unwrap();

        let file = fs::read(log.path()).unwrap();
        let records = log.audit().records().unwrap();
        let last = records.last().unwrap();
        assert_eq!(last.log_sha256, sha256_hex(&file));
        assert_eq!(last.prev_sha256, records[0].log_sha256);
        assert!(last.char_delta > 0);
        log.audit().verify_chain().unwrap();
    }

    #[test]
    fn appended_entries_round_trip_through_load() {
        let tmp = tempfile::tempdir().unwrap();
        let log = open_initialized(tmp.path());

        let first = Observation::new(Priority::Red, date(2026, 2, 20), "first")
            .with_event_date(date(2026, 2, 18))
            .external(Some("https://example".to_string()));
        let second = Observation::new(Priority::Yellow, date(2026, 2, 15), "second\nwrapped");

        log.append(&first, WriteSource::Observer, Utc::now())
            .unwrap();
        log.append(&second, WriteSource::Manual, Utc::now()).unwrap();

        let loaded = log.load(date(2026, 2, 20)).unwrap();
        assert_eq!(loaded, vec![first, second]);
    }

    #[test]
    fn out_of_band_edit_is_tamper() {
        let tmp = tempfile::tempdir().unwrap();
        let log = open_initialized(tmp.path());

        let obs = Observation::new(Priority::Green, date(2026, 2, 20), "fine");
        log.append(&obs, WriteSource::Observer, Utc::now()).unwrap();

        let mut content = fs::read_to_string(log.path()).unwrap();
        content.push_str("garbage");
        fs::write(log.path(), &content).unwrap();

        assert!(matches!(
            log.load(date(2026, 2, 20)),
            Err(Error::TamperDetected(_))
        ));
        // Mutations are refused too
        assert!(matches!(
            log.append(&obs, WriteSource::Manual, Utc::now()),
            Err(Error::TamperDetected(_))
        ));
    }

    #[test]
    fn rewrite_replaces_contents_atomically() {
        let tmp = tempfile::tempdir().unwrap();
        let log = open_initialized(tmp.path());

        for i in 0..4 {
            let obs = Observation::new(Priority::Yellow, date(2026, 2, 20), format!("note {}", i));
            log.append(&obs, WriteSource::Observer, Utc::now()).unwrap();
        }

        let merged = vec![Observation::new(
            Priority::Yellow,
            date(2026, 2, 20),
            "notes 0-3 merged",
        )];
        log.rewrite(&merged, WriteSource::Reflector, Utc::now())
            .unwrap();

        let loaded = log.load(date(2026, 2, 20)).unwrap();
        assert_eq!(loaded, merged);

        let records = log.audit().records().unwrap();
        let last = records.last().unwrap();
        assert_eq!(last.source, WriteSource::Reflector);
        assert!(last.char_delta < 0);
        log.audit().verify_chain().unwrap();

        // No stray temp files left behind
        let leftovers: Vec<_> = fs::read_dir(tmp.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn malformed_entries_counted_not_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let log = open_initialized(tmp.path());

        let obs = Observation::new(Priority::Red, date(2026, 2, 20), "valid");
        log.append(&obs, WriteSource::Observer, Utc::now()).unwrap();

        // A "manual" write of mixed content through the proper path
        let content = fs::read_to_string(log.path()).unwrap();
        let with_garbage = format!("{}\n\nnot an entry\n\n{}", content.trim_end(), obs.serialize_entry());
        // Simulate by rewriting through the API with a pre-built file:
        // write atomically and re-chain so the hash check passes.
        write_atomic(log.path(), &with_garbage).unwrap();
        log.audit()
            .append(
                Utc::now(),
                WriteSource::Manual,
                0,
                sha256_hex(with_garbage.as_bytes()),
                None,
            )
            .unwrap();

        let loaded = log.load(date(2026, 2, 20)).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(log.malformed_entries(), 1);
    }

    #[test]
    fn size_tokens_tracks_file_growth() {
        let tmp = tempfile::tempdir().unwrap();
        let log = open_initialized(tmp.path());
        let tokenizer = HeuristicTokenizer;

        assert_eq!(log.size_tokens(&tokenizer).unwrap(), 0);
        let obs = Observation::new(Priority::Green, date(2026, 2, 20), "x".repeat(400));
        log.append(&obs, WriteSource::Observer, Utc::now()).unwrap();
        assert!(log.size_tokens(&tokenizer).unwrap() >= 100);
    }
}
