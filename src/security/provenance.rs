//! Per-write provenance metadata.
//!
//! Every write to the observation log is preceded by constructing a
//! [`ProvenanceTag`] and followed by an audit record that carries the
//! tag inline. Trust governs filtering and the `[EXT]` display marker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::hash::sha256_hex;

/// Origin class of a piece of content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trust {
    /// Produced by this process or its LLM from internal inputs.
    Internal,
    /// Entered the system from outside: web content, file drops, user
    /// pastes of third-party text. Rendered with an `[EXT]` marker.
    External,
}

/// Which component performed a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteSource {
    /// Storage bootstrap: the empty-file genesis record.
    Init,
    Observer,
    Reflector,
    /// Automatic 🔴 entry appended on a drift warning.
    Anchor,
    Manual,
}

impl WriteSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteSource::Init => "init",
            WriteSource::Observer => "observer",
            WriteSource::Reflector => "reflector",
            WriteSource::Anchor => "anchor",
            WriteSource::Manual => "manual",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvenanceTag {
    pub source: WriteSource,
    pub trust: Trust,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    pub ts: DateTime<Utc>,
    /// SHA-256 of the content this tag covers (an entry body on append,
    /// the full file on rewrite).
    pub content_sha256: String,
}

impl ProvenanceTag {
    pub fn new(
        source: WriteSource,
        trust: Trust,
        origin: Option<String>,
        ts: DateTime<Utc>,
        content: &str,
    ) -> Self {
        Self {
            source,
            trust,
            origin,
            ts,
            content_sha256: sha256_hex(content.as_bytes()),
        }
    }
}
