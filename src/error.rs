//! Error taxonomy for the context/memory layer.
//!
//! Everything that can go wrong surfaces as one of these kinds. Two
//! conditions are deliberately *not* errors: malformed log entries are
//! skipped and counted during parsing, and sanitizer truncation is
//! reported through the returned flags. Both are telemetry, not failures.

use std::time::Duration;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The observation file's hash does not match the last audit record.
    /// Fatal to reads; there is no recovery path inside the library.
    #[error("observation log tamper detected: {0}")]
    TamperDetected(String),

    /// The audit file itself is corrupt or its hash chain does not link.
    /// Fatal; no further writes are permitted.
    #[error("audit chain broken: {0}")]
    AuditChainBroken(String),

    /// LLM call failed or timed out. Recoverable: no files were mutated,
    /// buffered messages are retained, the caller may retry.
    #[error("llm call failed: {0}")]
    Llm(#[from] LlmError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization failure: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Failure modes of the [`LlmAdapter`](crate::adapter::LlmAdapter) capability.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("provider failure: {0}")]
    Failed(String),

    #[error("call exceeded deadline of {0:?}")]
    DeadlineExceeded(Duration),

    /// Call was cancelled mid-flight. The surrounding operation reports
    /// this and leaves all files untouched.
    #[error("call cancelled")]
    Cancelled,
}
