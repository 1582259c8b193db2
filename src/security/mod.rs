//! Security pipeline: hashing, sanitization, provenance, the audit
//! chain, and intent anchoring. Every byte that enters persistent
//! memory passes through this module first.

pub mod anchor;
pub mod audit;
pub mod hash;
pub mod provenance;
pub mod sanitize;

pub use anchor::{Anchor, DriftCheck};
pub use audit::{AUDIT_FILENAME, AuditLog, AuditRecord};
pub use hash::{EMPTY_SHA256, sha256_hex};
pub use provenance::{ProvenanceTag, Trust, WriteSource};
pub use sanitize::{SanitizeFlag, SanitizeResult, Sanitizer};
