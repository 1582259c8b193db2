//! agentctx - a local, file-backed context and memory layer for
//! long-running, multi-step LLM agents
//!
//! This crate provides the core memory and security pipeline:
//! - Append-only observation log with a tamper-evident audit chain
//! - Sanitize → provenance-tag → promote path for external content
//! - Observer/Reflector write protocol with restorable compression
//! - Two-block context assembly with a byte-stable, cacheable prefix
//! - Run-state checkpointing for idempotent pipeline resume
//! - Intent anchoring with drift detection
//!
//! LLM transports and tokenizers are consumed as narrow capabilities
//! ([`adapter::LlmAdapter`], [`adapter::Tokenizer`]) injected at
//! [`ContextManager`] construction.

pub mod adapter;
pub mod clock;
pub mod concurrency;
pub mod config;
pub mod error;
pub mod manager;
pub mod memory;
pub mod runs;
pub mod security;

pub use config::Config;
pub use error::{Error, LlmError, Result};
pub use manager::ContextManager;
