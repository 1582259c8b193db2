//! Consumed capabilities: the LLM transport and the tokenizer.
//!
//! Concrete transports (Anthropic, OpenAI-compatible, local CLIs) live
//! outside this crate and are injected at [`ContextManager`] construction.
//! The core only ever sees the narrow [`LlmAdapter`] surface.
//!
//! [`ContextManager`]: crate::manager::ContextManager

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::LlmError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Narrow LLM capability: one blocking completion call.
///
/// Implementations must honor `deadline` and must not perform network
/// I/O beyond their configured endpoint. A deadline expiry is reported
/// as [`LlmError::DeadlineExceeded`] and is recoverable — the caller's
/// buffers are retained and no files are mutated.
pub trait LlmAdapter: Send + Sync {
    fn complete(
        &self,
        system_prompt: &str,
        messages: &[Message],
        deadline: Duration,
    ) -> Result<String, LlmError>;
}

/// Token counting capability. Only needs to be consistent within a
/// process; absolute accuracy is not required.
pub trait Tokenizer: Send + Sync {
    fn count(&self, text: &str) -> u32;
}

/// Default chars/4 estimate. Good enough for threshold triggering and
/// cheap enough to run on every buffered message.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicTokenizer;

impl Tokenizer for HeuristicTokenizer {
    fn count(&self, text: &str) -> u32 {
        (text.len() / 4) as u32
    }
}
