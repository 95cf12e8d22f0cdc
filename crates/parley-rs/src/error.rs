//! Error type for conversation operations.
//!
//! Completion services report failures as plain strings (the HTTP status and
//! body, or the transport error). [`ChatError`] wraps those strings with the
//! stage of the turn that failed, so the caller can show a single inline
//! error without inspecting the log.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatError {
    /// A completion call failed and was not eligible for the tool fallback.
    #[error("completion request failed: {0}")]
    Transport(String),

    /// The model rejected the hosted tool and the tool-free resend failed too.
    #[error("request failed without tools after tool incompatibility ({primary}): {fallback}")]
    ToolFallback { primary: String, fallback: String },

    /// The summarizer call failed while compressing history. The log is
    /// left as it was before compression started.
    #[error("history summarization failed: {0}")]
    Summarization(String),

    /// An append that would break the system-message invariant.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ChatError {
    /// Text shown in place of the assistant reply when a turn fails.
    pub fn inline_message(&self) -> String {
        format!("[Error] {self}")
    }
}
