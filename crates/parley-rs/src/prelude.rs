//! Convenience re-exports for common `parley-rs` types.
//!
//! Meant to be glob-imported by chat front ends:
//!
//! ```ignore
//! use parley_rs::prelude::*;
//! ```
//!
//! This pulls in the session and its configuration, the message types, the
//! completion-service seam with its HTTP implementation, and the worker
//! handle. Lower-level pieces (the estimator, the summarizer, retry
//! schedules) stay in their modules.

// ── Core types ──────────────────────────────────────────────────────
pub use crate::{Attachment, ContentPart, Message, MessageContent, MessageRole};

// ── Session ─────────────────────────────────────────────────────────
pub use crate::config::ChatConfig;
pub use crate::error::ChatError;
pub use crate::session::{ChatSession, RestoreOutcome, SessionSnapshot, TurnReply};
pub use crate::worker::{SessionEvent, SessionHandle};

// ── Completion service ──────────────────────────────────────────────
pub use crate::api::{
    Completion, CompletionFuture, CompletionRequest, CompletionService, RequestPlanner,
    ResponsesClient,
};

// ── Context management ──────────────────────────────────────────────
pub use crate::context::ConversationStore;

// ── Citations ───────────────────────────────────────────────────────
pub use crate::citations::{extract_citations, format_sources};
