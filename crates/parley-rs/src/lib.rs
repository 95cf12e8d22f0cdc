//! Conversation memory for chat sessions backed by a remote language model.
//!
//! `parley-rs` keeps a bounded, coherent message history for a single chat
//! session. The core abstraction is the [`ChatSession`](session::ChatSession):
//! the UI hands it a user turn via [`ask()`](session::ChatSession::ask) and gets
//! back the reply text plus the source URLs the model cited. Everything in
//! between is handled here:
//!
//! 1. The user message is appended to the [`ConversationStore`](context::ConversationStore),
//!    the single source of truth for the transcript.
//! 2. If the estimated token cost of the log exceeds the budget, the older
//!    middle of the conversation is summarized by the model and spliced back
//!    in as one synthetic assistant message.
//! 3. The [`RequestPlanner`](api::RequestPlanner) assembles the outbound
//!    request, attaching the hosted web-search tool when browsing is enabled,
//!    and replans once without tools if the model rejects them.
//! 4. [`extract_citations`](citations::extract_citations) pulls URLs out of the
//!    structured response and the reply text.
//!
//! # Getting started
//!
//! ```ignore
//! use parley_rs::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ChatError> {
//!     let config = ChatConfig::default().with_token_budget(20_000);
//!     let client = ResponsesClient::from_env(&config).map_err(ChatError::Transport)?;
//!
//!     let mut session = ChatSession::new(Arc::new(client), config);
//!     let reply = session.ask("What changed in Rust 1.85?", Vec::new()).await?;
//!
//!     println!("{}", reply.text);
//!     println!("{}", format_sources(&reply.sources));
//!     Ok(())
//! }
//! ```
//!
//! # Where to find things
//!
//! - **Token counting:** [`TokenEstimator`](context::TokenEstimator) picks a
//!   model-specific BPE encoding, falling back deterministically for model
//!   names the tokenizer does not know.
//! - **History compression:** [`ConversationStore::compress_if_over_budget`](context::ConversationStore::compress_if_over_budget)
//!   and the [`Summarizer`](context::Summarizer) it drives.
//! - **Request assembly and tool fallback:** [`api::planner`].
//! - **Talking to a real endpoint:** [`ResponsesClient`](api::ResponsesClient)
//!   implements [`CompletionService`](api::CompletionService). Tests and other
//!   hosts can inject their own implementation.
//! - **Running turns off the UI thread:** [`worker::spawn`].
//! - **Persistence:** [`ChatSession::serialize`](session::ChatSession::serialize)
//!   and [`ChatSession::restore`](session::ChatSession::restore).
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`context`] | Token estimation, the conversation store, summarize-and-splice compression |
//! | [`api`] | Request types, planner with tool fallback, HTTP client, retry, model catalog, cost tracking |
//! | [`citations`] | URL extraction from structured responses and reply text |
//! | [`session`] | [`ChatSession`](session::ChatSession): `ask`, `reset`, `serialize`, `restore` |
//! | [`worker`] | Single-in-flight turn runner with channel handoff |
//! | [`config`] | [`ChatConfig`](config::ChatConfig) loaded from JSON |
//! | [`error`] | [`ChatError`](error::ChatError) |

pub mod api;
pub mod citations;
pub mod config;
pub mod context;
pub mod error;
pub mod prelude;
pub mod session;
pub mod worker;

use serde::{Deserialize, Serialize};

// ── Constants ──────────────────────────────────────────────────────

/// Default non-browsing model. Also used for summarization and for the
/// tool-free fallback request.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Default model permitted to receive the hosted web-search tool.
pub const DEFAULT_BROWSE_MODEL: &str = "gpt-4o";

/// Default system prompt for a new session.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

// ── Message types ──────────────────────────────────────────────────

/// Role of a message in the conversation.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// One part of a multi-part message.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    /// An image referenced by URL or data URI. The bytes are never inspected.
    Image { image_url: String },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }

    pub fn image(image_url: impl Into<String>) -> Self {
        ContentPart::Image {
            image_url: image_url.into(),
        }
    }
}

/// Message body: either plain text or an ordered list of parts.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// The textual content only, with multiple text parts joined by newlines.
    pub fn text(&self) -> String {
        match self {
            MessageContent::Text(s) => s.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::Image { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    /// Number of image parts.
    pub fn image_count(&self) -> usize {
        match self {
            MessageContent::Text(_) => 0,
            MessageContent::Parts(parts) => parts
                .iter()
                .filter(|p| matches!(p, ContentPart::Image { .. }))
                .count(),
        }
    }

    /// Collapse trivial part lists: no parts becomes empty text, and a single
    /// text part becomes plain text. Anything carrying images is left as is.
    pub fn normalized(&self) -> MessageContent {
        match self {
            MessageContent::Text(_) => self.clone(),
            MessageContent::Parts(parts) => match parts.as_slice() {
                [] => MessageContent::Text(String::new()),
                [ContentPart::Text { text }] => MessageContent::Text(text.clone()),
                _ => self.clone(),
            },
        }
    }
}

impl From<&str> for MessageContent {
    fn from(s: &str) -> Self {
        MessageContent::Text(s.to_string())
    }
}

impl From<String> for MessageContent {
    fn from(s: String) -> Self {
        MessageContent::Text(s)
    }
}

/// A message in the conversation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub role: MessageRole,
    pub content: MessageContent,
}

impl Message {
    pub fn new(role: MessageRole, content: impl Into<MessageContent>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content.into())
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content.into())
    }

    pub fn assistant_text(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content.into())
    }

    /// A user turn with optional image attachments. Text, when non-empty,
    /// comes first; attachments follow in the order given.
    pub fn user_with_attachments(text: impl Into<String>, attachments: &[Attachment]) -> Self {
        let text = text.into();
        if attachments.is_empty() {
            return Self::user(text);
        }
        let mut parts = Vec::with_capacity(attachments.len() + 1);
        if !text.is_empty() {
            parts.push(ContentPart::text(text));
        }
        parts.extend(attachments.iter().map(Attachment::to_part));
        Self::new(MessageRole::User, MessageContent::Parts(parts))
    }

    /// Textual content only (see [`MessageContent::text`]).
    pub fn text(&self) -> String {
        self.content.text()
    }
}

/// An image attached to a single user turn. Cleared after the turn is sent.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub image_ref: String,
}

impl Attachment {
    pub fn new(filename: impl Into<String>, image_ref: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            image_ref: image_ref.into(),
        }
    }

    pub fn to_part(&self) -> ContentPart {
        ContentPart::image(&self.image_ref)
    }
}
