//! Outbound request types and the completion-service seam.
//!
//! The conversation core never talks HTTP directly. It builds a
//! [`CompletionRequest`] and hands it to whatever [`CompletionService`] the
//! host injected: [`ResponsesClient`](super::ResponsesClient) in production,
//! a scripted double in tests.

use crate::Message;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

/// A hosted, server-side tool the remote model may invoke on its own.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum HostedTool {
    #[serde(rename = "web_search")]
    WebSearch,
}

/// How the model may use the attached tools.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ToolChoice {
    /// The model decides per turn whether to call a tool.
    Auto,
}

/// Everything needed for one completion call. Tool fields are omitted from
/// serialization entirely when absent; an empty tool list is never sent.
#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<HostedTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
}

impl CompletionRequest {
    pub fn has_tools(&self) -> bool {
        self.tools.as_ref().is_some_and(|t| !t.is_empty())
    }
}

/// Token usage reported by the provider.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageInfo {
    #[serde(default)]
    pub input_tokens: u32,
    #[serde(default)]
    pub output_tokens: u32,
}

/// Result of a completion call: the reply text plus the raw structured
/// response, kept for citation extraction.
#[derive(Debug, Clone, Default)]
pub struct Completion {
    pub text: String,
    pub raw: serde_json::Value,
    pub usage: Option<UsageInfo>,
}

impl Completion {
    /// A completion with only text, as returned by services that keep no
    /// structured payload.
    pub fn text_only(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// Boxed future returned by [`CompletionService::send`].
pub type CompletionFuture<'a> = BoxFuture<'a, Result<Completion, String>>;

/// A language-model completion capability.
///
/// Errors are returned as strings carrying the provider's message; the
/// planner classifies them by content. Uses a boxed future so the trait is
/// dyn-compatible.
pub trait CompletionService: Send + Sync {
    fn send<'a>(&'a self, request: &'a CompletionRequest) -> CompletionFuture<'a>;
}
