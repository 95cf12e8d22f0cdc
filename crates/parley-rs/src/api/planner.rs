//! Request planning with a one-shot tool fallback.
//!
//! [`RequestPlanner::build`] turns the current log and the browsing flag into
//! a [`CompletionRequest`]. With browsing on, the request targets the browse
//! model and carries the hosted web-search tool with `tool_choice: auto`.
//! With browsing off it carries no tool fields at all.
//!
//! [`RequestPlanner::send`] runs the per-turn state machine:
//!
//! 1. `Primary`: send the planned request.
//! 2. If that fails and the error is a tool/model incompatibility, move to
//!    `Fallback`: rebuild for the default model without tools and send once.
//! 3. Any other failure, or a failure in `Fallback`, is returned to the
//!    caller. There is never a third attempt.
//!
//! Whether an error counts as an incompatibility is decided by a pluggable
//! predicate; [`is_tool_incompatibility`] is the default.

use std::sync::Arc;

use tracing::{debug, warn};

use super::request::{
    Completion, CompletionRequest, CompletionService, HostedTool, ToolChoice,
};
use crate::Message;
use crate::error::ChatError;

/// Predicate deciding whether a send error means the model rejected tools.
pub type IncompatibilityPredicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Error keywords naming the tool side of an incompatibility.
const TOOL_KEYWORDS: [&str; 2] = ["web_search", "tool"];

/// Error keywords naming the rejection side of an incompatibility.
const INCOMPATIBILITY_KEYWORDS: [&str; 4] = [
    "not supported",
    "unsupported",
    "does not support",
    "not available",
];

/// Default incompatibility rule: the message mentions tools (including
/// `web_search`, `web_search_preview`, `tool_choice`) together with a
/// "not supported" style phrase. Case-insensitive.
pub fn is_tool_incompatibility(error: &str) -> bool {
    let lower = error.to_lowercase();
    TOOL_KEYWORDS.iter().any(|k| lower.contains(k))
        && INCOMPATIBILITY_KEYWORDS.iter().any(|k| lower.contains(k))
}

/// Which leg of the state machine produced the reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanState {
    Primary,
    Fallback,
}

/// A completion plus the leg that produced it.
#[derive(Debug, Clone)]
pub struct PlannedCompletion {
    pub completion: Completion,
    pub state: PlanState,
    /// Model the successful request targeted.
    pub model: String,
}

/// Builds requests and runs the tool fallback.
#[derive(Clone)]
pub struct RequestPlanner {
    default_model: String,
    browse_model: String,
    temperature: Option<f32>,
    incompatibility: IncompatibilityPredicate,
}

impl std::fmt::Debug for RequestPlanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestPlanner")
            .field("default_model", &self.default_model)
            .field("browse_model", &self.browse_model)
            .field("temperature", &self.temperature)
            .finish_non_exhaustive()
    }
}

impl RequestPlanner {
    pub fn new(default_model: impl Into<String>, browse_model: impl Into<String>) -> Self {
        Self {
            default_model: default_model.into(),
            browse_model: browse_model.into(),
            temperature: None,
            incompatibility: Arc::new(is_tool_incompatibility),
        }
    }

    /// Set the sampling temperature for every planned request.
    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    /// Replace the tool-incompatibility rule.
    pub fn with_incompatibility_predicate(
        mut self,
        predicate: impl Fn(&str) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.incompatibility = Arc::new(predicate);
        self
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    pub fn browse_model(&self) -> &str {
        &self.browse_model
    }

    pub fn set_default_model(&mut self, model: impl Into<String>) {
        self.default_model = model.into();
    }

    pub fn set_browse_model(&mut self, model: impl Into<String>) {
        self.browse_model = model.into();
    }

    /// Plan the request for the current log.
    pub fn build(&self, messages: &[Message], browsing_enabled: bool) -> CompletionRequest {
        if browsing_enabled {
            CompletionRequest {
                model: self.browse_model.clone(),
                messages: messages.to_vec(),
                tools: Some(vec![HostedTool::WebSearch]),
                tool_choice: Some(ToolChoice::Auto),
                temperature: self.temperature,
                ..Default::default()
            }
        } else {
            CompletionRequest {
                model: self.default_model.clone(),
                messages: messages.to_vec(),
                temperature: self.temperature,
                ..Default::default()
            }
        }
    }

    /// Whether `error` should trigger the tool-free resend.
    pub fn is_incompatibility(&self, error: &str) -> bool {
        (self.incompatibility)(error)
    }

    /// Send with at most one tool-free retry.
    pub async fn send(
        &self,
        service: &dyn CompletionService,
        messages: &[Message],
        browsing_enabled: bool,
    ) -> Result<PlannedCompletion, ChatError> {
        let primary = self.build(messages, browsing_enabled);
        debug!(
            "Sending turn: model={}, messages={}, tools={}",
            primary.model,
            primary.messages.len(),
            primary.tools.as_ref().map_or(0, |t| t.len()),
        );

        let primary_error = match service.send(&primary).await {
            Ok(completion) => {
                return Ok(PlannedCompletion {
                    completion,
                    state: PlanState::Primary,
                    model: primary.model,
                });
            }
            Err(e) => e,
        };

        // A tool-free primary has nothing to fall back from.
        if !primary.has_tools() || !self.is_incompatibility(&primary_error) {
            return Err(ChatError::Transport(primary_error));
        }

        warn!(
            "Tool/model mismatch on {} ({primary_error}); retrying without tools on {}",
            primary.model, self.default_model
        );
        let fallback = self.build(messages, false);
        match service.send(&fallback).await {
            Ok(completion) => Ok(PlannedCompletion {
                completion,
                state: PlanState::Fallback,
                model: fallback.model,
            }),
            Err(fallback_error) => Err(ChatError::ToolFallback {
                primary: primary_error,
                fallback: fallback_error,
            }),
        }
    }
}
