//! The conversation log and its summarize-and-splice compression.
//!
//! [`ConversationStore`] exclusively owns the ordered message log for one
//! session. Invariants:
//!
//! - The log always has at least one message, and index 0 is the only
//!   `system` message. It may be replaced, never removed.
//! - Role alternation is not enforced. Compression injects an assistant
//!   message that may sit next to another assistant message.
//!
//! When the estimated cost of the whole log exceeds the token budget, every
//! message between the system prompt and the last [`RECENT_WINDOW`] messages is
//! summarized and replaced by one synthetic assistant message. The window is
//! a fixed count and does not scale with the budget.

use std::ops::Range;

use tracing::{debug, info};

use crate::api::CompletionService;
use crate::context::summarizer::{Summarizer, summary_message};
use crate::context::tokens::{BudgetUsage, TokenEstimator};
use crate::error::ChatError;
use crate::{Message, MessageContent, MessageRole};

/// Messages kept verbatim at the tail of the log on compression.
pub const RECENT_WINDOW: usize = 10;

/// Default ceiling on the estimated token cost of the log.
pub const DEFAULT_TOKEN_BUDGET: usize = 20_000;

/// What a compression did. Not stored; returned for logging and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressionEvent {
    /// Indices of the messages that were replaced, in the pre-compression log.
    pub dropped: Range<usize>,
    /// Summary text as returned by the summarizer (without the prefix).
    pub summary: String,
    pub tokens_before: usize,
    pub tokens_after: usize,
}

/// Owns the message log and enforces the token budget.
#[derive(Debug)]
pub struct ConversationStore {
    messages: Vec<Message>,
    estimator: TokenEstimator,
    token_budget: usize,
    recent_window: usize,
    compactions: usize,
}

impl ConversationStore {
    /// Start a log holding only the system prompt.
    pub fn new(system_prompt: impl Into<String>, estimator: TokenEstimator) -> Self {
        Self {
            messages: vec![Message::system(system_prompt)],
            estimator,
            token_budget: DEFAULT_TOKEN_BUDGET,
            recent_window: RECENT_WINDOW,
            compactions: 0,
        }
    }

    /// Override the token budget.
    pub fn with_token_budget(mut self, budget: usize) -> Self {
        self.token_budget = budget;
        self
    }

    /// Override the number of tail messages kept on compression.
    pub fn with_recent_window(mut self, window: usize) -> Self {
        self.recent_window = window;
        self
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Always false: the system message is never removed.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn token_budget(&self) -> usize {
        self.token_budget
    }

    pub fn estimator(&self) -> &TokenEstimator {
        &self.estimator
    }

    /// Swap the estimator, e.g. after the session switches models.
    pub fn set_estimator(&mut self, estimator: TokenEstimator) {
        self.estimator = estimator;
    }

    /// Number of compressions performed since the store was created.
    pub fn compaction_count(&self) -> usize {
        self.compactions
    }

    /// Text of the system message at index 0.
    pub fn system_prompt(&self) -> String {
        self.messages.first().map(Message::text).unwrap_or_default()
    }

    /// Append a user or assistant message.
    pub fn append(
        &mut self,
        role: MessageRole,
        content: impl Into<MessageContent>,
    ) -> Result<(), ChatError> {
        self.push(Message::new(role, content))
    }

    /// Append a prebuilt message. Rejects `system` messages, which may only
    /// live at index 0.
    pub fn push(&mut self, message: Message) -> Result<(), ChatError> {
        if message.role == MessageRole::System {
            return Err(ChatError::InvalidMessage(
                "system messages can only occupy index 0; use replace_system_prompt".into(),
            ));
        }
        if self.messages.first().map(|m| m.role) != Some(MessageRole::System) {
            return Err(ChatError::InvalidMessage(
                "log has no system message at index 0".into(),
            ));
        }
        self.messages.push(message);
        Ok(())
    }

    /// Overwrite the content of the system message.
    pub fn replace_system_prompt(&mut self, text: impl Into<String>) {
        let system = Message::system(text);
        match self.messages.first_mut() {
            Some(first) if first.role == MessageRole::System => *first = system,
            _ => self.messages.insert(0, system),
        }
    }

    /// Collapse the log to a single system message, keeping the current
    /// prompt unless a new one is given.
    pub fn reset(&mut self, system_prompt: Option<String>) {
        let prompt = system_prompt.unwrap_or_else(|| self.system_prompt());
        self.messages = vec![Message::system(prompt)];
        debug!("Conversation reset");
    }

    /// Replace the whole log, e.g. on session restore. The log must satisfy
    /// the system-message invariant.
    pub fn replace_log(&mut self, messages: Vec<Message>) -> Result<(), ChatError> {
        validate_log(&messages).map_err(ChatError::InvalidMessage)?;
        self.messages = messages;
        Ok(())
    }

    /// Snapshot for request assembly: trivial part lists collapsed to text.
    pub fn normalized(&self) -> Vec<Message> {
        self.messages
            .iter()
            .map(|m| Message::new(m.role, m.content.normalized()))
            .collect()
    }

    /// Estimated usage of the full log against the budget.
    pub fn usage(&self) -> BudgetUsage {
        self.estimator.usage(&self.messages, self.token_budget)
    }

    /// The span that compression would replace: everything after the system
    /// message except the last `recent_window` messages. `None` when that
    /// span is empty.
    pub fn compression_span(&self) -> Option<Range<usize>> {
        let end = self.messages.len().saturating_sub(self.recent_window);
        (end > 1).then_some(1..end)
    }

    /// Summarize and splice if the log is over budget.
    ///
    /// Returns `Ok(None)` when under budget or when there is nothing old
    /// enough to summarize. On summarizer failure the log is untouched.
    pub async fn compress_if_over_budget(
        &mut self,
        summarizer: &Summarizer,
        service: &dyn CompletionService,
        default_model: &str,
    ) -> Result<Option<CompressionEvent>, ChatError> {
        let usage = self.usage();
        debug!("{}", usage.to_log_string());
        if !usage.is_over_budget() {
            return Ok(None);
        }

        let Some(span) = self.compression_span() else {
            debug!(
                "Over budget but only {} message(s) in log; nothing to summarize",
                self.messages.len()
            );
            return Ok(None);
        };

        info!(
            "Compressing history: {} message(s) summarized to 1 ({} est. tokens > {})",
            span.len(),
            usage.estimated_tokens,
            self.token_budget
        );

        let summary = summarizer
            .summarize(service, &self.messages[span.clone()], default_model)
            .await
            .map_err(ChatError::Summarization)?;

        self.messages
            .splice(span.clone(), std::iter::once(summary_message(&summary)));
        self.compactions += 1;

        let tokens_after = self.estimator.estimate(&self.messages);
        info!(
            "Compression #{} done: {} -> {} est. tokens, summary {} chars",
            self.compactions,
            usage.estimated_tokens,
            tokens_after,
            summary.len()
        );

        Ok(Some(CompressionEvent {
            dropped: span,
            summary,
            tokens_before: usage.estimated_tokens,
            tokens_after,
        }))
    }
}

/// Check the system-message invariant for a whole log.
pub fn validate_log(messages: &[Message]) -> Result<(), String> {
    match messages.first() {
        None => return Err("log is empty".into()),
        Some(first) if first.role != MessageRole::System => {
            return Err(format!("log starts with a {} message", first.role));
        }
        Some(_) => {}
    }
    if let Some(pos) = messages
        .iter()
        .skip(1)
        .position(|m| m.role == MessageRole::System)
    {
        return Err(format!("extra system message at index {}", pos + 1));
    }
    Ok(())
}
