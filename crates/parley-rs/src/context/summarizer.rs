//! Summarization of dropped history for compression.
//!
//! The summarizer turns a span of older messages into a single neutral,
//! length-bounded summary using one tool-free completion call on the
//! non-browsing model. Image parts are replaced by a text placeholder before
//! the span is rendered, so no image reference ever reaches the summarizer.

use crate::api::{CompletionRequest, CompletionService};
use crate::{ContentPart, Message, MessageContent};
use tracing::debug;

/// Prefix of the synthetic assistant message that replaces dropped history.
pub const SUMMARY_PREFIX: &str = "Summary of earlier conversation: ";

/// Stands in for each image part in the summarizer input.
pub const IMAGE_PLACEHOLDER: &str = "[image omitted]";

/// Configuration for summarization.
#[derive(Debug, Clone)]
pub struct SummarizerConfig {
    /// Model used for summaries. `None` means the session's non-browsing model.
    pub model: Option<String>,
    /// Target summary length in words.
    pub summary_words: u32,
    /// Optional hard cap on the summary response.
    pub max_summary_tokens: Option<u32>,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            model: None,
            summary_words: 500,
            max_summary_tokens: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Summarizer {
    pub config: SummarizerConfig,
}

impl Summarizer {
    pub fn new(config: SummarizerConfig) -> Self {
        Self { config }
    }

    /// The fixed instruction sent as the system message.
    pub fn instruction(&self) -> String {
        format!(
            "Summarize the following chat history in ~{} words, neutral tone. \
             Keep names, numbers, decisions and open questions; do not add facts \
             that are not in the messages.",
            self.config.summary_words
        )
    }

    /// Get the model to use for summarization.
    pub fn summary_model<'a>(&'a self, default_model: &'a str) -> &'a str {
        self.config.model.as_deref().unwrap_or(default_model)
    }

    /// Render a span as `[role]: text` blocks, images replaced by the
    /// placeholder.
    pub fn render_span(span: &[Message]) -> String {
        let mut out = String::new();
        for msg in span {
            let body = match &msg.content {
                MessageContent::Text(s) => s.clone(),
                MessageContent::Parts(parts) => parts
                    .iter()
                    .map(|p| match p {
                        ContentPart::Text { text } => text.as_str(),
                        ContentPart::Image { .. } => IMAGE_PLACEHOLDER,
                    })
                    .collect::<Vec<_>>()
                    .join("\n"),
            };
            out.push_str(&format!("[{}]: {body}\n\n", msg.role));
        }
        out
    }

    /// Build the one-shot summarization request. Never carries tools.
    pub fn build_request(&self, span: &[Message], default_model: &str) -> CompletionRequest {
        CompletionRequest {
            model: self.summary_model(default_model).to_string(),
            messages: vec![
                Message::system(self.instruction()),
                Message::user(Self::render_span(span)),
            ],
            max_output_tokens: self.config.max_summary_tokens,
            ..Default::default()
        }
    }

    /// Summarize `span`. Errors carry the service's message unchanged.
    pub async fn summarize(
        &self,
        service: &dyn CompletionService,
        span: &[Message],
        default_model: &str,
    ) -> Result<String, String> {
        let request = self.build_request(span, default_model);
        debug!(
            "Summarizing {} message(s) with {}",
            span.len(),
            request.model
        );
        let completion = service.send(&request).await?;
        Ok(completion.text.trim().to_string())
    }
}

/// The synthetic assistant message carrying a summary.
pub fn summary_message(summary: &str) -> Message {
    Message::assistant_text(format!("{SUMMARY_PREFIX}{summary}"))
}
