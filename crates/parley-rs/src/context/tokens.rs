//! Token estimation for the conversation budget.
//!
//! Converts message content into an integer cost using the BPE encoding for
//! the configured model. Newer or unknown model names that the tokenizer
//! cannot map fall back deterministically to one of two general encodings:
//! `o200k_base` when the name looks like a long-context model, `cl100k_base`
//! otherwise. Only text is encoded; every image part adds a fixed
//! [`IMAGE_TOKEN_OVERHEAD`] so the trim decision is reproducible.

use crate::Message;
use tiktoken_rs::CoreBPE;
use tracing::{debug, info, warn};

/// Characters per token used when no BPE encoding can be loaded at all.
pub const DEFAULT_CHARS_PER_TOKEN: f64 = 3.5;

/// Fixed budget cost of one image part, whatever its size.
pub const IMAGE_TOKEN_OVERHEAD: usize = 85;

/// Model-name fragments that select the long-context encoding on fallback.
pub const LONG_CONTEXT_MARKERS: [&str; 6] = ["gpt-5", "4.1", "4o", "o4", "o3", "200k"];

/// The two general-purpose encodings available as fallbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingKind {
    /// Long-context encoding used by the 4o / 4.1 / o-series / gpt-5 families.
    O200kBase,
    /// Legacy encoding used by gpt-4 and gpt-3.5.
    Cl100kBase,
}

impl EncodingKind {
    pub fn name(&self) -> &'static str {
        match self {
            EncodingKind::O200kBase => "o200k_base",
            EncodingKind::Cl100kBase => "cl100k_base",
        }
    }

    fn load(&self) -> Result<CoreBPE, String> {
        let bpe = match self {
            EncodingKind::O200kBase => tiktoken_rs::o200k_base(),
            EncodingKind::Cl100kBase => tiktoken_rs::cl100k_base(),
        };
        bpe.map_err(|e| format!("failed to load {}: {e}", self.name()))
    }
}

/// Choose the fallback encoding for a model the tokenizer does not know.
pub fn fallback_encoding(model: &str) -> EncodingKind {
    if LONG_CONTEXT_MARKERS.iter().any(|m| model.contains(m)) {
        EncodingKind::O200kBase
    } else {
        EncodingKind::Cl100kBase
    }
}

/// Where the estimator's encoding came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingSource {
    /// The tokenizer knows this model name.
    Model,
    /// Unknown model name; resolved by [`fallback_encoding`].
    Fallback(EncodingKind),
    /// No encoding could be loaded; counting characters instead.
    Heuristic,
}

/// Estimates the token cost of messages for one model.
pub struct TokenEstimator {
    model: String,
    bpe: Option<CoreBPE>,
    source: EncodingSource,
}

impl std::fmt::Debug for TokenEstimator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenEstimator")
            .field("model", &self.model)
            .field("source", &self.source)
            .finish()
    }
}

impl TokenEstimator {
    /// Build an estimator for `model`. Never fails: unknown names use the
    /// fallback encoding, and a failure to load that degrades to counting
    /// characters.
    pub fn for_model(model: &str) -> Self {
        match tiktoken_rs::get_bpe_from_model(model) {
            Ok(bpe) => {
                debug!("Token encoding for {model}: model-specific");
                Self {
                    model: model.to_string(),
                    bpe: Some(bpe),
                    source: EncodingSource::Model,
                }
            }
            Err(_) => {
                let kind = fallback_encoding(model);
                info!(
                    "No tokenizer mapping for model {model}; using {}",
                    kind.name()
                );
                match kind.load() {
                    Ok(bpe) => Self {
                        model: model.to_string(),
                        bpe: Some(bpe),
                        source: EncodingSource::Fallback(kind),
                    },
                    Err(e) => {
                        warn!("{e}; estimating tokens from character counts");
                        Self::heuristic(model)
                    }
                }
            }
        }
    }

    /// Character-count estimator with no BPE encoding.
    pub fn heuristic(model: &str) -> Self {
        Self {
            model: model.to_string(),
            bpe: None,
            source: EncodingSource::Heuristic,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn source(&self) -> EncodingSource {
        self.source
    }

    /// Token count of a piece of text.
    pub fn count_text(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        match &self.bpe {
            Some(bpe) => bpe.encode_ordinary(text).len(),
            None => (text.chars().count() as f64 / DEFAULT_CHARS_PER_TOKEN).ceil() as usize,
        }
    }

    /// Cost of one message: text tokens plus the fixed image overhead.
    pub fn count_message(&self, message: &Message) -> usize {
        self.count_text(&message.content.text())
            + message.content.image_count() * IMAGE_TOKEN_OVERHEAD
    }

    /// Sum of per-message costs.
    pub fn estimate(&self, messages: &[Message]) -> usize {
        messages.iter().map(|m| self.count_message(m)).sum()
    }

    /// Estimate usage against a token budget.
    pub fn usage(&self, messages: &[Message], budget: usize) -> BudgetUsage {
        let estimated_tokens = self.estimate(messages);
        let usage_pct = if budget > 0 {
            estimated_tokens as f64 / budget as f64
        } else {
            1.0
        };
        BudgetUsage {
            estimated_tokens,
            budget,
            usage_pct,
        }
    }
}

/// Snapshot of budget consumption at a point in time.
#[derive(Debug, Clone, Copy)]
pub struct BudgetUsage {
    /// Estimated tokens in the whole log.
    pub estimated_tokens: usize,
    /// Configured ceiling.
    pub budget: usize,
    /// Usage as a fraction (may exceed 1.0).
    pub usage_pct: f64,
}

impl BudgetUsage {
    pub fn is_over_budget(&self) -> bool {
        self.estimated_tokens > self.budget
    }

    /// Format as a short log-friendly string.
    pub fn to_log_string(&self) -> String {
        format!(
            "context: ~{} tokens ({:.0}% of {})",
            self.estimated_tokens,
            self.usage_pct * 100.0,
            self.budget,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Attachment, Message};

    #[test]
    fn fallback_picks_long_context_for_modern_names() {
        assert_eq!(fallback_encoding("gpt-5-nano"), EncodingKind::O200kBase);
        assert_eq!(fallback_encoding("acme-4.1-chat"), EncodingKind::O200kBase);
        assert_eq!(fallback_encoding("acme-4o"), EncodingKind::O200kBase);
        assert_eq!(fallback_encoding("o4-mini-2026"), EncodingKind::O200kBase);
        assert_eq!(fallback_encoding("o3-pro"), EncodingKind::O200kBase);
        assert_eq!(fallback_encoding("local-200k"), EncodingKind::O200kBase);
    }

    #[test]
    fn fallback_picks_legacy_otherwise() {
        assert_eq!(fallback_encoding("acme-chat"), EncodingKind::Cl100kBase);
        assert_eq!(fallback_encoding(""), EncodingKind::Cl100kBase);
        assert_eq!(fallback_encoding("llama-3-70b"), EncodingKind::Cl100kBase);
    }

    #[test]
    fn known_model_uses_model_encoding() {
        let est = TokenEstimator::for_model("gpt-4");
        assert_eq!(est.source(), EncodingSource::Model);
    }

    #[test]
    fn unknown_model_uses_legacy_fallback() {
        let est = TokenEstimator::for_model("acme-chat");
        assert_eq!(
            est.source(),
            EncodingSource::Fallback(EncodingKind::Cl100kBase)
        );
        assert!(est.count_text("hello world") > 0);
    }

    #[test]
    fn unknown_long_context_model_uses_o200k() {
        let est = TokenEstimator::for_model("acme-4o-chat");
        assert_eq!(
            est.source(),
            EncodingSource::Fallback(EncodingKind::O200kBase)
        );
    }

    #[test]
    fn empty_system_message_costs_nothing() {
        let est = TokenEstimator::for_model("acme-chat");
        assert_eq!(est.estimate(&[Message::system("")]), 0);
    }

    #[test]
    fn images_add_fixed_overhead() {
        let est = TokenEstimator::for_model("acme-chat");
        let plain = Message::user("describe this");
        let with_images = Message::user_with_attachments(
            "describe this",
            &[
                Attachment::new("a.png", "data:image/png;base64,AAAA"),
                Attachment::new("b.png", "https://example.com/b.png"),
            ],
        );
        assert_eq!(
            est.count_message(&with_images),
            est.count_message(&plain) + 2 * IMAGE_TOKEN_OVERHEAD
        );
    }

    #[test]
    fn estimate_sums_messages() {
        let est = TokenEstimator::for_model("acme-chat");
        let a = Message::user("one two three");
        let b = Message::assistant_text("four five");
        assert_eq!(
            est.estimate(&[a.clone(), b.clone()]),
            est.count_message(&a) + est.count_message(&b)
        );
    }

    #[test]
    fn heuristic_counts_characters() {
        let est = TokenEstimator::heuristic("anything");
        assert_eq!(est.source(), EncodingSource::Heuristic);
        assert_eq!(est.count_text(&"a".repeat(35)), 10);
        assert_eq!(est.count_text(""), 0);
    }

    #[test]
    fn usage_reports_over_budget() {
        let est = TokenEstimator::heuristic("m");
        let messages = vec![Message::user("a".repeat(700))];
        let usage = est.usage(&messages, 100);
        assert_eq!(usage.estimated_tokens, 200);
        assert!(usage.is_over_budget());
        assert!(usage.to_log_string().contains("200%"));

        let usage = est.usage(&messages, 1000);
        assert!(!usage.is_over_budget());
    }
}
