//! Conversation memory: token estimation, the message log, and compression.
//!
//! The token budget is the scarcest resource in a long chat session. This
//! module keeps the log under it:
//!
//! 1. **[`tokens`]**: [`TokenEstimator`] converts messages into an integer
//!    cost with the model's BPE encoding, falling back deterministically for
//!    unknown model names.
//!
//! 2. **[`store`]**: [`ConversationStore`] owns the ordered log (system
//!    prompt at index 0) and triggers compression when the estimate exceeds
//!    the budget.
//!
//! 3. **[`summarizer`]**: one tool-free completion call that condenses the
//!    dropped middle of the conversation into a single summary message.

pub mod store;
pub mod summarizer;
pub mod tokens;

// Re-export commonly used items at the module level.
pub use store::{CompressionEvent, ConversationStore, DEFAULT_TOKEN_BUDGET, RECENT_WINDOW};
pub use summarizer::{Summarizer, SummarizerConfig};
pub use tokens::{BudgetUsage, EncodingKind, EncodingSource, TokenEstimator};
