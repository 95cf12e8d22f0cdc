//! API interaction layer: request types, planning, HTTP transport, retry,
//! model catalog, and cost tracking.
//!
//! These modules handle everything between the [`ChatSession`](crate::session::ChatSession)
//! and the remote endpoint:
//!
//! - [`request`]: [`CompletionRequest`] and the [`CompletionService`] seam.
//!   The conversation core only ever talks to this trait.
//! - [`planner`]: [`RequestPlanner`] attaches the hosted web-search tool
//!   when browsing is on and resends once without tools when the model
//!   rejects them.
//! - [`client`]: [`ResponsesClient`], the reqwest-backed service.
//! - [`retry`]: transient error detection with capped exponential backoff.
//!   Never retries 400/401 errors.
//! - [`models`]: filtering a provider model listing down to chat models.
//! - [`cost`]: per-model pricing and cumulative [`CostTracker`].

pub mod client;
pub mod cost;
pub mod models;
pub mod planner;
pub mod request;
pub mod retry;

// Re-export commonly used items at the module level.
pub use client::{ResponsesClient, mask_key};
pub use cost::{CostTracker, ModelPricing, pricing_for_model};
pub use models::{chat_models, is_chat_model};
pub use planner::{PlanState, PlannedCompletion, RequestPlanner, is_tool_incompatibility};
pub use request::{
    Completion, CompletionFuture, CompletionRequest, CompletionService, HostedTool, ToolChoice,
    UsageInfo,
};
pub use retry::RetryConfig;
