//! Token usage and cost tracking for a chat session.
//!
//! Usage is taken from the provider's response when present. Costs are
//! estimates for spotting runaway sessions, not billing.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Per-model pricing for cost estimation (USD per 1M tokens).
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct ModelPricing {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl ModelPricing {
    pub const fn new(input_per_million: f64, output_per_million: f64) -> Self {
        Self {
            input_per_million,
            output_per_million,
        }
    }

    /// Estimate cost for given token counts.
    pub fn estimate_cost(&self, input_tokens: u32, output_tokens: u32) -> f64 {
        (input_tokens as f64 / 1_000_000.0) * self.input_per_million
            + (output_tokens as f64 / 1_000_000.0) * self.output_per_million
    }
}

impl Default for ModelPricing {
    fn default() -> Self {
        Self::new(2.50, 10.0)
    }
}

/// Approximate pricing for a model id. Longer, more specific names are
/// matched first so `gpt-4o-mini` never prices as `gpt-4o`.
pub fn pricing_for_model(model: &str) -> ModelPricing {
    let name = model.rsplit('/').next().unwrap_or(model).to_lowercase();

    if name.contains("4o-mini") {
        ModelPricing::new(0.15, 0.60)
    } else if name.contains("4.1-nano") {
        ModelPricing::new(0.10, 0.40)
    } else if name.contains("4.1-mini") {
        ModelPricing::new(0.40, 1.60)
    } else if name.contains("4.1") {
        ModelPricing::new(2.0, 8.0)
    } else if name.contains("gpt-5-mini") {
        ModelPricing::new(0.25, 2.0)
    } else if name.contains("gpt-5") {
        ModelPricing::new(1.25, 10.0)
    } else if name.contains("4o") {
        ModelPricing::new(2.50, 10.0)
    } else if name.contains("gpt-4") {
        ModelPricing::new(30.0, 60.0)
    } else if name.contains("gpt-3.5") {
        ModelPricing::new(0.50, 1.50)
    } else if name.starts_with("o1") || name.starts_with("o3") {
        ModelPricing::new(15.0, 60.0)
    } else {
        ModelPricing::default()
    }
}

/// Cumulative usage across a session, with optional per-model overrides.
#[derive(Debug, Default, Clone)]
pub struct CostTracker {
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub estimated_cost_usd: f64,
    pub calls: u32,
    overrides: HashMap<String, ModelPricing>,
}

impl CostTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use configured prices instead of the built-in table.
    pub fn with_overrides(mut self, overrides: HashMap<String, ModelPricing>) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn pricing(&self, model: &str) -> ModelPricing {
        self.overrides
            .get(model)
            .copied()
            .unwrap_or_else(|| pricing_for_model(model))
    }

    /// Record one completion call.
    pub fn record(&mut self, model: &str, input_tokens: u32, output_tokens: u32) {
        let pricing = self.pricing(model);
        self.total_input_tokens += input_tokens as u64;
        self.total_output_tokens += output_tokens as u64;
        self.estimated_cost_usd += pricing.estimate_cost(input_tokens, output_tokens);
        self.calls += 1;
    }

    pub fn total_tokens(&self) -> u64 {
        self.total_input_tokens + self.total_output_tokens
    }

    /// Format as a short summary string.
    pub fn summary(&self) -> String {
        format!(
            "{} call(s), tokens: {} in + {} out = {} total, est. cost: ${:.4}",
            self.calls,
            self.total_input_tokens,
            self.total_output_tokens,
            self.total_tokens(),
            self.estimated_cost_usd,
        )
    }
}
