//! Session configuration.
//!
//! [`ChatConfig`] is the one explicit configuration object a session is
//! built from: model ids, browsing default, system prompt, token budget,
//! summarizer settings, transport limits and price overrides. It is plain
//! data, loaded from JSON with every field defaulted so partial files work.
//!
//! # Examples
//!
//! ```ignore
//! let config = ChatConfig::load(Path::new("parley.json"))?
//!     .with_model("gpt-4.1-mini")
//!     .with_browsing(false)
//!     .with_token_budget(8_000);
//! ```

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::{CostTracker, ModelPricing, RequestPlanner};
use crate::context::{DEFAULT_TOKEN_BUDGET, Summarizer, SummarizerConfig, TokenEstimator};
use crate::error::ChatError;
use crate::{DEFAULT_BROWSE_MODEL, DEFAULT_MODEL, DEFAULT_SYSTEM_PROMPT};

/// Configuration for a [`ChatSession`](crate::session::ChatSession).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ChatConfig {
    /// Non-browsing model. Also the fallback and summarizer model.
    pub model: String,
    /// Model that receives the hosted web-search tool.
    pub browse_model: String,
    pub browsing_enabled: bool,
    pub system_prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Estimated-token ceiling before compression triggers.
    pub token_budget: usize,
    pub summary_words: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary_model: Option<String>,
    /// HTTP request timeout.
    pub timeout_secs: u64,
    /// Transport retries on transient errors.
    pub max_retries: u32,
    /// Price overrides keyed by model id (USD per 1M tokens).
    pub prices: HashMap<String, ModelPricing>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.into(),
            browse_model: DEFAULT_BROWSE_MODEL.into(),
            browsing_enabled: true,
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
            temperature: None,
            token_budget: DEFAULT_TOKEN_BUDGET,
            summary_words: 500,
            summary_model: None,
            timeout_secs: 30,
            max_retries: 3,
            prices: HashMap::new(),
        }
    }
}

impl ChatConfig {
    /// Load from a JSON file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ChatError> {
        if !path.exists() {
            debug!("No config at {}; using defaults", path.display());
            return Ok(Self::default());
        }
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json)
            .map_err(|e| ChatError::Config(format!("invalid config {}: {e}", path.display())))
    }

    /// Write as pretty JSON via a temp file and rename.
    pub fn save(&self, path: &Path) -> Result<(), ChatError> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| ChatError::Config(format!("failed to serialize config: {e}")))?;
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, json)?;
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_browse_model(mut self, model: impl Into<String>) -> Self {
        self.browse_model = model.into();
        self
    }

    pub fn with_browsing(mut self, enabled: bool) -> Self {
        self.browsing_enabled = enabled;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_token_budget(mut self, budget: usize) -> Self {
        self.token_budget = budget;
        self
    }

    pub fn with_summary_model(mut self, model: impl Into<String>) -> Self {
        self.summary_model = Some(model.into());
        self
    }

    pub fn with_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_price(mut self, model: impl Into<String>, pricing: ModelPricing) -> Self {
        self.prices.insert(model.into(), pricing);
        self
    }

    /// Planner for the configured model pair.
    pub fn planner(&self) -> RequestPlanner {
        RequestPlanner::new(&self.model, &self.browse_model).with_temperature(self.temperature)
    }

    pub fn summarizer(&self) -> Summarizer {
        Summarizer::new(SummarizerConfig {
            model: self.summary_model.clone(),
            summary_words: self.summary_words,
            max_summary_tokens: None,
        })
    }

    /// Estimator for the non-browsing model, which every budget check uses.
    pub fn estimator(&self) -> TokenEstimator {
        TokenEstimator::for_model(&self.model)
    }

    pub fn cost_tracker(&self) -> CostTracker {
        CostTracker::new().with_overrides(self.prices.clone())
    }
}
