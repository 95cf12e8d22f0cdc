//! HTTP completion service for an OpenAI Responses-style endpoint.
//!
//! [`ResponsesClient`] is the production [`CompletionService`]. It maps the
//! conversation log onto the endpoint's typed `input` items, posts it, and
//! returns the reply text together with the raw JSON response so citations
//! can be pulled from annotations. Transient failures are retried here with
//! backoff; everything else is returned as a `String` for the planner to
//! classify.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, trace};

use super::request::{
    Completion, CompletionFuture, CompletionRequest, CompletionService, HostedTool, ToolChoice,
    UsageInfo,
};
use super::retry::{RetryConfig, retry_with_backoff};
use crate::config::ChatConfig;
use crate::{ContentPart, Message, MessageContent, MessageRole};

/// Default API root when `OPENAI_BASE_URL` is unset.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Environment variable overriding the API root.
pub const BASE_URL_ENV: &str = "OPENAI_BASE_URL";

// ── Wire types ─────────────────────────────────────────────────────

#[derive(Serialize)]
struct ResponsesBody<'a> {
    model: &'a str,
    input: Vec<InputItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [HostedTool]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<ToolChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Serialize, Debug, PartialEq)]
struct InputItem {
    role: MessageRole,
    content: Vec<InputPart>,
}

#[derive(Serialize, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
enum InputPart {
    InputText { text: String },
    InputImage { image_url: String },
    OutputText { text: String },
}

#[derive(Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Deserialize)]
struct ModelEntry {
    id: String,
}

/// Map one log message onto a typed input item. Assistant turns are
/// replayed as `output_text`; image parts on assistant turns are dropped.
fn to_input_item(message: &Message) -> InputItem {
    let content = match (&message.role, &message.content) {
        (MessageRole::Assistant, content) => vec![InputPart::OutputText {
            text: content.text(),
        }],
        (_, MessageContent::Text(text)) => vec![InputPart::InputText { text: text.clone() }],
        (_, MessageContent::Parts(parts)) => parts
            .iter()
            .map(|p| match p {
                ContentPart::Text { text } => InputPart::InputText { text: text.clone() },
                ContentPart::Image { image_url } => InputPart::InputImage {
                    image_url: image_url.clone(),
                },
            })
            .collect(),
    };
    InputItem {
        role: message.role,
        content,
    }
}

/// Reply text of a Responses payload: the `output_text` convenience field
/// when present, otherwise every `output_text` content part concatenated.
pub fn response_text(raw: &Value) -> String {
    if let Some(text) = raw.get("output_text").and_then(Value::as_str) {
        return text.to_string();
    }
    raw.get("output")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get("content").and_then(Value::as_array))
                .flatten()
                .filter(|part| part.get("type").and_then(Value::as_str) == Some("output_text"))
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .collect::<String>()
        })
        .unwrap_or_default()
}

/// Show only the first and last four characters of a secret.
pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}{}{tail}", "*".repeat(chars.len() - 8))
}

// ── Client ─────────────────────────────────────────────────────────

/// Async HTTP client for the Responses API.
pub struct ResponsesClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    retry: RetryConfig,
}

impl std::fmt::Debug for ResponsesClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponsesClient")
            .field("api_key", &mask_key(&self.api_key))
            .field("base_url", &self.base_url)
            .field("retry", &self.retry)
            .finish()
    }
}

impl ResponsesClient {
    /// Create a client with an explicit key, root URL and timeout.
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("parley-rs/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| format!("failed to build HTTP client: {e}"))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            retry: RetryConfig::default(),
        })
    }

    /// Build from the environment, taking timeout and retry count from
    /// `config`.
    pub fn from_env(config: &ChatConfig) -> Result<Self, String> {
        let api_key = std::env::var(API_KEY_ENV).map_err(|_| format!("{API_KEY_ENV} not set"))?;
        let base_url = std::env::var(BASE_URL_ENV).unwrap_or_else(|_| DEFAULT_BASE_URL.into());
        let client = Self::new(api_key, base_url, Duration::from_secs(config.timeout_secs))?
            .with_retry(RetryConfig::with_retries(config.max_retries));
        debug!("Created {client:?}");
        Ok(client)
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// One POST to `/responses`, no retries.
    async fn send_once(&self, request: &CompletionRequest) -> Result<Completion, String> {
        let body = ResponsesBody {
            model: &request.model,
            input: request.messages.iter().map(to_input_item).collect(),
            tools: request.tools.as_deref(),
            tool_choice: request.tool_choice,
            temperature: request.temperature,
            max_output_tokens: request.max_output_tokens,
        };
        debug!(
            "LLM request: model={}, input items={}, tools={}",
            body.model,
            body.input.len(),
            body.tools.map_or(0, <[HostedTool]>::len),
        );
        trace!(
            "Request payload size: {} bytes",
            serde_json::to_string(&body).map_or(0, |s| s.len())
        );

        let start = Instant::now();
        let resp = self
            .client
            .post(format!("{}/responses", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| format!("failed to read response: {e}"))?;
        debug!(
            "LLM response: HTTP {} in {:.1}s ({} bytes)",
            status,
            start.elapsed().as_secs_f64(),
            text.len()
        );

        if !status.is_success() {
            return Err(format!("OpenAI API HTTP {status}: {text}"));
        }

        let raw: Value =
            serde_json::from_str(&text).map_err(|e| format!("failed to parse response: {e}"))?;
        if let Some(message) = raw
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(Value::as_str)
        {
            return Err(format!("OpenAI API error: {message}"));
        }

        let usage = raw
            .get("usage")
            .and_then(|u| serde_json::from_value::<UsageInfo>(u.clone()).ok());
        if let Some(usage) = usage {
            debug!(
                "Token usage: input={}, output={}",
                usage.input_tokens, usage.output_tokens
            );
        }

        Ok(Completion {
            text: response_text(&raw),
            raw,
            usage,
        })
    }

    /// Fetch the provider's model ids, filtered to chat models and sorted.
    pub async fn list_models(&self) -> Result<Vec<String>, String> {
        let resp = self
            .client
            .get(format!("{}/models", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;
        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| format!("failed to read response: {e}"))?;
        if !status.is_success() {
            return Err(format!("OpenAI API HTTP {status}: {text}"));
        }
        let list: ModelList =
            serde_json::from_str(&text).map_err(|e| format!("failed to parse model list: {e}"))?;
        Ok(super::models::chat_models(list.data.into_iter().map(|m| m.id)))
    }
}

impl CompletionService for ResponsesClient {
    fn send<'a>(&'a self, request: &'a CompletionRequest) -> CompletionFuture<'a> {
        Box::pin(async move { retry_with_backoff(&self.retry, || self.send_once(request)).await })
    }
}
