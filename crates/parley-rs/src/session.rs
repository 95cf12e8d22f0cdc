//! The session surface the UI and persistence layers talk to.
//!
//! A [`ChatSession`] ties the store, planner, summarizer and citation
//! extractor together behind four operations:
//!
//! - [`ask`](ChatSession::ask): append the user turn, compress if over
//!   budget, send (with tool fallback), extract sources, append the reply.
//! - [`reset`](ChatSession::reset): start a new chat.
//! - [`serialize`](ChatSession::serialize) / [`restore`](ChatSession::restore):
//!   snapshot and rebuild. `restore` never fails; a malformed payload yields
//!   a fresh single-system-message log.
//!
//! A failed turn leaves the user's message in the log unanswered, so the
//! caller can show the error inline and the user can resend without
//! retyping.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::api::{CompletionService, CostTracker, PlanState, RequestPlanner};
use crate::citations::extract_citations;
use crate::config::ChatConfig;
use crate::context::store::validate_log;
use crate::context::{ConversationStore, Summarizer, TokenEstimator};
use crate::error::ChatError;
use crate::{Attachment, DEFAULT_SYSTEM_PROMPT, Message, MessageRole};

/// Supplies the authoritative system prompt. Read before every request.
pub type PromptSource = Arc<dyn Fn() -> Option<String> + Send + Sync>;

/// What [`ChatSession::ask`] hands back to the UI.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnReply {
    pub text: String,
    pub sources: Vec<String>,
    /// Whether the reply came from the tool-free fallback.
    pub fell_back: bool,
}

/// Persistable view of a session.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    /// The non-browsing model.
    pub model_id: String,
    pub browsing_enabled: bool,
    pub system_prompt_text: String,
    pub chat_log: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<String>,
}

/// How [`ChatSession::restore`] handled a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// The saved log was adopted.
    Restored { messages: usize },
    /// The saved log was unusable; the session holds a fresh log built from
    /// the saved system prompt.
    Rebuilt { reason: String },
}

pub struct ChatSession {
    service: Arc<dyn CompletionService>,
    store: ConversationStore,
    planner: RequestPlanner,
    summarizer: Summarizer,
    browsing_enabled: bool,
    prompt_source: Option<PromptSource>,
    costs: CostTracker,
    last_sources: Vec<String>,
}

impl std::fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession")
            .field("store", &self.store)
            .field("planner", &self.planner)
            .field("browsing_enabled", &self.browsing_enabled)
            .field("last_sources", &self.last_sources)
            .finish_non_exhaustive()
    }
}

impl ChatSession {
    pub fn new(service: Arc<dyn CompletionService>, config: ChatConfig) -> Self {
        let store = ConversationStore::new(&config.system_prompt, config.estimator())
            .with_token_budget(config.token_budget);
        Self {
            service,
            store,
            planner: config.planner(),
            summarizer: config.summarizer(),
            browsing_enabled: config.browsing_enabled,
            prompt_source: None,
            costs: config.cost_tracker(),
            last_sources: Vec::new(),
        }
    }

    /// Replace the planner, e.g. to install a different incompatibility rule.
    pub fn with_planner(mut self, planner: RequestPlanner) -> Self {
        self.planner = planner;
        self
    }

    /// Replace the store, e.g. to change the recent-message window.
    pub fn with_store(mut self, store: ConversationStore) -> Self {
        self.store = store;
        self
    }

    /// Read the system prompt from `source` before every outbound request.
    pub fn with_prompt_source(
        mut self,
        source: impl Fn() -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.prompt_source = Some(Arc::new(source));
        self
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub fn messages(&self) -> &[Message] {
        self.store.messages()
    }

    pub fn model(&self) -> &str {
        self.planner.default_model()
    }

    pub fn browse_model(&self) -> &str {
        self.planner.browse_model()
    }

    pub fn browsing_enabled(&self) -> bool {
        self.browsing_enabled
    }

    pub fn set_browsing(&mut self, enabled: bool) {
        self.browsing_enabled = enabled;
    }

    /// Switch the non-browsing model. The estimator follows it.
    pub fn set_model(&mut self, model: impl Into<String>) {
        let model = model.into();
        self.store.set_estimator(TokenEstimator::for_model(&model));
        self.planner.set_default_model(model);
    }

    pub fn set_browse_model(&mut self, model: impl Into<String>) {
        self.planner.set_browse_model(model);
    }

    /// Sources of the most recent successful turn.
    pub fn last_sources(&self) -> &[String] {
        &self.last_sources
    }

    pub fn costs(&self) -> &CostTracker {
        &self.costs
    }

    pub fn cost_summary(&self) -> String {
        self.costs.summary()
    }

    /// Pick up an edited system prompt without resetting the chat.
    fn refresh_system_prompt(&mut self) {
        let Some(source) = &self.prompt_source else {
            return;
        };
        if let Some(prompt) = source()
            && prompt != self.store.system_prompt()
        {
            debug!("System prompt changed; replacing index 0");
            self.store.replace_system_prompt(prompt);
        }
    }

    /// Run one turn.
    pub async fn ask(
        &mut self,
        text: impl Into<String>,
        attachments: Vec<Attachment>,
    ) -> Result<TurnReply, ChatError> {
        self.refresh_system_prompt();
        self.store
            .push(Message::user_with_attachments(text, &attachments))?;

        self.store
            .compress_if_over_budget(
                &self.summarizer,
                self.service.as_ref(),
                self.planner.default_model(),
            )
            .await?;

        let planned = self
            .planner
            .send(
                self.service.as_ref(),
                &self.store.normalized(),
                self.browsing_enabled,
            )
            .await?;

        if let Some(usage) = planned.completion.usage {
            self.costs
                .record(&planned.model, usage.input_tokens, usage.output_tokens);
        }

        let reply = planned.completion.text;
        let sources = extract_citations(&planned.completion.raw, &reply);
        self.store.push(Message::assistant_text(reply.clone()))?;
        info!(
            "Turn complete: model={}, {} chars, {} source(s), log={} message(s)",
            planned.model,
            reply.len(),
            sources.len(),
            self.store.len()
        );

        self.last_sources = sources.clone();
        Ok(TurnReply {
            text: reply,
            sources,
            fell_back: planned.state == PlanState::Fallback,
        })
    }

    /// Start a new chat, optionally with a different system prompt.
    pub fn reset(&mut self, system_prompt: Option<String>) {
        self.store.reset(system_prompt);
        self.last_sources.clear();
    }

    pub fn serialize(&self) -> SessionSnapshot {
        SessionSnapshot {
            model_id: self.planner.default_model().to_string(),
            browsing_enabled: self.browsing_enabled,
            system_prompt_text: self.store.system_prompt(),
            chat_log: self.store.messages().to_vec(),
            saved_at: Some(chrono::Utc::now().to_rfc3339()),
        }
    }

    /// Rebuild from a payload produced by [`serialize`](Self::serialize).
    ///
    /// Every field is optional. A `chatLog` that is not a list of role/content
    /// maps, or that breaks the system-message invariant, is replaced by
    /// `[system(systemPromptText)]`.
    pub fn restore(&mut self, payload: &Value) -> RestoreOutcome {
        if let Some(model) = payload.get("modelId").and_then(Value::as_str) {
            self.set_model(model);
        }
        if let Some(enabled) = payload.get("browsingEnabled").and_then(Value::as_bool) {
            self.browsing_enabled = enabled;
        }
        let prompt = payload
            .get("systemPromptText")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| {
                let current = self.store.system_prompt();
                if current.is_empty() {
                    DEFAULT_SYSTEM_PROMPT.to_string()
                } else {
                    current
                }
            });
        self.last_sources.clear();

        match parse_chat_log(payload.get("chatLog"), &prompt) {
            Ok(messages) => {
                let count = messages.len();
                // parse_chat_log already validated the log.
                if let Err(e) = self.store.replace_log(messages) {
                    return self.rebuild(prompt, e.to_string());
                }
                debug!("Restored session with {count} message(s)");
                RestoreOutcome::Restored { messages: count }
            }
            Err(reason) => self.rebuild(prompt, reason),
        }
    }

    /// [`restore`](Self::restore) from JSON text. Unparseable text is treated
    /// like a malformed log.
    pub fn restore_json(&mut self, json: &str) -> RestoreOutcome {
        match serde_json::from_str::<Value>(json) {
            Ok(payload) => self.restore(&payload),
            Err(e) => {
                let prompt = self.store.system_prompt();
                self.last_sources.clear();
                self.rebuild(prompt, format!("unparseable session: {e}"))
            }
        }
    }

    fn rebuild(&mut self, prompt: String, reason: String) -> RestoreOutcome {
        warn!("Session restore fell back to a fresh log: {reason}");
        self.store.reset(Some(prompt));
        RestoreOutcome::Rebuilt { reason }
    }
}

/// Decode a saved log. A log without a leading system message gets one
/// built from `prompt`.
fn parse_chat_log(raw: Option<&Value>, prompt: &str) -> Result<Vec<Message>, String> {
    let raw = raw.ok_or_else(|| "chatLog missing".to_string())?;
    let mut messages: Vec<Message> = serde_json::from_value(raw.clone())
        .map_err(|e| format!("chatLog is not a list of messages: {e}"))?;
    if messages.first().map(|m| m.role) != Some(MessageRole::System) {
        messages.insert(0, Message::system(prompt));
    }
    validate_log(&messages)?;
    Ok(messages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Completion, CompletionFuture, CompletionRequest};
    use serde_json::json;
    use std::sync::Mutex;

    /// Answers every request with the same completion and keeps the
    /// requests.
    struct Echo {
        completion: Completion,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    impl Echo {
        fn new(completion: Completion) -> Arc<Self> {
            Arc::new(Self {
                completion,
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    impl CompletionService for Echo {
        fn send<'a>(&'a self, request: &'a CompletionRequest) -> CompletionFuture<'a> {
            self.requests.lock().unwrap().push(request.clone());
            let completion = self.completion.clone();
            Box::pin(async move { Ok(completion) })
        }
    }

    fn config() -> ChatConfig {
        ChatConfig::default().with_system_prompt("sys")
    }

    #[tokio::test]
    async fn ask_appends_both_turns_and_returns_sources() {
        let echo = Echo::new(Completion {
            text: "See https://b.com.".into(),
            raw: json!({"output": [{"annotations": [{"url": "https://a.com"}]}]}),
            usage: Some(crate::api::UsageInfo {
                input_tokens: 100,
                output_tokens: 20,
            }),
        });
        let mut session = ChatSession::new(echo.clone(), config());

        let reply = session.ask("hello", Vec::new()).await.unwrap();
        assert_eq!(reply.text, "See https://b.com.");
        assert_eq!(reply.sources, vec!["https://a.com", "https://b.com"]);
        assert!(!reply.fell_back);
        assert_eq!(session.last_sources(), reply.sources.as_slice());

        let log = session.messages();
        assert_eq!(log.len(), 3);
        assert_eq!(log[1], Message::user("hello"));
        assert_eq!(log[2].role, MessageRole::Assistant);
        assert_eq!(session.costs().calls, 1);
        assert_eq!(session.costs().total_input_tokens, 100);
    }

    #[tokio::test]
    async fn prompt_source_is_read_before_each_request() {
        let echo = Echo::new(Completion::text_only("ok"));
        let prompt = Arc::new(Mutex::new("first".to_string()));
        let source = prompt.clone();
        let mut session = ChatSession::new(echo.clone(), config())
            .with_prompt_source(move || Some(source.lock().unwrap().clone()));

        session.ask("a", Vec::new()).await.unwrap();
        *prompt.lock().unwrap() = "second".to_string();
        session.ask("b", Vec::new()).await.unwrap();

        let requests = echo.requests.lock().unwrap();
        assert_eq!(requests[0].messages[0].text(), "first");
        assert_eq!(requests[1].messages[0].text(), "second");
        assert_eq!(session.messages()[0].text(), "second");
    }

    #[tokio::test]
    async fn attachments_reach_the_request() {
        let echo = Echo::new(Completion::text_only("a cat"));
        let mut session = ChatSession::new(echo.clone(), config());
        session
            .ask(
                "what is this?",
                vec![Attachment::new("cat.png", "https://img.example/cat.png")],
            )
            .await
            .unwrap();

        let requests = echo.requests.lock().unwrap();
        assert_eq!(requests[0].messages[1].content.image_count(), 1);
    }

    #[test]
    fn reset_collapses_log() {
        let mut session = ChatSession::new(Echo::new(Completion::default()), config());
        session.store.push(Message::user("hi")).unwrap();
        session.reset(None);
        assert_eq!(session.messages(), &[Message::system("sys")]);
        session.reset(Some("fresh".into()));
        assert_eq!(session.messages(), &[Message::system("fresh")]);
    }

    #[test]
    fn serialize_then_restore() {
        let mut session = ChatSession::new(Echo::new(Completion::default()), config());
        session.store.push(Message::user("hi")).unwrap();
        session.store.push(Message::assistant_text("hello")).unwrap();
        session.set_browsing(false);
        let snapshot = serde_json::to_value(session.serialize()).unwrap();
        assert_eq!(snapshot["modelId"], "gpt-4o-mini");
        assert_eq!(snapshot["browsingEnabled"], false);
        assert_eq!(snapshot["systemPromptText"], "sys");

        let mut other = ChatSession::new(Echo::new(Completion::default()), ChatConfig::default());
        let outcome = other.restore(&snapshot);
        assert_eq!(outcome, RestoreOutcome::Restored { messages: 3 });
        assert_eq!(other.messages(), session.messages());
        assert!(!other.browsing_enabled());
    }

    #[test]
    fn malformed_log_rebuilds_from_prompt() {
        let mut session = ChatSession::new(Echo::new(Completion::default()), config());
        let outcome = session.restore(&json!({"chatLog": "not-a-list", "systemPromptText": "X"}));
        assert!(matches!(outcome, RestoreOutcome::Rebuilt { .. }));
        assert_eq!(session.messages(), &[Message::system("X")]);
    }

    #[test]
    fn log_without_system_gets_one() {
        let mut session = ChatSession::new(Echo::new(Completion::default()), config());
        let outcome = session.restore(&json!({
            "systemPromptText": "Y",
            "chatLog": [{"role": "user", "content": "hi"}]
        }));
        assert_eq!(outcome, RestoreOutcome::Restored { messages: 2 });
        assert_eq!(session.messages()[0], Message::system("Y"));
    }

    #[test]
    fn stray_system_message_rebuilds() {
        let mut session = ChatSession::new(Echo::new(Completion::default()), config());
        let outcome = session.restore(&json!({
            "systemPromptText": "Z",
            "chatLog": [
                {"role": "system", "content": "Z"},
                {"role": "system", "content": "again"}
            ]
        }));
        assert!(matches!(outcome, RestoreOutcome::Rebuilt { .. }));
        assert_eq!(session.messages(), &[Message::system("Z")]);
    }

    #[test]
    fn unparseable_text_keeps_current_prompt() {
        let mut session = ChatSession::new(Echo::new(Completion::default()), config());
        let outcome = session.restore_json("{{{");
        assert!(matches!(outcome, RestoreOutcome::Rebuilt { .. }));
        assert_eq!(session.messages(), &[Message::system("sys")]);
    }

    #[test]
    fn set_model_rebuilds_estimator() {
        let mut session = ChatSession::new(Echo::new(Completion::default()), config());
        session.set_model("gpt-4.1-mini");
        assert_eq!(session.model(), "gpt-4.1-mini");
        assert_eq!(session.store().estimator().model(), "gpt-4.1-mini");
    }
}
