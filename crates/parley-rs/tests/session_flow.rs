//! End-to-end session scenarios against a scripted completion service.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use parley_rs::api::{
    Completion, CompletionFuture, CompletionRequest, CompletionService, HostedTool, ToolChoice,
};
use parley_rs::config::ChatConfig;
use parley_rs::context::summarizer::SUMMARY_PREFIX;
use parley_rs::context::{ConversationStore, TokenEstimator};
use parley_rs::error::ChatError;
use parley_rs::session::{ChatSession, RestoreOutcome};
use parley_rs::{Message, MessageRole};
use serde_json::json;

/// Replays canned results in order and records every request it receives.
#[derive(Default)]
struct ScriptedService {
    results: Mutex<VecDeque<Result<Completion, String>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedService {
    fn new(results: Vec<Result<Completion, String>>) -> Arc<Self> {
        Arc::new(Self {
            results: Mutex::new(results.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl CompletionService for ScriptedService {
    fn send<'a>(&'a self, request: &'a CompletionRequest) -> CompletionFuture<'a> {
        self.requests.lock().unwrap().push(request.clone());
        let next = self
            .results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err("script exhausted".to_string()));
        Box::pin(async move { next })
    }
}

fn config() -> ChatConfig {
    ChatConfig::default()
        .with_model("plain-model")
        .with_browse_model("browse-model")
        .with_system_prompt("sys")
}

/// About 100 heuristic tokens per message.
fn filler(i: usize) -> String {
    format!("message {i:02} {}", "x".repeat(339))
}

/// A session with a deterministic estimator and `turns` alternating
/// messages already in the log.
fn session_with_history(
    service: Arc<ScriptedService>,
    turns: usize,
    budget: usize,
) -> ChatSession {
    let store = ConversationStore::new("sys", TokenEstimator::heuristic("test"))
        .with_token_budget(budget);
    let mut session = ChatSession::new(service, config()).with_store(store);

    let log: Vec<serde_json::Value> = (0..turns)
        .map(|i| {
            let role = if i % 2 == 0 { "user" } else { "assistant" };
            json!({"role": role, "content": filler(i)})
        })
        .collect();
    let outcome = session.restore(&json!({"systemPromptText": "sys", "chatLog": log}));
    assert_eq!(outcome, RestoreOutcome::Restored { messages: turns + 1 });
    session
}

#[tokio::test]
async fn over_budget_turn_is_summarized_then_sent() {
    let service = ScriptedService::new(vec![
        Ok(Completion::text_only("  the user and assistant traded filler  ")),
        Ok(Completion::text_only("final answer")),
    ]);
    // 14 historical messages; the new user turn makes 15.
    let mut session = session_with_history(service.clone(), 14, 1200);
    let before: Vec<Message> = session.messages().to_vec();

    let reply = session.ask(filler(14), Vec::new()).await.unwrap();
    assert_eq!(reply.text, "final answer");

    let requests = service.requests();
    assert_eq!(requests.len(), 2);

    // Summarizer call: default model, no tools, dropped span only.
    let summary_req = &requests[0];
    assert_eq!(summary_req.model, "plain-model");
    assert!(summary_req.tools.is_none());
    let rendered = summary_req.messages[1].text();
    assert!(rendered.contains("message 00"));
    assert!(rendered.contains("message 04"));
    assert!(!rendered.contains("message 05"));

    // Turn request: system + summary + last 10.
    let turn_req = &requests[1];
    assert_eq!(turn_req.model, "browse-model");
    assert_eq!(turn_req.tools, Some(vec![HostedTool::WebSearch]));
    assert_eq!(turn_req.tool_choice, Some(ToolChoice::Auto));
    assert_eq!(turn_req.messages.len(), 12);
    assert_eq!(turn_req.messages[0], Message::system("sys"));
    assert_eq!(
        turn_req.messages[1].text(),
        format!("{SUMMARY_PREFIX}the user and assistant traded filler")
    );
    // Messages 05..13 from history, then the new turn.
    assert_eq!(&turn_req.messages[2..11], &before[6..15]);
    assert_eq!(turn_req.messages[11], Message::user(filler(14)));

    // The reply lands after the preserved window.
    let log = session.messages();
    assert_eq!(log.len(), 13);
    assert_eq!(log[12], Message::assistant_text("final answer"));
    assert_eq!(session.store().compaction_count(), 1);
}

#[tokio::test]
async fn tool_rejection_falls_back_once() {
    let service = ScriptedService::new(vec![
        Err("tools not supported for this model".to_string()),
        Ok(Completion::text_only("answer without browsing")),
    ]);
    let mut session = ChatSession::new(service.clone(), config());

    let reply = session.ask("what's new?", Vec::new()).await.unwrap();
    assert!(reply.fell_back);
    assert_eq!(reply.text, "answer without browsing");

    let requests = service.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].model, "browse-model");
    assert!(requests[0].tools.is_some());
    assert_eq!(requests[1].model, "plain-model");
    assert!(requests[1].tools.is_none());
    assert!(requests[1].tool_choice.is_none());
    assert_eq!(session.messages().len(), 3);
}

#[tokio::test]
async fn second_rejection_fails_the_turn_without_a_third_send() {
    let service = ScriptedService::new(vec![
        Err("tools not supported for this model".to_string()),
        Err("tools not supported for this model".to_string()),
        Ok(Completion::text_only("never sent")),
    ]);
    let mut session = ChatSession::new(service.clone(), config());

    let err = session.ask("hello?", Vec::new()).await.unwrap_err();
    assert!(matches!(err, ChatError::ToolFallback { .. }));
    assert!(err.inline_message().starts_with("[Error] "));
    assert_eq!(service.requests().len(), 2);

    // The user's message stays, unanswered.
    let log = session.messages();
    assert_eq!(log.len(), 2);
    assert_eq!(log[1], Message::user("hello?"));
}

#[tokio::test]
async fn failed_turn_can_be_resent() {
    let service = ScriptedService::new(vec![
        Err("HTTP 502: bad gateway".to_string()),
        Ok(Completion::text_only("second try worked")),
    ]);
    let mut session = ChatSession::new(service.clone(), config());

    assert!(matches!(
        session.ask("ping", Vec::new()).await,
        Err(ChatError::Transport(_))
    ));
    session.ask("ping", Vec::new()).await.unwrap();

    let roles: Vec<MessageRole> = session.messages().iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![
            MessageRole::System,
            MessageRole::User,
            MessageRole::User,
            MessageRole::Assistant
        ]
    );
}

#[tokio::test]
async fn summarizer_failure_keeps_log_and_skips_send() {
    let service = ScriptedService::new(vec![Err("HTTP 500: summarizer down".to_string())]);
    let mut session = session_with_history(service.clone(), 14, 1200);

    let err = session.ask(filler(14), Vec::new()).await.unwrap_err();
    assert!(matches!(err, ChatError::Summarization(_)));
    assert_eq!(service.requests().len(), 1);

    let log = session.messages();
    assert_eq!(log.len(), 16);
    assert_eq!(log[15], Message::user(filler(14)));
    assert_eq!(session.store().compaction_count(), 0);
}

#[tokio::test]
async fn browsing_off_never_sends_tools() {
    let service = ScriptedService::new(vec![
        Ok(Completion::text_only("one")),
        Ok(Completion::text_only("two")),
    ]);
    let mut session = ChatSession::new(service.clone(), config().with_browsing(false));
    session.ask("search the web for tools", Vec::new()).await.unwrap();
    session.ask("use web_search please", Vec::new()).await.unwrap();

    for request in service.requests() {
        assert_eq!(request.model, "plain-model");
        let body = serde_json::to_value(&request).unwrap();
        assert!(body.get("tools").is_none());
        assert!(body.get("tool_choice").is_none());
    }
}

#[test]
fn malformed_restore_yields_single_system_message() {
    let service = ScriptedService::new(Vec::new());
    let mut session = ChatSession::new(service, config());
    session.restore(&json!({"chatLog": "not-a-list", "systemPromptText": "X"}));

    assert_eq!(session.messages(), &[Message::system("X")]);
    let snapshot = session.serialize();
    assert_eq!(snapshot.system_prompt_text, "X");
    assert_eq!(snapshot.chat_log.len(), 1);
}

#[tokio::test]
async fn citations_come_from_structure_and_text() {
    let raw = json!({
        "output": [{
            "type": "message",
            "content": [{
                "type": "output_text",
                "text": "see https://a.com and https://b.com.",
                "annotations": [{"type": "url_citation", "url": "https://a.com"}]
            }]
        }]
    });
    let service = ScriptedService::new(vec![Ok(Completion {
        text: "see https://a.com and https://b.com.".into(),
        raw,
        usage: None,
    })]);
    let mut session = ChatSession::new(service, config());

    let reply = session.ask("sources?", Vec::new()).await.unwrap();
    assert_eq!(reply.sources, vec!["https://a.com", "https://b.com"]);
}
