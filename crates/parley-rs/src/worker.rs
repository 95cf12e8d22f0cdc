//! Run a [`ChatSession`] off the UI thread.
//!
//! ```text
//! UI ──SessionCommand──▶ mpsc ──▶ worker task (owns ChatSession)
//! UI ◀──SessionEvent──── mpsc ◀──┘
//! ```
//!
//! The worker owns the session outright and handles one command at a time,
//! so at most one turn is ever in flight and the store needs no locks. A UI
//! can keep accepting input while a turn runs; queued commands wait their
//! turn.

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::Attachment;
use crate::session::{ChatSession, RestoreOutcome, SessionSnapshot};

/// Channel capacity for commands and events.
const CHANNEL_CAPACITY: usize = 32;

const WORKER_GONE: &str = "session worker has stopped";

/// Requests the UI sends to the worker.
#[derive(Debug)]
pub enum SessionCommand {
    Ask {
        text: String,
        attachments: Vec<Attachment>,
    },
    Reset {
        system_prompt: Option<String>,
    },
    SetBrowsing(bool),
    SetModel(String),
    Snapshot(oneshot::Sender<SessionSnapshot>),
    Restore {
        payload: Value,
        reply: oneshot::Sender<RestoreOutcome>,
    },
    CostSummary(oneshot::Sender<String>),
    Shutdown,
}

/// Results the worker delivers back to the UI.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Reply { text: String, sources: Vec<String> },
    /// A failed turn. `message` is ready to show in place of the reply.
    Failed { message: String },
    ResetDone,
}

/// The UI side of a running worker.
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    events: mpsc::Receiver<SessionEvent>,
    task: JoinHandle<ChatSession>,
}

/// Move `session` into a tokio task. Must be called inside a runtime.
pub fn spawn(session: ChatSession) -> SessionHandle {
    let (command_tx, command_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (event_tx, event_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let task = tokio::spawn(run(session, command_rx, event_tx));
    SessionHandle {
        commands: command_tx,
        events: event_rx,
        task,
    }
}

async fn run(
    mut session: ChatSession,
    mut commands: mpsc::Receiver<SessionCommand>,
    events: mpsc::Sender<SessionEvent>,
) -> ChatSession {
    while let Some(command) = commands.recv().await {
        let event = match command {
            SessionCommand::Ask { text, attachments } => {
                match session.ask(text, attachments).await {
                    Ok(reply) => Some(SessionEvent::Reply {
                        text: reply.text,
                        sources: reply.sources,
                    }),
                    Err(e) => {
                        warn!("Turn failed: {e}");
                        Some(SessionEvent::Failed {
                            message: e.inline_message(),
                        })
                    }
                }
            }
            SessionCommand::Reset { system_prompt } => {
                session.reset(system_prompt);
                Some(SessionEvent::ResetDone)
            }
            SessionCommand::SetBrowsing(enabled) => {
                session.set_browsing(enabled);
                None
            }
            SessionCommand::SetModel(model) => {
                session.set_model(model);
                None
            }
            SessionCommand::Snapshot(reply) => {
                let _ = reply.send(session.serialize());
                None
            }
            SessionCommand::Restore { payload, reply } => {
                let _ = reply.send(session.restore(&payload));
                None
            }
            SessionCommand::CostSummary(reply) => {
                let _ = reply.send(session.cost_summary());
                None
            }
            SessionCommand::Shutdown => break,
        };
        if let Some(event) = event
            && events.send(event).await.is_err()
        {
            debug!("Event receiver dropped; stopping worker");
            break;
        }
    }
    session
}

impl SessionHandle {
    async fn send(&self, command: SessionCommand) -> Result<(), String> {
        self.commands
            .send(command)
            .await
            .map_err(|_| WORKER_GONE.to_string())
    }

    /// Queue a turn. The outcome arrives as a [`SessionEvent`].
    pub async fn ask(
        &self,
        text: impl Into<String>,
        attachments: Vec<Attachment>,
    ) -> Result<(), String> {
        self.send(SessionCommand::Ask {
            text: text.into(),
            attachments,
        })
        .await
    }

    pub async fn reset(&self, system_prompt: Option<String>) -> Result<(), String> {
        self.send(SessionCommand::Reset { system_prompt }).await
    }

    pub async fn set_browsing(&self, enabled: bool) -> Result<(), String> {
        self.send(SessionCommand::SetBrowsing(enabled)).await
    }

    pub async fn set_model(&self, model: impl Into<String>) -> Result<(), String> {
        self.send(SessionCommand::SetModel(model.into())).await
    }

    /// Snapshot taken after every previously queued command has run.
    pub async fn snapshot(&self) -> Result<SessionSnapshot, String> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionCommand::Snapshot(tx)).await?;
        rx.await.map_err(|_| WORKER_GONE.to_string())
    }

    pub async fn restore(&self, payload: Value) -> Result<RestoreOutcome, String> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionCommand::Restore { payload, reply: tx })
            .await?;
        rx.await.map_err(|_| WORKER_GONE.to_string())
    }

    pub async fn cost_summary(&self) -> Result<String, String> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionCommand::CostSummary(tx)).await?;
        rx.await.map_err(|_| WORKER_GONE.to_string())
    }

    /// Next event, or `None` once the worker has stopped.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.events.recv().await
    }

    /// Stop the worker after queued commands finish and take the session
    /// back.
    pub async fn shutdown(self) -> Result<ChatSession, String> {
        // Ignore a send error: the worker may already have stopped.
        let _ = self.commands.send(SessionCommand::Shutdown).await;
        drop(self.events);
        self.task
            .await
            .map_err(|e| format!("session worker panicked: {e}"))
    }
}
