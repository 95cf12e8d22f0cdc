//! Interactive chat over stdin with bounded conversation memory.
//!
//! Reads the API key from the `OPENAI_API_KEY` environment variable and the
//! optional API root from `OPENAI_BASE_URL`.
//!
//! # Examples
//!
//! ```sh
//! # Chat with the defaults (gpt-4o-mini, browsing through gpt-4o)
//! parley
//!
//! # Smaller budget, no browsing, custom persona
//! parley --budget 4000 --no-browse --system "You are a terse reviewer."
//!
//! # Settings from a file, flags still win
//! parley --config ~/.config/parley.json --model gpt-4.1-mini
//!
//! # Print the chat models the endpoint offers
//! parley --list-models
//! ```
//!
//! Inside the REPL, plain lines are sent as user turns. Slash commands:
//! `/new [prompt]`, `/sources`, `/image <url>`, `/browse on|off`,
//! `/model <id>`, `/save <file>`, `/load <file>`, `/cost`, `/quit`.

use clap::Parser;
use parley_rs::api::ResponsesClient;
use parley_rs::citations::format_sources;
use parley_rs::config::ChatConfig;
use parley_rs::session::{ChatSession, RestoreOutcome};
use parley_rs::worker::{self, SessionEvent, SessionHandle};
use parley_rs::Attachment;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Chat with a remote model while keeping the history under a token budget.
///
/// Reads the API key from the OPENAI_API_KEY environment variable.
#[derive(Parser)]
#[command(name = "parley")]
struct Cli {
    /// JSON config file (missing file = defaults)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Non-browsing model (also used for summaries and tool fallback)
    #[arg(long)]
    model: Option<String>,

    /// Model that receives the web-search tool
    #[arg(long)]
    browse_model: Option<String>,

    /// Start with web browsing disabled
    #[arg(long)]
    no_browse: bool,

    /// Estimated-token ceiling before history is summarized
    #[arg(long)]
    budget: Option<usize>,

    /// System prompt
    #[arg(long)]
    system: Option<String>,

    /// List available chat models and exit
    #[arg(long)]
    list_models: bool,

    /// Debug logging on stderr (otherwise RUST_LOG, default warn)
    #[arg(long)]
    verbose: bool,
}

// ── REPL commands ──────────────────────────────────────────────────

#[derive(Debug, PartialEq)]
enum ReplCommand {
    Ask(String),
    New(Option<String>),
    Sources,
    Image(String),
    Browse(bool),
    Model(String),
    Save(PathBuf),
    Load(PathBuf),
    Cost,
    Quit,
    Empty,
    Unknown(String),
}

fn parse_line(line: &str) -> ReplCommand {
    let line = line.trim();
    if line.is_empty() {
        return ReplCommand::Empty;
    }
    let Some(rest) = line.strip_prefix('/') else {
        return ReplCommand::Ask(line.to_string());
    };
    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };
    match (name, arg) {
        ("new", "") => ReplCommand::New(None),
        ("new", prompt) => ReplCommand::New(Some(prompt.to_string())),
        ("sources", _) => ReplCommand::Sources,
        ("image", url) if !url.is_empty() => ReplCommand::Image(url.to_string()),
        ("browse", "on") => ReplCommand::Browse(true),
        ("browse", "off") => ReplCommand::Browse(false),
        ("model", id) if !id.is_empty() => ReplCommand::Model(id.to_string()),
        ("save", file) if !file.is_empty() => ReplCommand::Save(PathBuf::from(file)),
        ("load", file) if !file.is_empty() => ReplCommand::Load(PathBuf::from(file)),
        ("cost", _) => ReplCommand::Cost,
        ("quit" | "exit", _) => ReplCommand::Quit,
        _ => ReplCommand::Unknown(line.to_string()),
    }
}

/// Attachment name for an image reference: the last path segment.
fn attachment_for(url: &str) -> Attachment {
    let name = url
        .rsplit('/')
        .find(|s| !s.is_empty())
        .unwrap_or("image")
        .to_string();
    Attachment::new(name, url)
}

// ── Helpers ────────────────────────────────────────────────────────

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr))
        .init();
}

fn build_config(cli: &Cli) -> Result<ChatConfig, String> {
    let mut config = match &cli.config {
        Some(path) => ChatConfig::load(path).map_err(|e| e.to_string())?,
        None => ChatConfig::default(),
    };
    if let Some(model) = &cli.model {
        config = config.with_model(model);
    }
    if let Some(model) = &cli.browse_model {
        config = config.with_browse_model(model);
    }
    if cli.no_browse {
        config = config.with_browsing(false);
    }
    if let Some(budget) = cli.budget {
        config = config.with_token_budget(budget);
    }
    if let Some(system) = &cli.system {
        config = config.with_system_prompt(system);
    }
    Ok(config)
}

fn save_session(path: &Path, json: &str) -> Result<(), String> {
    let tmp_path = path.with_extension("tmp");
    std::fs::write(&tmp_path, json).map_err(|e| format!("Failed to write temp session: {e}"))?;
    std::fs::rename(&tmp_path, path).map_err(|e| format!("Failed to rename session: {e}"))?;
    Ok(())
}

fn prompt() {
    print!("> ");
    let _ = io::stdout().flush();
}

/// Wait for the outcome of the turn just queued.
async fn print_turn(handle: &mut SessionHandle) -> Option<Vec<String>> {
    match handle.next_event().await {
        Some(SessionEvent::Reply { text, sources }) => {
            println!("{text}");
            if !sources.is_empty() {
                println!("\n{}", format_sources(&sources));
            }
            Some(sources)
        }
        Some(SessionEvent::Failed { message }) => {
            println!("{message}");
            None
        }
        Some(SessionEvent::ResetDone) | None => None,
    }
}

async fn run_repl(mut handle: SessionHandle) -> Result<(), String> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut pending_images: Vec<Attachment> = Vec::new();
    let mut last_sources: Vec<String> = Vec::new();

    prompt();
    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| format!("failed to read stdin: {e}"))?
    {
        match parse_line(&line) {
            ReplCommand::Empty => {}
            ReplCommand::Ask(text) => {
                handle
                    .ask(text, std::mem::take(&mut pending_images))
                    .await?;
                if let Some(sources) = print_turn(&mut handle).await {
                    last_sources = sources;
                }
            }
            ReplCommand::New(system_prompt) => {
                handle.reset(system_prompt).await?;
                let _ = handle.next_event().await;
                pending_images.clear();
                last_sources.clear();
                println!("(new chat)");
            }
            ReplCommand::Sources => println!("{}", format_sources(&last_sources)),
            ReplCommand::Image(url) => {
                pending_images.push(attachment_for(&url));
                println!("(attached {} image(s) to the next turn)", pending_images.len());
            }
            ReplCommand::Browse(enabled) => {
                handle.set_browsing(enabled).await?;
                println!("(browsing {})", if enabled { "on" } else { "off" });
            }
            ReplCommand::Model(id) => {
                handle.set_model(id.clone()).await?;
                println!("(model {id})");
            }
            ReplCommand::Save(path) => {
                let snapshot = handle.snapshot().await?;
                let json = serde_json::to_string_pretty(&snapshot)
                    .map_err(|e| format!("Failed to serialize session: {e}"))?;
                match save_session(&path, &json) {
                    Ok(()) => println!("(saved {} message(s) to {})", snapshot.chat_log.len(), path.display()),
                    Err(e) => println!("[Error] {e}"),
                }
            }
            ReplCommand::Load(path) => match std::fs::read_to_string(&path) {
                Ok(json) => {
                    let payload = serde_json::from_str(&json).unwrap_or(serde_json::Value::Null);
                    match handle.restore(payload).await? {
                        RestoreOutcome::Restored { messages } => {
                            println!("(loaded {messages} message(s))")
                        }
                        RestoreOutcome::Rebuilt { reason } => {
                            println!("(session unreadable, started fresh: {reason})")
                        }
                    }
                    last_sources.clear();
                }
                Err(e) => println!("[Error] Failed to read {}: {e}", path.display()),
            },
            ReplCommand::Cost => println!("{}", handle.cost_summary().await?),
            ReplCommand::Quit => break,
            ReplCommand::Unknown(line) => println!("Unknown command: {line}"),
        }
        prompt();
    }

    handle.shutdown().await?;
    Ok(())
}

async fn run(cli: Cli) -> Result<(), String> {
    let config = build_config(&cli)?;
    let client = ResponsesClient::from_env(&config)?;

    if cli.list_models {
        for id in client.list_models().await? {
            println!("{id}");
        }
        return Ok(());
    }

    eprintln!(
        "parley: model={}, browse_model={}, browsing={}, budget={} tokens",
        config.model,
        config.browse_model,
        if config.browsing_enabled { "on" } else { "off" },
        config.token_budget
    );
    let session = ChatSession::new(Arc::new(client), config);
    run_repl(worker::spawn(session)).await
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
