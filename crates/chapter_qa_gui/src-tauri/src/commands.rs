//! Tauri commands for config load/save, server connection management, and
//! the chat flow (book upload, chapter selection, questions, new chat).
//! The Tauri `#[command]` wrappers delegate to testable plain functions.

use chapter_qa_client::config::{self, ChatSection, Config, ServerSection};
use chapter_qa_client::{AskError, ChatSession, ConversationTurn, QaClient};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

// ── Global runtime and connection state (single connection for the GUI) ─
use std::sync::OnceLock;

fn global_runtime() -> &'static tokio::runtime::Runtime {
    static RT: OnceLock<tokio::runtime::Runtime> = OnceLock::new();
    RT.get_or_init(|| {
        tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .expect("failed to create tokio runtime")
    })
}

/// Connected server plus the window's chat state.
struct Connection {
    client: QaClient,
    session: ChatSession,
    chapter_content: Option<String>,
}

static CONNECTION: Mutex<Option<Connection>> = Mutex::new(None);

/// Shown in place of any internal error detail (the cause goes to the log).
const APOLOGY: &str = "Sorry, I encountered an error while processing your question.";

/// JSON-friendly config form values sent to/from the frontend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConfigForm {
    pub base_url: String,
    pub csrf_token: String,
    pub streaming: bool,
    pub idle_timeout_secs: u64,
    pub send_pending_turn: bool,
}

impl Default for ConfigForm {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5000".into(),
            csrf_token: String::new(),
            streaming: true,
            idle_timeout_secs: 60,
            send_pending_turn: false,
        }
    }
}

impl From<Config> for ConfigForm {
    fn from(c: Config) -> Self {
        let defaults = ConfigForm::default();
        Self {
            base_url: c.server.base_url.unwrap_or(defaults.base_url),
            csrf_token: c.server.csrf_token.unwrap_or_default(),
            streaming: c.server.streaming.unwrap_or(defaults.streaming),
            idle_timeout_secs: c
                .server
                .idle_timeout_secs
                .unwrap_or(defaults.idle_timeout_secs),
            send_pending_turn: c
                .chat
                .send_pending_turn
                .unwrap_or(defaults.send_pending_turn),
        }
    }
}

impl From<ConfigForm> for Config {
    fn from(f: ConfigForm) -> Self {
        Config {
            server: ServerSection {
                base_url: Some(f.base_url),
                csrf_token: Some(f.csrf_token),
                streaming: Some(f.streaming),
                idle_timeout_secs: Some(f.idle_timeout_secs),
            },
            chat: ChatSection {
                send_pending_turn: Some(f.send_pending_turn),
            },
        }
    }
}

/// Resolve config path from optional override, env, or default.
pub fn resolve_config_path(override_path: Option<&str>) -> Result<PathBuf, String> {
    if let Some(p) = override_path {
        return Ok(PathBuf::from(p));
    }
    if let Ok(val) = std::env::var("CHAPTER_QA_CONFIG") {
        return Ok(PathBuf::from(val));
    }
    config::default_config_path().ok_or_else(|| "Cannot determine config path".into())
}

// ── Testable backend functions ──────────────────────────────────────────

/// Load config from `path` and return form values.
pub fn do_load_config(path: &str) -> Result<ConfigForm, String> {
    let cfg = config::load(std::path::Path::new(path)).map_err(|e| e.to_string())?;
    Ok(ConfigForm::from(cfg))
}

/// Save form values to `path` as YAML. Creates parent dirs if needed.
pub fn do_save_config(path: &str, form: &ConfigForm) -> Result<(), String> {
    let cfg: Config = form.clone().into();
    config::save(std::path::Path::new(path), &cfg).map_err(|e| e.to_string())
}

// ── Connection status ───────────────────────────────────────────────

/// Connection status returned to the frontend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionStatus {
    /// "connected", "disconnected", or "error"
    pub state: String,
    /// Error message when state is "error" or "disconnected".
    pub message: Option<String>,
}

/// Build a client from `form` and probe the server's root page.
/// Returns a `ConnectionStatus` (never an Err; failure is reported in the status).
pub fn do_connect(form: &ConfigForm) -> Result<ConnectionStatus, String> {
    let client = match QaClient::new(&form.base_url, &form.csrf_token) {
        Ok(c) => c
            .with_streaming(form.streaming)
            .with_idle_timeout(Duration::from_secs(form.idle_timeout_secs))
            .with_pending_turn(form.send_pending_turn),
        Err(e) => {
            return Ok(ConnectionStatus {
                state: "error".into(),
                message: Some(e.to_string()),
            })
        }
    };

    let rt = global_runtime();
    match rt.block_on(client.probe()) {
        Ok(()) => {
            let mut guard = CONNECTION.lock().map_err(|e| e.to_string())?;
            *guard = Some(Connection {
                client,
                session: ChatSession::new(),
                chapter_content: None,
            });
            Ok(ConnectionStatus {
                state: "connected".into(),
                message: None,
            })
        }
        Err(e) => Ok(ConnectionStatus {
            state: "disconnected".into(),
            message: Some(e.to_string()),
        }),
    }
}

/// Drop the current connection (if any). Safe to call when not connected.
pub fn do_disconnect() {
    if let Ok(mut guard) = CONNECTION.lock() {
        *guard = None;
    }
}

/// Check if a connection is currently held.
pub fn is_connected() -> bool {
    CONNECTION.lock().map(|g| g.is_some()).unwrap_or(false)
}

// ── Book upload and chapter selection ───────────────────────────────────

/// Upload a book file; returns the server-rendered page HTML with the
/// refreshed chapter list.
pub fn do_upload_book(path: &str) -> Result<String, String> {
    let mut guard = CONNECTION.lock().map_err(|e| e.to_string())?;
    let conn = guard.as_mut().ok_or("Not connected")?;

    let rt = global_runtime();
    rt.block_on(conn.client.upload_book(std::path::Path::new(path)))
        .map_err(|e| e.to_string())
}

/// Fetch chapter `index`; stores it as the active chapter and clears the
/// conversation log for the new chapter.
pub fn do_select_chapter(index: usize) -> Result<String, String> {
    let mut guard = CONNECTION.lock().map_err(|e| e.to_string())?;
    let conn = guard.as_mut().ok_or("Not connected")?;

    let rt = global_runtime();
    let content = rt
        .block_on(conn.client.select_chapter(&mut conn.session, index))
        .map_err(|e| e.to_string())?;
    conn.chapter_content = Some(content.clone());
    Ok(content)
}

// ── Chat ─────────────────────────────────────────────────────────────────

/// Result of one question returned to the frontend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatReply {
    /// Full answer text (all stream fragments concatenated).
    pub answer: String,
    /// The answer rendered as safe HTML for display.
    pub rendered: String,
    /// User-facing message when the question failed.
    pub error: Option<String>,
}

/// Ask a question about the active chapter, driving the answer stream to
/// completion. An empty question is a silent no-op; failures return the
/// generic apology message while the cause goes to the log.
pub fn do_ask(question: &str) -> Result<ChatReply, String> {
    let mut guard = CONNECTION.lock().map_err(|e| e.to_string())?;
    let conn = guard.as_mut().ok_or("Not connected")?;
    let content = conn
        .chapter_content
        .clone()
        .ok_or("No chapter selected")?;

    let rt = global_runtime();
    let result = rt.block_on(async {
        let mut stream = conn.client.ask(&mut conn.session, question, &content).await?;
        let mut rendered = String::new();
        while let Some(update) = stream.next().await? {
            rendered = update.rendered;
        }
        Ok::<(String, String), AskError>((stream.answer().to_string(), rendered))
    });

    match result {
        Ok((answer, rendered)) => Ok(ChatReply {
            answer,
            rendered,
            error: None,
        }),
        Err(AskError::EmptyQuestion) => Ok(ChatReply {
            answer: String::new(),
            rendered: String::new(),
            error: None,
        }),
        Err(e) => {
            tracing::warn!("question failed: {}", e);
            Ok(ChatReply {
                answer: String::new(),
                rendered: String::new(),
                error: Some(APOLOGY.to_string()),
            })
        }
    }
}

/// Clear the conversation log ("new chat"). Keeps the active chapter.
pub fn do_new_chat() -> Result<(), String> {
    let mut guard = CONNECTION.lock().map_err(|e| e.to_string())?;
    if let Some(conn) = guard.as_mut() {
        conn.session.reset();
    }
    Ok(())
}

/// The current conversation log, for the frontend to render.
pub fn do_conversation_log() -> Result<Vec<ConversationTurn>, String> {
    let guard = CONNECTION.lock().map_err(|e| e.to_string())?;
    Ok(guard
        .as_ref()
        .map(|conn| conn.session.turns().to_vec())
        .unwrap_or_default())
}

// ── Tauri command wrappers ──────────────────────────────────────────────

#[tauri::command]
pub fn get_config_path() -> Result<String, String> {
    let p = resolve_config_path(None)?;
    p.to_str()
        .map(|s| s.to_string())
        .ok_or_else(|| "Config path is not valid UTF-8".into())
}

#[tauri::command]
pub fn load_config(path: String) -> Result<ConfigForm, String> {
    do_load_config(&path)
}

#[tauri::command]
pub fn save_config(path: String, form: ConfigForm) -> Result<(), String> {
    do_save_config(&path, &form)
}

#[tauri::command]
pub fn connect_server(form: ConfigForm) -> Result<ConnectionStatus, String> {
    do_connect(&form)
}

#[tauri::command]
pub fn disconnect_server() -> Result<(), String> {
    do_disconnect();
    Ok(())
}

#[tauri::command]
pub fn connection_status() -> ConnectionStatus {
    if is_connected() {
        ConnectionStatus {
            state: "connected".into(),
            message: None,
        }
    } else {
        ConnectionStatus {
            state: "disconnected".into(),
            message: None,
        }
    }
}

#[tauri::command]
pub fn upload_book(path: String) -> Result<String, String> {
    do_upload_book(&path)
}

#[tauri::command]
pub fn select_chapter(index: usize) -> Result<String, String> {
    do_select_chapter(index)
}

#[tauri::command]
pub fn ask_question(question: String) -> Result<ChatReply, String> {
    do_ask(&question)
}

#[tauri::command]
pub fn new_chat() -> Result<(), String> {
    do_new_chat()
}

#[tauri::command]
pub fn conversation_log() -> Result<Vec<ConversationTurn>, String> {
    do_conversation_log()
}
