//! HTTP client for the book-reader server: ask a question about the current
//! chapter and consume the streamed answer, plus chapter fetch and book upload.
//!
//! `POST /ask` has two server variants: a server-sent-events body of
//! `data: {"content": ...}` records, and a single JSON `{"answer": ...}`
//! reply. Both are exposed through [`QaClient::ask`] as one [`AnswerStream`];
//! the `streaming` capability flag selects the wire format.

use std::path::Path;
use std::time::Duration;

use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use tracing::warn;

use crate::config::Config;
use crate::history::ChatSession;
use crate::markdown;
use crate::messages::{AskRequest, AskResponse, StreamFragment};

/// SSE record marker; lines without it are ignored.
const DATA_PREFIX: &str = "data: ";

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:5000";
const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 60;

/// Error from [`QaClient::ask`] or the answer stream.
#[derive(Debug, thiserror::Error)]
pub enum AskError {
    #[error("question is empty")]
    EmptyQuestion,
    #[error("missing CSRF token")]
    MissingCsrfToken,
    #[error("network error: {0}")]
    Network(String),
    #[error("server returned HTTP {0}")]
    HttpStatus(u16),
    #[error("server error: {0}")]
    Server(String),
    #[error("answer stream interrupted: {0}")]
    StreamInterrupted(String),
}

/// Error from chapter fetch or book upload.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("server returned HTTP {0}")]
    HttpStatus(u16),
}

/// Client for one book-reader server.
#[derive(Debug, Clone)]
pub struct QaClient {
    http: reqwest::Client,
    base_url: String,
    csrf_token: String,
    streaming: bool,
    send_pending_turn: bool,
    idle_timeout: Duration,
}

impl QaClient {
    /// Build a client for the server at `base_url` (e.g. `http://127.0.0.1:5000`).
    /// `csrf_token` is the per-page token the server expects on every POST;
    /// an empty token is rejected here, before anything is sent.
    pub fn new(base_url: &str, csrf_token: &str) -> Result<Self, AskError> {
        if csrf_token.trim().is_empty() {
            return Err(AskError::MissingCsrfToken);
        }
        Ok(Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            csrf_token: csrf_token.to_string(),
            streaming: true,
            send_pending_turn: false,
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
        })
    }

    /// Build a client from a loaded [`Config`], applying defaults for any
    /// missing fields.
    pub fn from_config(cfg: &Config) -> Result<Self, AskError> {
        let base_url = cfg.server.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
        let csrf_token = cfg.server.csrf_token.as_deref().unwrap_or("");
        Ok(Self::new(base_url, csrf_token)?
            .with_streaming(cfg.server.streaming.unwrap_or(true))
            .with_idle_timeout(Duration::from_secs(
                cfg.server.idle_timeout_secs.unwrap_or(DEFAULT_IDLE_TIMEOUT_SECS),
            ))
            .with_pending_turn(cfg.chat.send_pending_turn.unwrap_or(false)))
    }

    /// Select between the SSE variant of `/ask` (true, default) and the
    /// whole-answer JSON variant (false).
    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    /// Include the just-asked question as the final `conversation_history`
    /// entry in the request body. Off by default: the server appends the
    /// question from the `question` field itself.
    pub fn with_pending_turn(mut self, send: bool) -> Self {
        self.send_pending_turn = send;
        self
    }

    /// Fail the stream with `StreamInterrupted` when no data arrives for
    /// `timeout`, instead of hanging.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Send `question` about `chapter_content` and return the answer stream.
    ///
    /// The user turn is recorded in `session` before the request goes out, so
    /// a failed request keeps the question in the log. The assistant turn is
    /// recorded only when the stream completes cleanly. An empty question is
    /// rejected without touching the session or the network.
    pub async fn ask<'a>(
        &self,
        session: &'a mut ChatSession,
        question: &str,
        chapter_content: &str,
    ) -> Result<AnswerStream<'a>, AskError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(AskError::EmptyQuestion);
        }

        session.push_user(question);

        // The pending user turn is excluded from the history context unless
        // the server expects it inside `conversation_history` as well.
        let turns = session.turns();
        let history = if self.send_pending_turn {
            turns
        } else {
            &turns[..turns.len() - 1]
        };

        let request = AskRequest {
            question,
            chapter_content,
            conversation_history: history,
        };

        let response = self
            .http
            .post(format!("{}/ask", self.base_url))
            .header("X-Requested-With", "XMLHttpRequest")
            .header("X-CSRFToken", &self.csrf_token)
            .json(&request)
            .send()
            .await
            .map_err(|e| AskError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AskError::HttpStatus(response.status().as_u16()));
        }

        let body = if self.streaming {
            Body::Sse(
                response
                    .bytes_stream()
                    .map(|chunk| chunk.map(|bytes| String::from_utf8_lossy(&bytes).into_owned()))
                    .boxed(),
            )
        } else {
            Body::Whole(Some(response))
        };

        Ok(AnswerStream {
            session,
            body,
            buffer: String::new(),
            answer: String::new(),
            idle_timeout: self.idle_timeout,
            eof: false,
            done: false,
        })
    }

    /// Fetch the HTML fragment for chapter `index` and clear the session's
    /// conversation log for the new chapter. The log is only cleared when the
    /// fetch succeeds; clearing is idempotent.
    pub async fn select_chapter(
        &self,
        session: &mut ChatSession,
        index: usize,
    ) -> Result<String, FetchError> {
        let response = self
            .http
            .get(format!("{}/chapter/{}", self.base_url, index))
            .header("X-Requested-With", "XMLHttpRequest")
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(FetchError::HttpStatus(response.status().as_u16()));
        }

        let content = response
            .text()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;
        session.reset();
        Ok(content)
    }

    /// Upload a book file and return the server-rendered page HTML carrying
    /// the refreshed chapter list.
    pub async fn upload_book(&self, path: &Path) -> Result<String, FetchError> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("book.epub")
            .to_string();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| FetchError::Io(e.to_string()))?;

        let form = reqwest::multipart::Form::new()
            .text("csrf_token", self.csrf_token.clone())
            .part(
                "file",
                reqwest::multipart::Part::bytes(bytes).file_name(file_name),
            );

        let response = self
            .http
            .post(format!("{}/", self.base_url))
            .header("X-Requested-With", "XMLHttpRequest")
            .multipart(form)
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(FetchError::HttpStatus(response.status().as_u16()));
        }

        response
            .text()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))
    }

    /// Reachability check: `GET /` on the server.
    pub async fn probe(&self) -> Result<(), FetchError> {
        let response = self
            .http
            .get(format!("{}/", self.base_url))
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;
        if !response.status().is_success() {
            return Err(FetchError::HttpStatus(response.status().as_u16()));
        }
        Ok(())
    }
}

enum Body {
    /// Incremental SSE body, decoded to text chunk by chunk.
    Sse(BoxStream<'static, Result<String, reqwest::Error>>),
    /// Whole-answer JSON reply, consumed in one read.
    Whole(Option<reqwest::Response>),
}

/// One incremental update from the answer stream.
#[derive(Debug, Clone, PartialEq)]
pub struct AnswerUpdate {
    /// The newly arrived piece of answer text.
    pub fragment: String,
    /// The full answer so far, rendered as safe HTML.
    pub rendered: String,
}

/// In-flight answer to one question.
///
/// Call [`AnswerStream::next`] until it returns `Ok(None)`; each `Some`
/// carries the new fragment and the re-rendered cumulative answer. The
/// stream borrows the session for its whole lifetime, so no second question
/// can be issued on the same session while one is streaming. Dropping the
/// stream aborts the request without recording an assistant turn.
pub struct AnswerStream<'a> {
    session: &'a mut ChatSession,
    body: Body,
    buffer: String,
    answer: String,
    idle_timeout: Duration,
    eof: bool,
    done: bool,
}

impl AnswerStream<'_> {
    /// Next update, or `Ok(None)` when the answer is complete.
    ///
    /// On clean completion the full answer is recorded as an assistant turn
    /// in the session. A transport failure or stall mid-stream yields
    /// `StreamInterrupted` and records nothing.
    pub async fn next(&mut self) -> Result<Option<AnswerUpdate>, AskError> {
        if self.done {
            return Ok(None);
        }
        loop {
            if let Some(fragment) = self.next_buffered_fragment() {
                self.answer.push_str(&fragment);
                return Ok(Some(AnswerUpdate {
                    rendered: markdown::render(&self.answer),
                    fragment,
                }));
            }

            if self.eof {
                self.finish();
                return Ok(None);
            }

            match &mut self.body {
                Body::Sse(stream) => {
                    let chunk = tokio::time::timeout(self.idle_timeout, stream.next())
                        .await
                        .map_err(|_| {
                            AskError::StreamInterrupted("idle timeout".to_string())
                        })?;
                    match chunk {
                        Some(Ok(text)) => self.buffer.push_str(&text),
                        Some(Err(e)) => {
                            return Err(AskError::StreamInterrupted(e.to_string()));
                        }
                        None => {
                            self.eof = true;
                            // Terminate a trailing record the server did not
                            // newline-delimit before closing.
                            if !self.buffer.is_empty() && !self.buffer.ends_with('\n') {
                                self.buffer.push('\n');
                            }
                        }
                    }
                }
                Body::Whole(response) => {
                    let Some(response) = response.take() else {
                        self.finish();
                        return Ok(None);
                    };
                    let text = response
                        .text()
                        .await
                        .map_err(|e| AskError::Network(e.to_string()))?;
                    let value: serde_json::Value = serde_json::from_str(&text)
                        .map_err(|e| AskError::Server(format!("malformed answer payload: {}", e)))?;
                    match AskResponse::from_json(&value) {
                        Ok(AskResponse::Answer(answer)) => {
                            self.answer = answer;
                            let update = AnswerUpdate {
                                fragment: self.answer.clone(),
                                rendered: markdown::render(&self.answer),
                            };
                            self.finish();
                            return Ok(Some(update));
                        }
                        Ok(AskResponse::Error(message)) => {
                            self.done = true;
                            return Err(AskError::Server(message));
                        }
                        Err(e) => {
                            self.done = true;
                            return Err(AskError::Server(e));
                        }
                    }
                }
            }
        }
    }

    /// The cumulative answer text received so far.
    pub fn answer(&self) -> &str {
        &self.answer
    }

    /// Pop the next parseable `data: ` record out of the line buffer.
    /// Malformed records are logged and skipped; unmarked lines are ignored.
    fn next_buffered_fragment(&mut self) -> Option<String> {
        while let Some(line_end) = self.buffer.find('\n') {
            let line = self.buffer[..line_end].trim().to_string();
            self.buffer.drain(..=line_end);

            let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
                continue;
            };
            match serde_json::from_str::<StreamFragment>(payload) {
                Ok(fragment) => return Some(fragment.content),
                Err(e) => warn!("skipping malformed answer record ({}): {}", e, line),
            }
        }
        None
    }

    fn finish(&mut self) {
        self.done = true;
        self.session.push_assistant(&self.answer);
    }
}
