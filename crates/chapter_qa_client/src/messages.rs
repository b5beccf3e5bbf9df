//! HTTP message types for the book-reader server endpoints. Client ↔ server JSON.

use serde::{Deserialize, Serialize};

use crate::history::ConversationTurn;

/// Client → server: body of `POST /ask`.
#[derive(Debug, Clone, Serialize)]
pub struct AskRequest<'a> {
    pub question: &'a str,
    pub chapter_content: &'a str,
    pub conversation_history: &'a [ConversationTurn],
}

/// Server → client: payload of one `data: ` record in a streamed answer.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamFragment {
    pub content: String,
}

/// Server → client: whole-answer JSON reply (non-streaming variant).
#[derive(Debug, Clone, PartialEq)]
pub enum AskResponse {
    Answer(String),
    Error(String),
}

impl AskResponse {
    pub fn from_json(value: &serde_json::Value) -> Result<Self, String> {
        if let Some(answer) = value.get("answer").and_then(|v| v.as_str()) {
            return Ok(AskResponse::Answer(answer.to_string()));
        }
        if let Some(error) = value.get("error").and_then(|v| v.as_str()) {
            return Ok(AskResponse::Error(error.to_string()));
        }
        Err("missing answer or error field".to_string())
    }
}
