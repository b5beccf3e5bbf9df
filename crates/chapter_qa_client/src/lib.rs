//! Shared book-chapter Q&A client library (config, HTTP protocol, answer
//! streaming, markdown rendering). Used by the Tauri GUI and the chapter-qa CLI.

pub mod client;
pub mod config;
pub mod history;
pub mod markdown;
pub mod messages;

pub use client::{AnswerStream, AnswerUpdate, AskError, FetchError, QaClient};
pub use config::{default_config_path, ChatSection, Config, ConfigError, ServerSection};
pub use history::{ChatSession, ConversationTurn, Role};
