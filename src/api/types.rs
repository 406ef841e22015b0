//! API request and response types

use crate::db::ThreadSummary;
use crate::state_machine::{Message, Role};
use serde::{Deserialize, Serialize};

/// Query string of the chat stream
#[derive(Debug, Default, Deserialize)]
pub struct ChatStreamQuery {
    /// Continue this thread; a new one is started when absent
    pub thread_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HomeResponse {
    pub message: &'static str,
    pub documentation: &'static str,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub message: &'static str,
    pub version: &'static str,
}

/// Response with a list of threads
#[derive(Debug, Serialize)]
pub struct ThreadListResponse {
    pub threads: Vec<ThreadSummary>,
}

/// One entry of a thread's visible history
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub content: String,
}

impl HistoryEntry {
    /// Only the human and assistant text a reader would see. Tool traffic
    /// and empty tool-request messages are left out.
    pub fn visible(messages: Vec<Message>) -> Vec<Self> {
        messages
            .into_iter()
            .filter(|m| matches!(m.role, Role::Human | Role::Ai) && !m.content.is_empty())
            .map(|m| Self {
                role: m.role,
                content: m.content,
            })
            .collect()
    }
}

/// Response with one thread's history
#[derive(Debug, Serialize)]
pub struct ThreadMessagesResponse {
    pub thread_id: String,
    pub messages: Vec<HistoryEntry>,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
