//! Database schema and types

use crate::state_machine::{Message, Role};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// SQL schema for initialization
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS threads (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_threads_updated ON threads(updated_at DESC);

CREATE TABLE IF NOT EXISTS messages (
    thread_id TEXT NOT NULL,
    sequence_id INTEGER NOT NULL,
    role TEXT NOT NULL,
    content TEXT NOT NULL,
    payload TEXT NOT NULL,
    created_at TEXT NOT NULL,

    PRIMARY KEY (thread_id, sequence_id),
    FOREIGN KEY (thread_id) REFERENCES threads(id) ON DELETE CASCADE
);
";

/// Longest title kept for a thread listing
pub const MAX_TITLE_CHARS: usize = 100;

/// One row of the thread listing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThreadSummary {
    pub thread_id: String,
    /// The first human query of the thread
    pub title: String,
    pub message_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Title shown for a thread: its first human message, shortened
pub fn thread_title(messages: &[Message]) -> String {
    messages
        .iter()
        .find(|m| m.role == Role::Human)
        .map(|m| m.content.trim().chars().take(MAX_TITLE_CHARS).collect())
        .unwrap_or_default()
}
