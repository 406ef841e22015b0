//! Database module for Conductor
//!
//! Stores each thread's transcript so a later turn can resume it.

mod schema;

pub use schema::*;

use crate::state_machine::Message;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Invalid stored message: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Refusing to shrink thread {thread_id}: stored {stored} messages, got {given}")]
    HistoryShrank {
        thread_id: String,
        stored: usize,
        given: usize,
    },
}

pub type DbResult<T> = Result<T, DbError>;

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    #[allow(dead_code)] // Used in tests
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn run_migrations(&self) -> DbResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    // ==================== Thread Operations ====================

    /// List all threads, most recently updated first
    pub fn list_threads(&self) -> DbResult<Vec<ThreadSummary>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT t.id, t.title, t.created_at, t.updated_at,
                    (SELECT COUNT(*) FROM messages m WHERE m.thread_id = t.id) as message_count
             FROM threads t ORDER BY t.updated_at DESC",
        )?;

        let rows = stmt.query_map([], |row| {
            let count: i64 = row.get(4)?;
            Ok(ThreadSummary {
                thread_id: row.get(0)?,
                title: row.get(1)?,
                created_at: parse_datetime(&row.get::<_, String>(2)?),
                updated_at: parse_datetime(&row.get::<_, String>(3)?),
                message_count: usize::try_from(count).unwrap_or_default(),
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    // ==================== Message Operations ====================

    /// Full transcript of a thread in order; empty for an unknown thread
    pub fn load_messages(&self, thread_id: &str) -> DbResult<Vec<Message>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT payload FROM messages WHERE thread_id = ?1 ORDER BY sequence_id ASC",
        )?;

        let payloads = stmt
            .query_map(params![thread_id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        payloads
            .iter()
            .map(|p| serde_json::from_str(p).map_err(DbError::from))
            .collect()
    }

    /// Persist a thread's transcript.
    ///
    /// Transcripts only grow, so only messages past the stored count are
    /// inserted. All of them land in one transaction or none do.
    pub fn save_messages(&self, thread_id: &str, messages: &[Message]) -> DbResult<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let now = Utc::now().to_rfc3339();

        let stored: i64 = tx.query_row(
            "SELECT COUNT(*) FROM messages WHERE thread_id = ?1",
            params![thread_id],
            |row| row.get(0),
        )?;
        let stored = usize::try_from(stored).unwrap_or_default();
        if messages.len() < stored {
            return Err(DbError::HistoryShrank {
                thread_id: thread_id.to_string(),
                stored,
                given: messages.len(),
            });
        }

        let exists = tx
            .query_row(
                "SELECT 1 FROM threads WHERE id = ?1",
                params![thread_id],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if exists {
            tx.execute(
                "UPDATE threads SET updated_at = ?1 WHERE id = ?2",
                params![now, thread_id],
            )?;
        } else {
            tx.execute(
                "INSERT INTO threads (id, title, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
                params![thread_id, thread_title(messages), now],
            )?;
        }

        for (index, message) in messages.iter().enumerate().skip(stored) {
            let sequence_id = i64::try_from(index + 1).unwrap_or(i64::MAX);
            tx.execute(
                "INSERT INTO messages (thread_id, sequence_id, role, content, payload, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    thread_id,
                    sequence_id,
                    message.role.as_str(),
                    message.content,
                    serde_json::to_string(message)?,
                    now,
                ],
            )?;
        }

        tx.commit()?;
        tracing::debug!(
            thread_id,
            inserted = messages.len() - stored,
            total = messages.len(),
            "Saved thread"
        );
        Ok(())
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::{Role, ToolCall};
    use serde_json::json;

    #[test]
    fn test_unknown_thread_is_empty() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.load_messages("missing").unwrap().is_empty());
        assert!(db.list_threads().unwrap().is_empty());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let db = Database::open_in_memory().unwrap();
        let call = ToolCall::new("c1", "calculator", json!({"expression": "37593 * 67"}));
        let messages = vec![
            Message::human("what is 37593 * 67"),
            Message::ai_with_tool_calls("", vec![call.clone()]),
            Message::tool_result(&call, "2518731"),
            Message::tool_error(&call, "late failure"),
            Message::ai("2518731"),
        ];

        db.save_messages("t1", &messages).unwrap();
        assert_eq!(db.load_messages("t1").unwrap(), messages);
    }

    #[test]
    fn test_save_appends_only_new_messages() {
        let db = Database::open_in_memory().unwrap();
        let first = vec![Message::human("hi"), Message::ai("Hello!")];
        db.save_messages("t1", &first).unwrap();

        let mut second = first.clone();
        second.push(Message::human("bye"));
        second.push(Message::ai("Goodbye!"));
        db.save_messages("t1", &second).unwrap();
        // Saving the same transcript again is a no-op
        db.save_messages("t1", &second).unwrap();

        let loaded = db.load_messages("t1").unwrap();
        assert_eq!(loaded, second);
        assert_eq!(loaded[2].role, Role::Human);
    }

    #[test]
    fn test_save_refuses_to_shrink() {
        let db = Database::open_in_memory().unwrap();
        db.save_messages("t1", &[Message::human("a"), Message::ai("b")])
            .unwrap();
        let err = db.save_messages("t1", &[Message::human("a")]).unwrap_err();
        assert!(matches!(
            err,
            DbError::HistoryShrank {
                stored: 2,
                given: 1,
                ..
            }
        ));
        assert_eq!(db.load_messages("t1").unwrap().len(), 2);
    }

    #[test]
    fn test_threads_are_isolated() {
        let db = Database::open_in_memory().unwrap();
        db.save_messages("a", &[Message::human("alpha")]).unwrap();
        db.save_messages("b", &[Message::human("beta"), Message::ai("ok")])
            .unwrap();

        assert_eq!(db.load_messages("a").unwrap(), vec![Message::human("alpha")]);
        assert_eq!(db.load_messages("b").unwrap().len(), 2);
    }

    #[test]
    fn test_list_threads_summaries() {
        let db = Database::open_in_memory().unwrap();
        db.save_messages("old", &[Message::human("first question")])
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        db.save_messages("new", &[Message::human("second question"), Message::ai("answer")])
            .unwrap();

        let threads = db.list_threads().unwrap();
        assert_eq!(threads.len(), 2);
        assert_eq!(threads[0].thread_id, "new");
        assert_eq!(threads[0].title, "second question");
        assert_eq!(threads[0].message_count, 2);
        assert_eq!(threads[1].title, "first question");
    }

    #[test]
    fn test_reopen_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conductor.db");
        {
            let db = Database::open(&path).unwrap();
            db.save_messages("t1", &[Message::human("persist me")])
                .unwrap();
        }
        let db = Database::open(&path).unwrap();
        assert_eq!(
            db.load_messages("t1").unwrap(),
            vec![Message::human("persist me")]
        );
    }
}
