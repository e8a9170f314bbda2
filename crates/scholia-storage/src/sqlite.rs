//! SQLite-backed conversation store.
//!
//! Wraps a single rusqlite Connection in a Mutex. WAL mode, messages stored
//! as a JSON column.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;
use uuid::Uuid;

use scholia_core::{Conversation, ConversationKind, Message};

use crate::store::{ConversationPatch, ConversationStore, StoreError};

/// Thread-safe SQLite [`ConversationStore`].
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a store at the given path.
    pub fn new(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Backend(format!("Failed to create data dir: {}", e)))?;
        }

        let conn = Connection::open(path)
            .map_err(|e| StoreError::Backend(format!("Failed to open database: {}", e)))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;",
        )
        .map_err(|e| StoreError::Backend(format!("Failed to set pragmas: {}", e)))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS conversations (
                id            TEXT PRIMARY KEY,
                kind          TEXT NOT NULL,
                name          TEXT NOT NULL,
                last_modified INTEGER NOT NULL,
                messages      TEXT NOT NULL
             )",
            [],
        )?;

        info!("Conversation store opened at {}", path.display());

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| StoreError::Backend(format!("connection lock poisoned: {}", e)))?;
        f(&conn)
    }
}

fn row_to_conversation(row: &rusqlite::Row<'_>) -> rusqlite::Result<(String, String, String, i64, String)> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
    ))
}

fn assemble(
    (id, kind, name, last_modified, messages): (String, String, String, i64, String),
) -> Result<Conversation, StoreError> {
    let messages: Vec<Message> = serde_json::from_str(&messages)?;
    let last_modified: DateTime<Utc> = Utc
        .timestamp_opt(last_modified, 0)
        .single()
        .ok_or_else(|| StoreError::Backend(format!("invalid timestamp: {}", last_modified)))?;
    Ok(Conversation {
        id,
        kind: ConversationKind::from(kind.as_str()),
        name,
        last_modified,
        messages,
    })
}

#[async_trait::async_trait]
impl ConversationStore for SqliteStore {
    async fn create(
        &self,
        kind: ConversationKind,
        name: String,
        messages: Vec<Message>,
    ) -> Result<Conversation, StoreError> {
        let conversation = Conversation {
            id: Uuid::new_v4().to_string(),
            kind,
            name,
            last_modified: Utc::now(),
            messages,
        };
        let encoded = serde_json::to_string(&conversation.messages)?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO conversations (id, kind, name, last_modified, messages)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    conversation.id,
                    conversation.kind.as_str(),
                    conversation.name,
                    conversation.last_modified.timestamp(),
                    encoded,
                ],
            )?;
            Ok(())
        })?;
        Ok(conversation)
    }

    async fn update(
        &self,
        id: &str,
        patch: ConversationPatch,
    ) -> Result<Conversation, StoreError> {
        let encoded = serde_json::to_string(&patch.messages)?;
        let changed = self.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE conversations SET kind = ?2, name = ?3, last_modified = ?4, messages = ?5
                 WHERE id = ?1",
                params![
                    id,
                    patch.kind.as_str(),
                    patch.name,
                    patch.last_modified.timestamp(),
                    encoded,
                ],
            )?)
        })?;
        if changed == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(Conversation {
            id: id.to_string(),
            kind: patch.kind,
            name: patch.name,
            last_modified: patch.last_modified,
            messages: patch.messages,
        })
    }

    async fn list(&self) -> Result<Vec<Conversation>, StoreError> {
        let rows = self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, kind, name, last_modified, messages
                 FROM conversations ORDER BY last_modified DESC",
            )?;
            let rows = stmt
                .query_map([], row_to_conversation)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })?;
        rows.into_iter().map(assemble).collect()
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Conversation>, StoreError> {
        let row = self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, kind, name, last_modified, messages
                 FROM conversations WHERE id = ?1",
            )?;
            Ok(stmt
                .query_row(params![id], row_to_conversation)
                .optional()?)
        })?;
        row.map(assemble).transpose()
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let changed =
            self.with_conn(|conn| Ok(conn.execute("DELETE FROM conversations WHERE id = ?1", params![id])?))?;
        if changed == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }
}
