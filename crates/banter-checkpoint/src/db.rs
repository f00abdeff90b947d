use std::sync::Mutex;

use async_trait::async_trait;
use rusqlite::Connection;
use tracing::instrument;

use crate::error::{CheckpointError, Result};
use crate::store::CheckpointStore;
use crate::types::{estimate_tokens, Checkpoint, CheckpointMessage};

/// Initialise checkpoint tables. Safe to call on every startup (idempotent).
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS checkpoints (
            thread_id   TEXT PRIMARY KEY,
            summary     TEXT,
            token_count INTEGER NOT NULL DEFAULT 0,
            updated_at  TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS checkpoint_messages (
            id        INTEGER PRIMARY KEY AUTOINCREMENT,
            thread_id TEXT NOT NULL,
            role      TEXT NOT NULL,
            content   TEXT NOT NULL,
            timestamp TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_cp_messages_thread
            ON checkpoint_messages(thread_id, id);",
    )
}

/// SQLite-backed checkpoint store.
///
/// The connection `Mutex` doubles as the per-thread append serializer:
/// an `append` reads the row, inserts the message, and bumps the token
/// count under a single lock hold.
pub struct SqliteCheckpointStore {
    db: Mutex<Connection>,
}

impl SqliteCheckpointStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            db: Mutex::new(conn),
        }
    }

    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        init_db(&conn)?;
        Ok(Self::new(conn))
    }
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    #[instrument(skip(self))]
    async fn load(&self, thread_id: &str) -> Result<Option<Checkpoint>> {
        let db = self.db.lock().unwrap();

        let head: Option<(Option<String>, i64)> = match db.query_row(
            "SELECT summary, token_count FROM checkpoints WHERE thread_id = ?1",
            rusqlite::params![thread_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        ) {
            Ok(h) => Some(h),
            Err(rusqlite::Error::QueryReturnedNoRows) => None,
            Err(e) => return Err(CheckpointError::Database(e)),
        };

        let Some((summary, token_count)) = head else {
            return Ok(None);
        };

        let mut stmt = db.prepare(
            "SELECT role, content, timestamp FROM checkpoint_messages
             WHERE thread_id = ?1 ORDER BY id",
        )?;
        let messages = stmt
            .query_map(rusqlite::params![thread_id], |row| {
                Ok(CheckpointMessage {
                    role: row.get(0)?,
                    content: row.get(1)?,
                    timestamp: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(Some(Checkpoint {
            thread_id: thread_id.to_string(),
            messages,
            summary,
            token_count: token_count as u32,
        }))
    }

    #[instrument(skip(self, message))]
    async fn append(&self, thread_id: &str, message: CheckpointMessage) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        let tokens = estimate_tokens(&message.content);
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO checkpoints (thread_id, summary, token_count, updated_at)
             VALUES (?1, NULL, ?2, ?3)
             ON CONFLICT (thread_id)
             DO UPDATE SET token_count = token_count + ?2, updated_at = ?3",
            rusqlite::params![thread_id, tokens as i64, now],
        )?;
        db.execute(
            "INSERT INTO checkpoint_messages (thread_id, role, content, timestamp)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![thread_id, message.role, message.content, message.timestamp],
        )?;
        Ok(())
    }

    #[instrument(skip(self, checkpoint), fields(thread_id = %checkpoint.thread_id))]
    async fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO checkpoints (thread_id, summary, token_count, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (thread_id)
             DO UPDATE SET summary = ?2, token_count = ?3, updated_at = ?4",
            rusqlite::params![
                checkpoint.thread_id,
                checkpoint.summary,
                checkpoint.token_count as i64,
                now
            ],
        )?;
        // Replace the message window wholesale — `save` is the
        // summarization path, which truncates the prefix.
        db.execute(
            "DELETE FROM checkpoint_messages WHERE thread_id = ?1",
            rusqlite::params![checkpoint.thread_id],
        )?;
        for m in &checkpoint.messages {
            db.execute(
                "INSERT INTO checkpoint_messages (thread_id, role, content, timestamp)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![checkpoint.thread_id, m.role, m.content, m.timestamp],
            )?;
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, thread_id: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "DELETE FROM checkpoint_messages WHERE thread_id = ?1",
            rusqlite::params![thread_id],
        )?;
        db.execute(
            "DELETE FROM checkpoints WHERE thread_id = ?1",
            rusqlite::params![thread_id],
        )?;
        Ok(())
    }
}
