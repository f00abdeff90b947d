use std::sync::Mutex;

use async_trait::async_trait;
use rusqlite::Connection;
use tracing::{debug, instrument};

use crate::error::{Result, SessionError};
use crate::store::SessionStore;
use crate::types::{Session, SessionKey};

/// Initialise the sessions table. Safe to call on every startup (idempotent).
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS sessions (
            tenant_id    TEXT NOT NULL,
            channel      TEXT NOT NULL,
            user_id      TEXT NOT NULL,
            session_json TEXT NOT NULL,
            PRIMARY KEY (tenant_id, channel, user_id)
        );",
    )
}

/// SQLite-backed session store.
///
/// Wraps a single connection in a `Mutex`. The primary key on the tuple
/// plus `INSERT OR IGNORE` + read-back gives atomic get-or-create even
/// when two tasks race on the same key.
pub struct SqliteSessionStore {
    db: Mutex<Connection>,
}

impl SqliteSessionStore {
    /// Wrap an already-open (and `init_db`-initialised) connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            db: Mutex::new(conn),
        }
    }

    /// Open the database file, initialise the schema, and wrap it.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        init_db(&conn)?;
        Ok(Self::new(conn))
    }

    fn load(&self, key: &SessionKey) -> Result<Option<Session>> {
        let db = self.db.lock().unwrap();
        match db.query_row(
            "SELECT session_json FROM sessions
             WHERE tenant_id = ?1 AND channel = ?2 AND user_id = ?3",
            rusqlite::params![key.tenant_id, key.channel, key.user_external_id],
            |row| row.get::<_, String>(0),
        ) {
            Ok(json) => Ok(Some(serde_json::from_str(&json)?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(SessionError::Database(e)),
        }
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    #[instrument(skip(self), fields(key = %key))]
    async fn get_or_create(&self, key: &SessionKey) -> Result<Session> {
        // Fast path: session already exists.
        if let Some(session) = self.load(key)? {
            debug!("session cache hit");
            return Ok(session);
        }

        let fresh = Session::create(key);
        let json = serde_json::to_string(&fresh)?;
        {
            let db = self.db.lock().unwrap();
            db.execute(
                "INSERT OR IGNORE INTO sessions (tenant_id, channel, user_id, session_json)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![key.tenant_id, key.channel, key.user_external_id, json],
            )?;
        }

        // Read back — handles the race where two tasks insert simultaneously.
        self.load(key)?.ok_or_else(|| SessionError::NotFound {
            key: key.format(),
        })
    }

    #[instrument(skip(self), fields(key = %key))]
    async fn get(&self, key: &SessionKey) -> Result<Option<Session>> {
        self.load(key)
    }

    async fn save(&self, session: &Session) -> Result<()> {
        let key = session.key().ok_or_else(|| {
            SessionError::InvalidKey("session metadata lacks channel/user_id".into())
        })?;
        let json = serde_json::to_string(session)?;
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO sessions (tenant_id, channel, user_id, session_json)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (tenant_id, channel, user_id)
             DO UPDATE SET session_json = excluded.session_json",
            rusqlite::params![key.tenant_id, key.channel, key.user_external_id, json],
        )?;
        Ok(())
    }

    #[instrument(skip(self), fields(key = %key))]
    async fn delete(&self, key: &SessionKey) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "DELETE FROM sessions WHERE tenant_id = ?1 AND channel = ?2 AND user_id = ?3",
            rusqlite::params![key.tenant_id, key.channel, key.user_external_id],
        )?;
        Ok(())
    }
}
