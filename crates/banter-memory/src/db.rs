use std::sync::Mutex;

use async_trait::async_trait;
use rusqlite::Connection;
use tracing::instrument;

use crate::error::{MemoryError, Result};
use crate::store::MemoryStore;
use crate::types::{
    join_namespace, split_namespace, value_matches_filter, MemoryItem, SearchQuery,
    NAMESPACE_SEPARATOR,
};

/// Initialise the memory table. Safe to call on every startup (idempotent).
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS memory_items (
            namespace  TEXT NOT NULL,
            key        TEXT NOT NULL,
            value_json TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (namespace, key)
        );
        CREATE INDEX IF NOT EXISTS idx_memory_namespace
            ON memory_items(namespace);",
    )
}

/// SQLite-backed memory store. Namespaces are flattened to a single
/// indexed column; prefix search uses `LIKE prefix || '/%'` which the
/// index can serve.
pub struct SqliteMemoryStore {
    db: Mutex<Connection>,
}

impl SqliteMemoryStore {
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

fn check_namespace(namespace: &[String]) -> Result<String> {
    if namespace.is_empty() {
        return Err(MemoryError::InvalidNamespace("namespace is empty".into()));
    }
    if namespace
        .iter()
        .any(|c| c.is_empty() || c.contains(NAMESPACE_SEPARATOR))
    {
        return Err(MemoryError::InvalidNamespace(format!(
            "components must be non-empty and must not contain '{}'",
            NAMESPACE_SEPARATOR
        )));
    }
    Ok(join_namespace(namespace))
}

#[async_trait]
impl MemoryStore for SqliteMemoryStore {
    #[instrument(skip(self, value), fields(namespace = ?namespace, key))]
    async fn put(&self, namespace: &[String], key: &str, value: serde_json::Value) -> Result<()> {
        let ns = check_namespace(namespace)?;
        let now = chrono::Utc::now().to_rfc3339();
        let json = serde_json::to_string(&value)?;
        let db = self.db.lock().unwrap();
        // Upsert preserves created_at on replacement.
        db.execute(
            "INSERT INTO memory_items (namespace, key, value_json, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT (namespace, key)
             DO UPDATE SET value_json = ?3, updated_at = ?4",
            rusqlite::params![ns, key, json, now],
        )?;
        Ok(())
    }

    async fn get(&self, namespace: &[String], key: &str) -> Result<Option<MemoryItem>> {
        let ns = check_namespace(namespace)?;
        let db = self.db.lock().unwrap();
        match db.query_row(
            "SELECT value_json, created_at, updated_at FROM memory_items
             WHERE namespace = ?1 AND key = ?2",
            rusqlite::params![ns, key],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            },
        ) {
            Ok((json, created_at, updated_at)) => Ok(Some(MemoryItem {
                namespace: namespace.to_vec(),
                key: key.to_string(),
                value: serde_json::from_str(&json)?,
                created_at,
                updated_at,
            })),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(MemoryError::Database(e)),
        }
    }

    #[instrument(skip(self, query), fields(namespace = ?query.namespace, limit = query.limit))]
    async fn search(&self, query: &SearchQuery) -> Result<Vec<MemoryItem>> {
        let ns = check_namespace(&query.namespace)?;
        let prefix = format!("{}{}%", ns, NAMESPACE_SEPARATOR);
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT namespace, key, value_json, created_at, updated_at FROM memory_items
             WHERE namespace = ?1 OR namespace LIKE ?2
             ORDER BY updated_at DESC",
        )?;
        let rows = stmt
            .query_map(rusqlite::params![ns, prefix], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut items = Vec::new();
        for (ns_col, key, json, created_at, updated_at) in rows {
            let value: serde_json::Value = serde_json::from_str(&json)?;
            if let Some(filter) = &query.filter {
                if !value_matches_filter(&value, filter) {
                    continue;
                }
            }
            items.push(MemoryItem {
                namespace: split_namespace(&ns_col),
                key,
                value,
                created_at,
                updated_at,
            });
            if items.len() >= query.limit {
                break;
            }
        }
        Ok(items)
    }

    async fn delete(&self, namespace: &[String], key: &str) -> Result<bool> {
        let ns = check_namespace(namespace)?;
        let db = self.db.lock().unwrap();
        let removed = db.execute(
            "DELETE FROM memory_items WHERE namespace = ?1 AND key = ?2",
            rusqlite::params![ns, key],
        )?;
        Ok(removed > 0)
    }
}
