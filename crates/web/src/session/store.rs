//! [`SessionStore`]: persistence for session records.

use rusqlite::{params, OptionalExtension};
use serde_json::{Map, Value};

use crate::db::{Database, StoreError};

/// A persisted session: identifier, payload, and absolute expiry (unix seconds).
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRecord {
    pub id: String,
    pub payload: Map<String, Value>,
    pub expires_at: i64,
}

/// Backing store for sessions, shared by every request.
///
/// Calls are synchronous; the pipeline runs them on the blocking pool.
#[cfg_attr(test, mockall::automock)]
pub trait SessionStore: Send + Sync {
    /// Load the record for `id` if it exists and has not expired at `now`.
    fn load(&self, id: &str, now: i64) -> Result<Option<SessionRecord>, StoreError>;

    /// Insert or replace `record`.
    fn save(&self, record: &SessionRecord) -> Result<(), StoreError>;

    /// Delete the record for `id`. Deleting a missing record is not an error.
    fn destroy(&self, id: &str) -> Result<(), StoreError>;

    /// Delete every record that expired at or before `now`; returns the count.
    fn prune_expired(&self, now: i64) -> Result<usize, StoreError>;
}

/// [`SessionStore`] backed by the `sessions` table.
#[derive(Clone, Debug)]
pub struct SqliteSessionStore {
    db: Database,
}

impl SqliteSessionStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

impl SessionStore for SqliteSessionStore {
    fn load(&self, id: &str, now: i64) -> Result<Option<SessionRecord>, StoreError> {
        let row = self
            .db
            .lock()
            .query_row(
                "SELECT payload, expires_at FROM sessions WHERE id = ?1 AND expires_at > ?2",
                params![id, now],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
            )
            .optional()?;

        match row {
            Some((payload, expires_at)) => Ok(Some(SessionRecord {
                id: id.to_owned(),
                payload: serde_json::from_str(&payload)?,
                expires_at,
            })),
            None => Ok(None),
        }
    }

    fn save(&self, record: &SessionRecord) -> Result<(), StoreError> {
        let payload = serde_json::to_string(&record.payload)?;
        self.db.lock().execute(
            "INSERT INTO sessions (id, payload, expires_at) VALUES (?1, ?2, ?3)
             ON CONFLICT (id) DO UPDATE SET payload = excluded.payload,
                                            expires_at = excluded.expires_at",
            params![record.id, payload, record.expires_at],
        )?;
        Ok(())
    }

    fn destroy(&self, id: &str) -> Result<(), StoreError> {
        self.db
            .lock()
            .execute("DELETE FROM sessions WHERE id = ?1", params![id])?;
        Ok(())
    }

    fn prune_expired(&self, now: i64) -> Result<usize, StoreError> {
        let removed = self
            .db
            .lock()
            .execute("DELETE FROM sessions WHERE expires_at <= ?1", params![now])?;
        Ok(removed)
    }
}
