//! libSQL-backed entity store
//!
//! Each conditional write is a single guarded statement, so `SQLite` itself
//! provides the compare-and-set: an `UPDATE ... WHERE last_modified = ?` for
//! existing rows and an upsert that only replaces expired rows for inserts.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use super::{EntityStore, EntityWrite, PutOutcome};
use crate::clock::{Clock, SystemClock};
use crate::db::Database;
use crate::error::Result;
use crate::models::{EntityKey, StoredEntity};

/// Store persisting entities in a libSQL database
pub struct LibSqlStore {
    db: Mutex<Database>,
    clock: Arc<dyn Clock>,
}

impl LibSqlStore {
    pub fn new(db: Database) -> Self {
        Self::with_clock(db, Arc::new(SystemClock::new()))
    }

    pub fn with_clock(db: Database, clock: Arc<dyn Clock>) -> Self {
        Self {
            db: Mutex::new(db),
            clock,
        }
    }

    /// Open (and migrate) a database file.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(Database::open(path).await?))
    }

    /// Open an in-memory database (useful for testing)
    pub async fn open_in_memory() -> Result<Self> {
        Ok(Self::new(Database::open_in_memory().await?))
    }
}

#[async_trait]
impl EntityStore for LibSqlStore {
    async fn get(&self, key: &EntityKey) -> Result<Option<StoredEntity>> {
        let now = self.clock.now_millis();
        let db = self.db.lock().await;
        let mut rows = db
            .connection()
            .query(
                "SELECT payload, last_modified
                 FROM entities
                 WHERE entity_class = ? AND id = ?
                   AND (expires_at IS NULL OR expires_at > ?)",
                libsql::params![key.class.as_str(), key.id.as_str(), now],
            )
            .await?;

        let Some(row) = rows.next().await? else {
            return Ok(None);
        };
        let payload: String = row.get(0)?;
        let last_modified: i64 = row.get(1)?;

        Ok(Some(StoredEntity {
            id: key.id.clone(),
            payload: serde_json::from_str::<Value>(&payload)?,
            last_modified,
        }))
    }

    async fn conditional_put(
        &self,
        key: &EntityKey,
        write: EntityWrite,
        expected_last_modified: Option<i64>,
    ) -> Result<PutOutcome> {
        let now = self.clock.now_millis();
        let payload = serde_json::to_string(&write.payload)?;
        let db = self.db.lock().await;
        let conn = db.connection();

        let changed = match expected_last_modified {
            Some(expected) => {
                conn.execute(
                    "UPDATE entities
                     SET payload = ?, last_modified = ?, expires_at = ?
                     WHERE entity_class = ? AND id = ? AND last_modified = ?
                       AND (expires_at IS NULL OR expires_at > ?)",
                    libsql::params![
                        payload,
                        write.last_modified,
                        write.expires_at,
                        key.class.as_str(),
                        key.id.as_str(),
                        expected,
                        now
                    ],
                )
                .await?
            }
            None => {
                conn.execute(
                    "INSERT INTO entities (entity_class, id, payload, last_modified, expires_at)
                     VALUES (?, ?, ?, ?, ?)
                     ON CONFLICT (entity_class, id) DO UPDATE SET
                         payload = excluded.payload,
                         last_modified = excluded.last_modified,
                         expires_at = excluded.expires_at
                     WHERE entities.expires_at IS NOT NULL AND entities.expires_at <= ?",
                    libsql::params![
                        key.class.as_str(),
                        key.id.as_str(),
                        payload,
                        write.last_modified,
                        write.expires_at,
                        now
                    ],
                )
                .await?
            }
        };

        if changed == 0 {
            return Ok(PutOutcome::Stale);
        }
        Ok(PutOutcome::Written(write.into_entity(&key.id)))
    }

    async fn purge_expired(&self, now: i64) -> Result<u64> {
        let db = self.db.lock().await;
        let removed = db
            .connection()
            .execute(
                "DELETE FROM entities WHERE expires_at IS NOT NULL AND expires_at <= ?",
                libsql::params![now],
            )
            .await?;
        Ok(removed)
    }
}
