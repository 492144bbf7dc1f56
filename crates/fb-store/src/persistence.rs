//! Durable backing for the store.
//!
//! The in-memory map is authoritative while the process runs; a
//! [`Persistence`] backend receives every committed write and eviction, and
//! hands everything back on start-up so ages and versions carry over a
//! restart.

use crate::StoreError;
use chrono::{DateTime, Utc};
use fb_types::{CacheRecord, Entity, EntityKey};
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// Backend for committed records.
pub trait Persistence: Send + Sync {
    /// Every readable record. Rows that no longer parse are skipped.
    fn load_all(&self) -> Result<Vec<CacheRecord<Entity>>, StoreError>;

    /// Insert, or replace if `record.version` is newer than the stored one.
    fn upsert(&self, record: &CacheRecord<Entity>) -> Result<(), StoreError>;

    /// Drop the record for `key`. Its version mark is kept.
    fn delete(&self, key: &EntityKey) -> Result<(), StoreError>;

    /// Highest version ever written per key, deleted records included.
    fn load_versions(&self) -> Result<HashMap<EntityKey, u64>, StoreError> {
        Ok(HashMap::new())
    }
}

/// Persistence that keeps nothing. Used when no path is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPersistence;

impl Persistence for NoopPersistence {
    fn load_all(&self) -> Result<Vec<CacheRecord<Entity>>, StoreError> {
        Ok(Vec::new()) // Nothing kept
    }

    fn upsert(&self, _record: &CacheRecord<Entity>) -> Result<(), StoreError> {
        Ok(()) // Discard
    }

    fn delete(&self, _key: &EntityKey) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Schema for the record table.
const STORE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS entity_records (
    entity_key TEXT PRIMARY KEY,
    entity_kind TEXT NOT NULL,
    body TEXT NOT NULL,
    version INTEGER NOT NULL,
    fetched_at TEXT NOT NULL,
    ttl_ms INTEGER NOT NULL,
    embedding TEXT
);

CREATE INDEX IF NOT EXISTS idx_entity_records_kind ON entity_records(entity_kind);

CREATE TABLE IF NOT EXISTS entity_versions (
    entity_key TEXT PRIMARY KEY,
    version INTEGER NOT NULL
);
"#;

const UPSERT: &str = r#"
INSERT INTO entity_records (entity_key, entity_kind, body, version, fetched_at, ttl_ms, embedding)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
ON CONFLICT(entity_key) DO UPDATE SET
    entity_kind = excluded.entity_kind,
    body = excluded.body,
    version = excluded.version,
    fetched_at = excluded.fetched_at,
    ttl_ms = excluded.ttl_ms,
    embedding = excluded.embedding
WHERE excluded.version > entity_records.version
"#;

const RAISE_VERSION: &str = r#"
INSERT INTO entity_versions (entity_key, version)
VALUES (?1, ?2)
ON CONFLICT(entity_key) DO UPDATE SET
    version = max(entity_versions.version, excluded.version)
"#;

/// SQLite-backed persistence.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Open (or create) the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Storage(format!("failed to create {}: {}", parent.display(), e))
            })?;
        }

        let conn = Connection::open(path).map_err(|e| {
            StoreError::Storage(format!("failed to open {}: {}", path.display(), e))
        })?;
        Self::with_connection(conn)
    }

    /// A private in-memory database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(STORE_SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Storage(format!("lock poisoned: {}", e)))
    }
}

/// Raw column values of one row.
type Row = (String, String, i64, String, i64, Option<String>);

fn decode(row: Row) -> Result<CacheRecord<Entity>, String> {
    let (key, body, version, fetched_at, ttl_ms, embedding) = row;
    let key: EntityKey = key.parse().map_err(|e| format!("{}", e))?;
    let entity: Entity = serde_json::from_str(&body).map_err(|e| e.to_string())?;
    if entity.key() != key {
        return Err(format!("body belongs to {}", entity.key()));
    }
    let fetched_at = DateTime::parse_from_rfc3339(&fetched_at)
        .map_err(|e| e.to_string())?
        .with_timezone(&Utc);
    let embedding = embedding
        .map(|raw| serde_json::from_str::<Vec<f32>>(&raw))
        .transpose()
        .map_err(|e| e.to_string())?;

    Ok(CacheRecord {
        key,
        entity,
        fetched_at,
        ttl: Duration::from_millis(ttl_ms.max(0) as u64),
        version: version.max(0) as u64,
        embedding,
    })
}

impl Persistence for SqliteStorage {
    fn load_all(&self) -> Result<Vec<CacheRecord<Entity>>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT entity_key, body, version, fetched_at, ttl_ms, embedding FROM entity_records",
        )?;
        let rows = stmt.query_map([], |row| -> rusqlite::Result<Row> {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let row = row?;
            let key = row.0.clone();
            match decode(row) {
                Ok(record) => records.push(record),
                Err(reason) => tracing::warn!("Skipping unreadable record {}: {}", key, reason),
            }
        }
        Ok(records)
    }

    fn upsert(&self, record: &CacheRecord<Entity>) -> Result<(), StoreError> {
        let body = serde_json::to_string(&record.entity)?;
        let embedding = record
            .embedding
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let ttl_ms = i64::try_from(record.ttl.as_millis()).unwrap_or(i64::MAX);
        let version = i64::try_from(record.version)
            .map_err(|_| StoreError::Storage(format!("version {} out of range", record.version)))?;

        let key = record.key.to_string();
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            UPSERT,
            params![
                key,
                record.key.kind().as_str(),
                body,
                version,
                record.fetched_at.to_rfc3339(),
                ttl_ms,
                embedding,
            ],
        )?;
        tx.execute(RAISE_VERSION, params![key, version])?;
        tx.commit()?;
        Ok(())
    }

    fn delete(&self, key: &EntityKey) -> Result<(), StoreError> {
        self.conn()?.execute(
            "DELETE FROM entity_records WHERE entity_key = ?1",
            params![key.to_string()],
        )?;
        Ok(())
    }

    fn load_versions(&self) -> Result<HashMap<EntityKey, u64>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT entity_key, version FROM entity_versions
             UNION ALL
             SELECT entity_key, version FROM entity_records",
        )?;
        let rows = stmt.query_map([], |row| -> rusqlite::Result<(String, i64)> {
            Ok((row.get(0)?, row.get(1)?))
        })?;

        let mut versions = HashMap::new();
        for row in rows {
            let (raw, version) = row?;
            let Ok(key) = raw.parse::<EntityKey>() else {
                tracing::warn!("Skipping version mark for unreadable key {}", raw);
                continue;
            };
            let version = version.max(0) as u64;
            let mark = versions.entry(key).or_insert(version);
            *mark = (*mark).max(version);
        }
        Ok(versions)
    }
}
