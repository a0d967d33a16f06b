//! Storage layer for PrepDeck
//!
//! The session lives in a string-keyed store. `SqliteStore` backs it with a
//! database file that every process of one installation opens, so a login
//! or logout in one process is visible to the others on their next read.

mod kv;
mod memory;
mod migrations;
mod parse;
mod session;
mod traits;

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::Connection;
use tracing::instrument;

use crate::error::{Error, Result};

pub use kv::KeyValueStore;
pub use memory::MemoryStore;
pub use parse::{format_millis, parse_millis};
pub use session::{keys, SessionRepository};
pub use traits::SessionStore;

/// How long a write waits for another process holding the database lock
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Main database handle
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open or create database at the given path
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Open in-memory database (for testing)
    #[instrument]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initialize database schema via migrations
    fn init(&self) -> Result<()> {
        migrations::run_migrations(&self.conn)?;
        Ok(())
    }

    /// Get current schema version
    pub fn schema_version(&self) -> u32 {
        migrations::get_current_version(&self.conn).unwrap_or(0)
    }

    /// Get key/value store
    pub fn kv(&self) -> KeyValueStore<'_> {
        KeyValueStore::new(&self.conn)
    }
}

/// `SessionStore` backed by a SQLite file
pub struct SqliteStore {
    db: Mutex<Database>,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        Self { db: Mutex::new(db) }
    }

    /// Open the store file, creating parent directories as needed
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self::new(Database::open(path)?))
    }

    fn db(&self) -> Result<MutexGuard<'_, Database>> {
        self.db
            .lock()
            .map_err(|_| Error::Storage("database lock poisoned".to_string()))
    }
}

impl SessionStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.db()?.kv().get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.db()?.kv().set(key, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.db()?.kv().remove(key)
    }

    fn remove_all(&self, keys: &[&str]) -> Result<()> {
        self.db()?.kv().remove_all(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SessionRecord, UserProfile, UserRole};
    use tempfile::tempdir;

    #[test]
    fn test_schema_version() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.schema_version(), 1);
    }

    #[test]
    fn test_two_handles_share_one_session() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("session.db");

        let first = SqliteStore::open(&path).unwrap();
        let second = SqliteStore::open(&path).unwrap();

        let user = UserProfile::new("Asha", "asha@example.com", UserRole::Student);
        let record = SessionRecord::new("tok".into(), user, chrono::Utc::now());
        SessionRepository::new(&first).save(&record).unwrap();

        let seen = SessionRepository::new(&second).load().unwrap().unwrap();
        assert_eq!(seen.token, "tok");

        SessionRepository::new(&second).clear().unwrap();
        assert!(SessionRepository::new(&first).load().unwrap().is_none());
    }

    #[test]
    fn test_reopen_keeps_values() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session.db");

        {
            let store = SqliteStore::open(&path).unwrap();
            store.set(keys::TOKEN, "persisted").unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.get(keys::TOKEN).unwrap().as_deref(), Some("persisted"));
    }
}
