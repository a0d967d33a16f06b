//! Key/value table operations

use chrono::Utc;
use rusqlite::{params, Connection};
use tracing::instrument;

use super::parse::OptionalExt;
use crate::error::Result;

pub struct KeyValueStore<'a> {
    conn: &'a Connection,
}

impl<'a> KeyValueStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Read a value
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM kv_store WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Write a value (upsert)
    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at = ?3",
            params![key, value, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Delete a value
    pub fn remove(&self, key: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM kv_store WHERE key = ?1", params![key])?;
        Ok(())
    }

    /// Delete several values in one transaction
    #[instrument(skip(self))]
    pub fn remove_all(&self, keys: &[&str]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        for key in keys {
            tx.execute("DELETE FROM kv_store WHERE key = ?1", params![key])?;
        }
        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::Database;

    #[test]
    fn test_get_missing() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.kv().get("token").unwrap().is_none());
    }

    #[test]
    fn test_set_overwrites() {
        let db = Database::open_in_memory().unwrap();
        db.kv().set("token", "a").unwrap();
        db.kv().set("token", "b").unwrap();
        assert_eq!(db.kv().get("token").unwrap().as_deref(), Some("b"));
    }

    #[test]
    fn test_remove_all() {
        let db = Database::open_in_memory().unwrap();
        db.kv().set("token", "a").unwrap();
        db.kv().set("user", "{}").unwrap();
        db.kv().set("theme", "dark").unwrap();

        db.kv().remove_all(&["token", "user", "missing"]).unwrap();

        assert!(db.kv().get("token").unwrap().is_none());
        assert!(db.kv().get("user").unwrap().is_none());
        assert_eq!(db.kv().get("theme").unwrap().as_deref(), Some("dark"));
    }
}
