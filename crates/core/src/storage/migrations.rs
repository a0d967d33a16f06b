//! Schema versioning for the session database
//!
//! Several processes may open the same file at once, so the version check
//! and the upgrade happen inside one IMMEDIATE transaction. The version is
//! kept in SQLite's `user_version` header field.

use rusqlite::{Connection, Transaction, TransactionBehavior};
use tracing::{debug, info, instrument};

use crate::error::{Error, Result};

/// Schema steps. Step `n` upgrades version `n` to `n + 1`.
const STEPS: &[(&str, &str)] = &[(
    "Key/value session store",
    r#"
        CREATE TABLE IF NOT EXISTS kv_store (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
    "#,
)];

/// Schema version this build writes
pub(crate) const LATEST_VERSION: u32 = STEPS.len() as u32;

pub(crate) fn get_current_version(conn: &Connection) -> Result<u32> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}

/// Bring the schema up to `LATEST_VERSION`
#[instrument(skip(conn))]
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;

    let current = get_current_version(&tx)?;
    if current > LATEST_VERSION {
        return Err(Error::Storage(format!(
            "session database has schema version {}, newer than supported {}",
            current, LATEST_VERSION
        )));
    }
    if current == LATEST_VERSION {
        debug!(version = current, "Session schema up to date");
        return Ok(());
    }

    for (index, (description, sql)) in STEPS.iter().enumerate().skip(current as usize) {
        info!(to = index + 1, description, "Upgrading session schema");
        tx.execute_batch(sql)?;
    }
    tx.pragma_update(None, "user_version", LATEST_VERSION)?;
    tx.commit()?;

    info!(from = current, to = LATEST_VERSION, "Session schema updated");
    Ok(())
}
