//! Storage traits
//!
//! `SessionStore` is the durable key/value interface the session runtime
//! talks to, allowing for different implementations (SQLite, in-memory).

use crate::error::Result;

/// Synchronous string-keyed store shared by every process of one origin.
///
/// There is no transaction across separate calls. Readers must validate
/// whatever they get back.
pub trait SessionStore: Send + Sync {
    /// Read a value
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write or overwrite a value
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Delete a value (absent keys are fine)
    fn remove(&self, key: &str) -> Result<()>;

    /// Delete several values as one logical operation
    fn remove_all(&self, keys: &[&str]) -> Result<()> {
        for key in keys {
            self.remove(key)?;
        }
        Ok(())
    }
}
