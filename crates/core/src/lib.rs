//! PrepDeck Core Library
//!
//! Session models, expiry calculation, configuration and durable storage for
//! the PrepDeck client.

pub mod clock;
pub mod config;
pub mod error;
pub mod expiry;
pub mod invariants;
pub mod models;
pub mod storage;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ApiConfig, PrepdeckConfig, SessionConfig};
pub use error::{Error, Result};
pub use expiry::{evaluate, Expiry, ExpiryCause};
pub use models::*;
pub use storage::{
    Database, MemoryStore, SessionRepository, SessionStore, SqliteStore,
};
