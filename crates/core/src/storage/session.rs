//! Typed session view over a key/value store

use chrono::{DateTime, Utc};
use tracing::{debug, instrument};

use super::parse::{format_millis, parse_millis_opt};
use super::SessionStore;
use crate::error::{Error, Result};
use crate::models::{SessionRecord, SessionSnapshot, UserProfile};

/// Storage keys of the session record
pub mod keys {
    pub const TOKEN: &str = "token";
    pub const USER: &str = "user";
    pub const LOGIN_TIME: &str = "loginTime";
    pub const LAST_ACTIVITY_TIME: &str = "lastActivityTime";

    pub const ALL: [&str; 4] = [TOKEN, USER, LOGIN_TIME, LAST_ACTIVITY_TIME];
}

pub struct SessionRepository<'a> {
    store: &'a dyn SessionStore,
}

impl<'a> SessionRepository<'a> {
    pub fn new(store: &'a dyn SessionStore) -> Self {
        Self { store }
    }

    /// Read the current session.
    ///
    /// `Ok(None)` when there is no token. A token without a readable user
    /// profile is `Error::CorruptSession`.
    pub fn load(&self) -> Result<Option<SessionSnapshot>> {
        let Some(token) = self.store.get(keys::TOKEN)? else {
            return Ok(None);
        };

        let user_json = self
            .store
            .get(keys::USER)?
            .ok_or_else(|| Error::CorruptSession("token present without user".to_string()))?;
        let user: UserProfile = serde_json::from_str(&user_json)
            .map_err(|e| Error::CorruptSession(format!("unreadable user payload: {}", e)))?;

        Ok(Some(SessionSnapshot {
            token,
            user,
            login_time: parse_millis_opt(self.store.get(keys::LOGIN_TIME)?),
            last_activity_time: parse_millis_opt(self.store.get(keys::LAST_ACTIVITY_TIME)?),
        }))
    }

    /// Replace whatever is stored with `record`.
    ///
    /// The token goes in last so a reader never sees a token without its
    /// timestamps.
    #[instrument(skip(self, record), fields(email = %record.user.email))]
    pub fn save(&self, record: &SessionRecord) -> Result<()> {
        self.store.remove_all(&keys::ALL)?;
        self.store
            .set(keys::USER, &serde_json::to_string(&record.user)?)?;
        self.store
            .set(keys::LOGIN_TIME, &format_millis(record.login_time))?;
        self.store.set(
            keys::LAST_ACTIVITY_TIME,
            &format_millis(record.last_activity_time),
        )?;
        self.store.set(keys::TOKEN, &record.token)?;
        Ok(())
    }

    /// Stamp the latest user interaction
    pub fn touch_activity(&self, at: DateTime<Utc>) -> Result<()> {
        self.store.set(keys::LAST_ACTIVITY_TIME, &format_millis(at))
    }

    /// Restart the absolute window (session extension)
    pub fn reset_login_time(&self, at: DateTime<Utc>) -> Result<()> {
        self.store.set(keys::LOGIN_TIME, &format_millis(at))
    }

    /// Delete every session key
    pub fn clear(&self) -> Result<()> {
        debug!("Clearing stored session");
        self.store.remove_all(&keys::ALL)
    }
}
