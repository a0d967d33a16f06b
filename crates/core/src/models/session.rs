//! Session record model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::UserProfile;

/// A fully populated session, as written at login
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub token: String,
    pub user: UserProfile,
    pub login_time: DateTime<Utc>,
    pub last_activity_time: DateTime<Utc>,
}

impl SessionRecord {
    /// Start a new session at `now`. Activity starts at the login instant.
    pub fn new(token: String, user: UserProfile, now: DateTime<Utc>) -> Self {
        Self {
            token,
            user,
            login_time: now,
            last_activity_time: now,
        }
    }
}

/// Session state as read back from a field-addressable store.
///
/// The timestamps are optional because the store gives no cross-key
/// guarantee: a crash or a concurrent logout may leave only some keys behind.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub token: String,
    pub user: UserProfile,
    pub login_time: Option<DateTime<Utc>>,
    pub last_activity_time: Option<DateTime<Utc>>,
}

impl SessionSnapshot {
    /// Instant the idle clock started: the later of login and last activity
    pub fn idle_since(&self) -> Option<DateTime<Utc>> {
        let login = self.login_time?;
        Some(match self.last_activity_time {
            Some(activity) if activity > login => activity,
            _ => login,
        })
    }

    /// Promote to a full record if every timestamp is present
    pub fn into_record(self) -> Option<SessionRecord> {
        let login_time = self.login_time?;
        Some(SessionRecord {
            token: self.token,
            user: self.user,
            login_time,
            last_activity_time: self.last_activity_time.unwrap_or(login_time),
        })
    }
}

impl From<SessionRecord> for SessionSnapshot {
    fn from(record: SessionRecord) -> Self {
        Self {
            token: record.token,
            user: record.user,
            login_time: Some(record.login_time),
            last_activity_time: Some(record.last_activity_time),
        }
    }
}
