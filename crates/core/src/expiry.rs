//! Session expiry calculation
//!
//! `evaluate` is the single answer to "is this session still good". Every
//! timer, tick and visibility check calls it instead of redoing the
//! arithmetic.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::config::SessionConfig;
use crate::models::{LogoutReason, SessionSnapshot};

/// Which window a session fell out of
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryCause {
    /// Absolute lifetime elapsed (also used for a missing login time)
    Timeout,
    /// Idle for the whole inactivity window
    Inactivity,
}

impl From<ExpiryCause> for LogoutReason {
    fn from(cause: ExpiryCause) -> Self {
        match cause {
            ExpiryCause::Timeout => LogoutReason::Timeout,
            ExpiryCause::Inactivity => LogoutReason::Inactivity,
        }
    }
}

/// Result of evaluating a session at one instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expiry {
    pub valid: bool,
    pub remaining_absolute: Duration,
    pub remaining_inactivity: Duration,
    pub cause: Option<ExpiryCause>,
}

impl Expiry {
    fn expired(cause: ExpiryCause) -> Self {
        Self {
            valid: false,
            remaining_absolute: Duration::ZERO,
            remaining_inactivity: Duration::ZERO,
            cause: Some(cause),
        }
    }

    /// Valid, but close enough to the absolute deadline to warn
    pub fn in_warning_window(&self, window: Duration) -> bool {
        self.valid && self.remaining_absolute < window
    }
}

/// Evaluate a stored session at `now`.
///
/// Missing `login_time` is an expired session with cause `Timeout`. When
/// both windows have elapsed, `Timeout` wins. A clock that reads earlier
/// than the stored stamps counts as no time elapsed.
pub fn evaluate(snapshot: &SessionSnapshot, now: DateTime<Utc>, config: &SessionConfig) -> Expiry {
    let (Some(login), Some(idle_since)) = (snapshot.login_time, snapshot.idle_since()) else {
        return Expiry::expired(ExpiryCause::Timeout);
    };

    let since_login = elapsed(login, now);
    let idle = elapsed(idle_since, now);

    if since_login >= config.absolute_timeout {
        return Expiry::expired(ExpiryCause::Timeout);
    }
    if idle >= config.inactivity_timeout {
        return Expiry::expired(ExpiryCause::Inactivity);
    }

    Expiry {
        valid: true,
        remaining_absolute: config.absolute_timeout - since_login,
        remaining_inactivity: config.inactivity_timeout - idle,
        cause: None,
    }
}

/// Instant the absolute window closes, if the login time is known
pub fn absolute_deadline(snapshot: &SessionSnapshot, config: &SessionConfig) -> Option<DateTime<Utc>> {
    let lifetime = chrono::Duration::from_std(config.absolute_timeout).ok()?;
    snapshot
        .login_time
        .and_then(|login| login.checked_add_signed(lifetime))
}

fn elapsed(from: DateTime<Utc>, to: DateTime<Utc>) -> Duration {
    (to - from).to_std().unwrap_or(Duration::ZERO)
}
