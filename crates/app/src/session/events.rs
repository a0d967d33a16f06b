//! Events and status published by the session controller

use std::time::Duration;

use chrono::{DateTime, Utc};
use prepdeck_core::{LogoutReason, UserProfile};

use super::timers::TimerPhase;
use super::warning::WarningPrompt;

/// Capacity of the session event channel
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Events from the session runtime to the presentation layer
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A session started (fresh login) or was picked up from the store
    LoggedIn { user: UserProfile, restored: bool },
    /// The absolute deadline is near
    WarningRaised(WarningPrompt),
    /// The session was extended to a new absolute deadline
    Extended { deadline: DateTime<Utc> },
    /// The session ended
    LoggedOut { reason: LogoutReason },
}

/// Point-in-time view of the session
#[derive(Debug, Clone)]
pub struct SessionStatus {
    pub phase: TimerPhase,
    pub authenticated: bool,
    pub warning_active: bool,
    pub user: Option<UserProfile>,
    pub remaining_absolute: Option<Duration>,
    pub remaining_inactivity: Option<Duration>,
}
