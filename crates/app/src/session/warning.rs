//! Expiry warning
//!
//! The warning is a state transition, not a dialog: the controller flips
//! `warning_active`, publishes a `WarningPrompt` and carries on. Whatever
//! presents it calls `extend` or `logout` on the controller.

use std::time::Duration;

use chrono::{DateTime, Utc};
use prepdeck_core::Expiry;
use tracing::info;

use super::controller::{RuntimeState, SessionController};
use super::events::SessionEvent;
use super::timers::TimerKind;

/// What the presentation layer gets when the warning fires
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarningPrompt {
    /// Time left before the absolute deadline
    pub remaining: Duration,
    /// The absolute deadline itself
    pub deadline: DateTime<Utc>,
}

/// Fires at most once per login epoch
#[derive(Debug, Default)]
pub struct WarningLatch {
    fired: bool,
}

impl WarningLatch {
    /// True exactly once until the next `reset`
    pub fn try_fire(&mut self) -> bool {
        if self.fired {
            return false;
        }
        self.fired = true;
        true
    }

    /// Whether a warning is outstanding for the current epoch
    pub fn is_active(&self) -> bool {
        self.fired
    }

    pub fn reset(&mut self) {
        self.fired = false;
    }
}

/// Delay until the session is strictly inside the warning window, `None`
/// if it already is
pub fn warning_delay(expiry: &Expiry, window: Duration) -> Option<Duration> {
    if expiry.in_warning_window(window) {
        return None;
    }
    Some(expiry.remaining_absolute.saturating_sub(window) + Duration::from_millis(1))
}

impl SessionController {
    /// Fire the warning now if inside the window, else arm the warning timer
    pub(super) fn arm_warning_locked(&self, state: &mut RuntimeState, expiry: &Expiry) {
        state.timers.cancel(TimerKind::Warning);
        if state.warning.is_active() {
            return;
        }

        match warning_delay(expiry, self.inner.config.warning_window) {
            Some(delay) => self.schedule_locked(state, TimerKind::Warning, delay),
            None => self.check_warning_locked(state, expiry),
        }
    }

    /// Raise the warning if the session is inside the window and the latch
    /// has not fired for this epoch
    pub(super) fn check_warning_locked(&self, state: &mut RuntimeState, expiry: &Expiry) {
        if !expiry.in_warning_window(self.inner.config.warning_window) {
            return;
        }
        if !state.warning.try_fire() {
            return;
        }

        let now = self.inner.clock.now();
        let deadline = chrono::Duration::from_std(expiry.remaining_absolute)
            .ok()
            .and_then(|remaining| now.checked_add_signed(remaining))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let prompt = WarningPrompt {
            remaining: expiry.remaining_absolute,
            deadline,
        };
        info!(remaining_secs = prompt.remaining.as_secs(), "Session expiry warning raised");
        self.emit(SessionEvent::WarningRaised(prompt));
    }
}
