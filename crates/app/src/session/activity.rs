//! Activity tracking
//!
//! The tracker is the single authority on presence. Hiding or blurring the
//! window counts as activity (the user was just here) and never expires the
//! session by itself. Coming back re-reads the store, because wall time may
//! have jumped arbitrarily while the process was in the background.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use prepdeck_core::LogoutReason;
use tracing::{debug, info, warn};

use super::controller::{SessionController, Verdict};

/// Signals the tracker consumes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivitySignal {
    PointerDown,
    PointerMove,
    KeyPress,
    Scroll,
    TouchStart,
    Click,
    Hidden,
    Visible,
    Focus,
    Blur,
}

/// How a signal affects the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalClass {
    /// Direct interaction, throttled
    Interaction,
    /// Leaving the foreground, recorded unthrottled
    Background,
    /// Returning to the foreground, triggers a full re-check
    Foreground,
}

impl ActivitySignal {
    pub fn class(self) -> SignalClass {
        match self {
            Self::PointerDown
            | Self::PointerMove
            | Self::KeyPress
            | Self::Scroll
            | Self::TouchStart
            | Self::Click => SignalClass::Interaction,
            Self::Hidden | Self::Blur => SignalClass::Background,
            Self::Visible | Self::Focus => SignalClass::Foreground,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::PointerDown => "pointerdown",
            Self::PointerMove => "pointermove",
            Self::KeyPress => "keypress",
            Self::Scroll => "scroll",
            Self::TouchStart => "touchstart",
            Self::Click => "click",
            Self::Hidden => "hidden",
            Self::Visible => "visible",
            Self::Focus => "focus",
            Self::Blur => "blur",
        }
    }
}

impl fmt::Display for ActivitySignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActivitySignal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let signal = match s.to_ascii_lowercase().as_str() {
            "pointerdown" | "mousedown" => Self::PointerDown,
            "pointermove" | "mousemove" => Self::PointerMove,
            "keypress" | "keydown" | "key" => Self::KeyPress,
            "scroll" => Self::Scroll,
            "touchstart" | "touch" => Self::TouchStart,
            "click" => Self::Click,
            "hidden" | "hide" => Self::Hidden,
            "visible" | "show" => Self::Visible,
            "focus" => Self::Focus,
            "blur" => Self::Blur,
            other => return Err(format!("unknown activity signal: {}", other)),
        };
        Ok(signal)
    }
}

/// Coalesces bursts of interaction into at most one write per interval
#[derive(Debug)]
pub struct ActivityThrottle {
    interval: Duration,
    last_write: Option<DateTime<Utc>>,
}

impl ActivityThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_write: None,
        }
    }

    /// Whether a write at `now` is due. A clock that went backwards is due.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.last_write {
            None => true,
            Some(last) => match (now - last).to_std() {
                Ok(since) => since >= self.interval,
                Err(_) => true,
            },
        }
    }

    /// Note a successful write
    pub fn record(&mut self, at: DateTime<Utc>) {
        self.last_write = Some(at);
    }

    pub fn reset(&mut self) {
        self.last_write = None;
    }
}

impl SessionController {
    /// Feed one activity signal into the session
    pub fn record_activity(&self, signal: ActivitySignal) {
        match signal.class() {
            SignalClass::Interaction => self.touch(signal, false),
            SignalClass::Background => self.touch(signal, true),
            SignalClass::Foreground => self.on_foreground(signal),
        }
    }

    /// Stamp `lastActivityTime` and push the inactivity deadline out
    fn touch(&self, signal: ActivitySignal, force: bool) {
        let mut state = self.lock();
        if !state.phase.is_active() {
            return;
        }

        let now = self.inner.clock.now();
        if !force && !state.throttle.is_due(now) {
            return;
        }

        // An idle session must not be revived by a late event
        match self.check() {
            Verdict::Valid { .. } => {}
            Verdict::Expired(reason) => return self.logout_locked(&mut state, reason),
            Verdict::Missing => {
                return self.logout_locked(&mut state, LogoutReason::SessionInvalid)
            }
            Verdict::Unreadable(e) => {
                debug!(error = %e, "Skipping activity write, store unreadable");
                return;
            }
        }

        if let Err(e) = self.repo().touch_activity(now) {
            // Retried on the next qualifying event
            warn!(signal = %signal, error = %e, "Failed to record activity");
            return;
        }
        state.throttle.record(now);

        if let Verdict::Valid { expiry, .. } = self.check() {
            self.arm_inactivity_locked(&mut state, &expiry);
        }
    }

    /// Re-check the session after the window comes back
    fn on_foreground(&self, signal: ActivitySignal) {
        let mut state = self.lock();
        if !state.phase.is_active() {
            return;
        }

        match self.check() {
            Verdict::Valid { snapshot, expiry } => {
                if !self.follow_extension_locked(&mut state, &snapshot, &expiry) {
                    debug!(signal = %signal, "Foreground regained, re-arming timers");
                    self.arm_all_locked(&mut state, &expiry);
                }
            }
            Verdict::Expired(reason) => {
                info!(signal = %signal, reason = %reason, "Session expired while in background");
                self.logout_locked(&mut state, reason);
            }
            Verdict::Missing => self.logout_locked(&mut state, LogoutReason::SessionInvalid),
            Verdict::Unreadable(e) => {
                warn!(error = %e, "Session store unreadable on foreground");
            }
        }
    }
}
