//! Session extension
//!
//! Extending restarts the absolute window from now. The server is asked
//! first; the store is only touched if the same login epoch is still running
//! when the answer comes back.

use chrono::{DateTime, Utc};
use prepdeck_core::expiry::absolute_deadline;
use prepdeck_core::invariants::assert_extension_advances;
use prepdeck_core::{evaluate, Expiry, LogoutReason, SessionSnapshot};
use tracing::{info, instrument, warn};

use super::controller::{RuntimeState, SessionController, Verdict};
use super::error::AuthError;
use super::events::SessionEvent;
use super::timers::TimerPhase;

impl SessionController {
    /// Refresh the session with the server and push the absolute deadline
    /// out by a full window. Returns the new deadline.
    #[instrument(skip(self))]
    pub async fn extend(&self) -> Result<DateTime<Utc>, AuthError> {
        let (epoch, token) = {
            let mut state = self.lock();
            if !state.phase.is_active() {
                return Err(AuthError::NotAuthenticated);
            }
            self.current_snapshot_locked(&mut state)?;
            match state.active.as_ref() {
                Some(active) => (active.id, active.token.clone()),
                None => return Err(AuthError::NotAuthenticated),
            }
        };

        let result = self.inner.api.refresh_session(&token).await;

        let mut state = self.lock();
        if state.active.as_ref().map(|active| active.id) != Some(epoch) {
            info!("Session changed during refresh, discarding result");
            return Err(AuthError::SessionChanged);
        }

        if let Err(e) = result {
            let reason = if e.is_rejection() {
                LogoutReason::SessionInvalid
            } else {
                LogoutReason::SessionError
            };
            warn!(error = %e, reason = %reason, "Session refresh failed");
            self.logout_locked(&mut state, reason);
            return Err(e.into());
        }

        // The session may have run out while the request was in flight
        let snapshot = self.current_snapshot_locked(&mut state)?;

        let now = self.inner.clock.now();
        let old_login = snapshot.login_time.unwrap_or(now);
        let new_login = now.max(old_login + chrono::Duration::milliseconds(1));
        self.repo().reset_login_time(new_login)?;
        assert_extension_advances(old_login, new_login);

        let extended = SessionSnapshot {
            login_time: Some(new_login),
            ..snapshot
        };
        let expiry = evaluate(&extended, now, &self.inner.config);
        let deadline = absolute_deadline(&extended, &self.inner.config).unwrap_or(new_login);

        if let Some(active) = state.active.as_mut() {
            active.login_time = Some(new_login);
        }
        state.warning.reset();
        state.phase = TimerPhase::Extended;
        self.arm_all_locked(&mut state, &expiry);

        info!(deadline = %deadline, "Session extended");
        self.emit(SessionEvent::Extended { deadline });
        Ok(deadline)
    }

    /// Pick up an extension made by another process: a stored `loginTime`
    /// later than the one this epoch knows. Returns whether one was found.
    pub(super) fn follow_extension_locked(
        &self,
        state: &mut RuntimeState,
        snapshot: &SessionSnapshot,
        expiry: &Expiry,
    ) -> bool {
        let Some(active) = state.active.as_mut() else {
            return false;
        };
        if snapshot.login_time <= active.login_time {
            return false;
        }
        active.login_time = snapshot.login_time;

        let deadline = absolute_deadline(snapshot, &self.inner.config)
            .unwrap_or_else(|| self.inner.clock.now());
        state.warning.reset();
        state.phase = TimerPhase::Extended;
        self.arm_all_locked(state, expiry);

        info!(deadline = %deadline, "Session extended by another process");
        self.emit(SessionEvent::Extended { deadline });
        true
    }

    /// The stored session if it is still valid. Anything else ends it.
    fn current_snapshot_locked(&self, state: &mut RuntimeState) -> Result<SessionSnapshot, AuthError> {
        match self.check() {
            Verdict::Valid { snapshot, .. } => Ok(snapshot),
            Verdict::Expired(reason) => {
                self.logout_locked(state, reason);
                Err(AuthError::NotAuthenticated)
            }
            Verdict::Missing => {
                self.logout_locked(state, LogoutReason::SessionInvalid);
                Err(AuthError::NotAuthenticated)
            }
            Verdict::Unreadable(e) => Err(AuthError::Storage(e)),
        }
    }
}
