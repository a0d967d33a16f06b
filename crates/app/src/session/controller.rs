//! Session controller
//!
//! The handle every consumer holds. All state lives behind one mutex that is
//! never held across an await. Authentication is always re-derived from the
//! store and the clock, never cached.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use prepdeck_core::invariants::{assert_config_invariants, assert_record_invariants};
use prepdeck_core::{
    evaluate, Clock, Expiry, LogoutReason, SessionConfig, SessionRecord, SessionRepository,
    SessionSnapshot, SessionStore, UserProfile,
};
use prepdeck_net::{AuthApi, AuthOutcome};
use tokio::sync::broadcast;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::activity::ActivityThrottle;
use super::error::AuthError;
use super::events::{SessionEvent, SessionStatus, EVENT_CHANNEL_CAPACITY};
use super::timers::{TimerPhase, TimerSet};
use super::warning::WarningLatch;

/// What the user signs in with
#[derive(Debug, Clone)]
pub enum Credentials {
    Password {
        email: String,
        password: String,
    },
    Otp {
        email: String,
        otp: String,
        password: String,
    },
}

impl Credentials {
    fn email(&self) -> &str {
        match self {
            Credentials::Password { email, .. } | Credentials::Otp { email, .. } => email,
        }
    }
}

/// The session this process is currently running timers for
pub(super) struct ActiveSession {
    /// Login epoch. Changes on every login, restore or adoption.
    pub(super) id: Uuid,
    pub(super) token: String,
    pub(super) user: UserProfile,
    /// Start of the absolute window as this epoch last saw it
    pub(super) login_time: Option<DateTime<Utc>>,
}

pub(super) struct RuntimeState {
    pub(super) phase: TimerPhase,
    pub(super) active: Option<ActiveSession>,
    pub(super) timers: TimerSet,
    pub(super) warning: WarningLatch,
    pub(super) throttle: ActivityThrottle,
}

/// What the store says about the session right now
pub(super) enum Verdict {
    Valid {
        snapshot: SessionSnapshot,
        expiry: Expiry,
    },
    Expired(LogoutReason),
    Missing,
    /// Read failed for a reason other than corruption
    Unreadable(prepdeck_core::Error),
}

pub(super) struct Inner {
    pub(super) config: SessionConfig,
    pub(super) store: Arc<dyn SessionStore>,
    pub(super) api: Arc<dyn AuthApi>,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) events: broadcast::Sender<SessionEvent>,
    pub(super) state: Mutex<RuntimeState>,
}

/// Cloneable handle to the session runtime
#[derive(Clone)]
pub struct SessionController {
    pub(super) inner: Arc<Inner>,
}

impl SessionController {
    pub fn new(
        config: SessionConfig,
        store: Arc<dyn SessionStore>,
        api: Arc<dyn AuthApi>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        assert_config_invariants(&config);

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let state = RuntimeState {
            phase: TimerPhase::Idle,
            active: None,
            timers: TimerSet::default(),
            warning: WarningLatch::default(),
            throttle: ActivityThrottle::new(config.activity_throttle),
        };

        Self {
            inner: Arc::new(Inner {
                config,
                store,
                api,
                clock,
                events,
                state: Mutex::new(state),
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Start-up decision. Returns whether a valid session was resumed.
    #[instrument(skip(self))]
    pub fn restore(&self) -> bool {
        let mut state = self.lock();
        match self.check() {
            Verdict::Valid { snapshot, expiry } => {
                info!(email = %snapshot.user.email, "Restoring stored session");
                self.begin_locked(&mut state, snapshot, &expiry, true);
                true
            }
            Verdict::Expired(reason) => {
                info!(reason = %reason, "Stored session is no longer valid");
                self.logout_locked(&mut state, reason);
                false
            }
            Verdict::Missing => {
                state.phase = TimerPhase::Idle;
                false
            }
            Verdict::Unreadable(e) => {
                error!(error = %e, "Failed to read stored session");
                false
            }
        }
    }

    /// Authenticate and start a fresh session
    #[instrument(skip(self, credentials), fields(email = %credentials.email()))]
    pub async fn login(&self, credentials: Credentials) -> Result<SessionRecord, AuthError> {
        let api = self.inner.api.clone();
        let response = match &credentials {
            Credentials::Password { email, password } => api.login(email, password).await?,
            Credentials::Otp {
                email,
                otp,
                password,
            } => api.verify_otp(email, otp, password).await?,
        };

        let (token, user) = match response.outcome()? {
            AuthOutcome::Granted { token, user } => (token, user),
            AuthOutcome::Denied { message } => {
                info!(message = %message, "Login denied");
                return Err(AuthError::Rejected(message));
            }
        };

        let mut state = self.lock();
        let record = SessionRecord::new(token, user, self.inner.clock.now());
        assert_record_invariants(&record);
        self.repo().save(&record)?;

        let snapshot = SessionSnapshot::from(record.clone());
        let expiry = evaluate(&snapshot, self.inner.clock.now(), &self.inner.config);
        self.begin_locked(&mut state, snapshot, &expiry, false);
        info!("Logged in");
        Ok(record)
    }

    /// Request a one-time password. Returns the server's message.
    #[instrument(skip(self, name))]
    pub async fn send_otp(&self, name: &str, email: &str) -> Result<String, AuthError> {
        let response = self.inner.api.send_otp(name, email).await?;
        let message = response.message.unwrap_or_default();
        if !response.success {
            return Err(AuthError::Rejected(message));
        }
        Ok(message)
    }

    /// End the session. Safe to call any number of times.
    pub fn logout(&self, reason: LogoutReason) {
        let mut state = self.lock();
        self.logout_locked(&mut state, reason);
    }

    /// End the session only if the store says it is over. Returns whether
    /// it ended.
    ///
    /// Deadline countdowns call this instead of `logout`, since another
    /// process may have extended the session meanwhile.
    #[instrument(skip(self))]
    pub fn expire_if_due(&self) -> bool {
        let mut state = self.lock();
        if !state.phase.is_active() {
            return false;
        }

        match self.check() {
            Verdict::Valid { snapshot, expiry } => {
                self.follow_extension_locked(&mut state, &snapshot, &expiry);
                false
            }
            Verdict::Expired(reason) => {
                self.logout_locked(&mut state, reason);
                true
            }
            Verdict::Missing => {
                self.logout_locked(&mut state, LogoutReason::SessionInvalid);
                true
            }
            Verdict::Unreadable(e) => {
                warn!(error = %e, "Session store unreadable, leaving session running");
                false
            }
        }
    }

    /// Whether a session is running and the store still backs it
    pub fn is_authenticated(&self) -> bool {
        let state = self.lock();
        state.phase.is_active() && matches!(self.check(), Verdict::Valid { .. })
    }

    pub fn user(&self) -> Option<UserProfile> {
        let state = self.lock();
        state.active.as_ref().map(|active| active.user.clone())
    }

    pub fn status(&self) -> SessionStatus {
        let state = self.lock();
        let expiry = match self.check() {
            Verdict::Valid { expiry, .. } if state.phase.is_active() => Some(expiry),
            _ => None,
        };

        SessionStatus {
            phase: state.phase,
            authenticated: expiry.is_some(),
            warning_active: state.warning.is_active(),
            user: state.active.as_ref().map(|active| active.user.clone()),
            remaining_absolute: expiry.map(|e| e.remaining_absolute),
            remaining_inactivity: expiry.map(|e| e.remaining_inactivity),
        }
    }

    pub(super) fn lock(&self) -> MutexGuard<'_, RuntimeState> {
        // A panic elsewhere must not wedge logout
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(super) fn repo(&self) -> SessionRepository<'_> {
        SessionRepository::new(self.inner.store.as_ref())
    }

    /// Read the store fresh and evaluate it at the current wall time
    pub(super) fn check(&self) -> Verdict {
        match self.repo().load() {
            Ok(Some(snapshot)) => {
                let expiry = evaluate(&snapshot, self.inner.clock.now(), &self.inner.config);
                match expiry.cause {
                    None => Verdict::Valid { snapshot, expiry },
                    Some(cause) => Verdict::Expired(cause.into()),
                }
            }
            Ok(None) => Verdict::Missing,
            Err(prepdeck_core::Error::CorruptSession(detail)) => {
                warn!(detail = %detail, "Stored session is corrupt");
                Verdict::Expired(LogoutReason::SessionInvalid)
            }
            Err(e) => Verdict::Unreadable(e),
        }
    }

    pub(super) fn emit(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.inner.events.send(event);
    }

    /// New login epoch for `snapshot`: reset per-epoch state and arm timers
    pub(super) fn begin_locked(
        &self,
        state: &mut RuntimeState,
        snapshot: SessionSnapshot,
        expiry: &Expiry,
        restored: bool,
    ) {
        state.timers.cancel_all();
        state.warning.reset();
        state.throttle.reset();
        state.phase = TimerPhase::Armed;

        let user = snapshot.user.clone();
        state.active = Some(ActiveSession {
            id: Uuid::new_v4(),
            token: snapshot.token,
            user: user.clone(),
            login_time: snapshot.login_time,
        });

        self.emit(SessionEvent::LoggedIn { user, restored });
        self.arm_all_locked(state, expiry);
    }

    /// Cancel every task, clear the store, then announce the logout once
    pub(super) fn logout_locked(&self, state: &mut RuntimeState, reason: LogoutReason) {
        let was_active = state.phase.is_active();

        state.timers.cancel_all();
        state.warning.reset();
        state.throttle.reset();
        state.active = None;
        if was_active {
            state.phase = if reason.is_expiry() {
                TimerPhase::Expired
            } else {
                TimerPhase::Cancelled
            };
        }

        let repo = self.repo();
        let had_stored = matches!(repo.load(), Ok(Some(_)) | Err(_));
        if let Err(e) = repo.clear() {
            error!(error = %e, "Failed to clear stored session");
        }

        if was_active || had_stored {
            info!(reason = %reason, "Session ended");
            self.emit(SessionEvent::LoggedOut { reason });
        }
    }
}
