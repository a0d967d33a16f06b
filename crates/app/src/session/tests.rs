use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use prepdeck_core::storage::{format_millis, keys};
use prepdeck_core::{
    LogoutReason, MemoryStore, SessionConfig, SessionRecord, SessionRepository,
    SessionStore, SqliteStore, UserProfile, UserRole,
};
use tokio::sync::broadcast;

use super::testing::{FakeAuthApi, FlakyStore, RefreshMode, TestClock};
use super::*;

const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(60 * 60);
const DAY: Duration = Duration::from_secs(24 * 60 * 60);

fn t0() -> DateTime<Utc> {
    DateTime::from_timestamp_millis(1_700_000_000_000).unwrap()
}

fn at(offset: Duration) -> DateTime<Utc> {
    t0() + chrono::Duration::from_std(offset).unwrap()
}

async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

async fn advance(by: Duration) {
    tokio::time::advance(by).await;
    settle().await;
}

fn short_config() -> SessionConfig {
    SessionConfig {
        absolute_timeout: 3 * HOUR,
        inactivity_timeout: 4 * HOUR,
        warning_window: HOUR,
        ..SessionConfig::default()
    }
}

fn password() -> Credentials {
    Credentials::Password {
        email: "asha@example.com".to_string(),
        password: "hunter22".to_string(),
    }
}

struct Harness {
    controller: SessionController,
    store: Arc<dyn SessionStore>,
    api: Arc<FakeAuthApi>,
    clock: Arc<TestClock>,
    events: broadcast::Receiver<SessionEvent>,
}

impl Harness {
    fn new(config: SessionConfig) -> Self {
        Self::with_store(config, Arc::new(MemoryStore::new()))
    }

    fn with_store(config: SessionConfig, store: Arc<dyn SessionStore>) -> Self {
        let api = Arc::new(FakeAuthApi::new());
        let clock = Arc::new(TestClock::new(t0()));
        let controller = SessionController::new(config, store.clone(), api.clone(), clock.clone());
        let events = controller.subscribe();
        Self {
            controller,
            store,
            api,
            clock,
            events,
        }
    }

    /// A second process sharing this one's store and wall clock
    fn sibling(&self) -> (SessionController, broadcast::Receiver<SessionEvent>) {
        let controller = SessionController::new(
            self.controller.config().clone(),
            self.store.clone(),
            self.api.clone(),
            self.clock.clone(),
        );
        let events = controller.subscribe();
        (controller, events)
    }

    async fn logged_in(config: SessionConfig) -> Self {
        let mut harness = Self::new(config);
        harness.controller.login(password()).await.unwrap();
        harness.drain();
        harness
    }

    fn drain(&mut self) -> Vec<SessionEvent> {
        drain(&mut self.events)
    }

    fn stored(&self, key: &str) -> Option<String> {
        self.store.get(key).unwrap()
    }
}

fn drain(events: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

fn logouts(events: &[SessionEvent]) -> Vec<LogoutReason> {
    events
        .iter()
        .filter_map(|event| match event {
            SessionEvent::LoggedOut { reason } => Some(*reason),
            _ => None,
        })
        .collect()
}

fn warnings(events: &[SessionEvent]) -> usize {
    events
        .iter()
        .filter(|event| matches!(event, SessionEvent::WarningRaised(_)))
        .count()
}

fn assert_cleared(harness: &Harness) {
    for key in keys::ALL {
        assert_eq!(harness.stored(key), None, "{} left behind", key);
    }
}

#[tokio::test(start_paused = true)]
async fn test_login_writes_record_and_arms() {
    let mut harness = Harness::new(SessionConfig::default());

    let record = harness.controller.login(password()).await.unwrap();
    assert_eq!(record.login_time, t0());
    assert_eq!(record.last_activity_time, t0());

    assert_eq!(harness.stored(keys::TOKEN).as_deref(), Some("token-1"));
    assert_eq!(harness.stored(keys::LOGIN_TIME), Some(format_millis(t0())));
    assert!(harness.controller.is_authenticated());

    let status = harness.controller.status();
    assert_eq!(status.phase, TimerPhase::Armed);
    assert_eq!(status.remaining_absolute, Some(7 * DAY));
    assert_eq!(status.remaining_inactivity, Some(2 * HOUR));

    let events = harness.drain();
    assert!(matches!(
        events.as_slice(),
        [SessionEvent::LoggedIn { restored: false, .. }]
    ));
}

#[tokio::test(start_paused = true)]
async fn test_otp_login() {
    let harness = Harness::new(SessionConfig::default());

    let message = harness
        .controller
        .send_otp("Asha", "asha@example.com")
        .await
        .unwrap();
    assert!(message.contains("asha@example.com"));

    let wrong = Credentials::Otp {
        email: "asha@example.com".to_string(),
        otp: "000000".to_string(),
        password: "hunter22".to_string(),
    };
    match harness.controller.login(wrong).await {
        Err(AuthError::Rejected(message)) => assert_eq!(message, "Invalid OTP"),
        other => panic!("unexpected result: {:?}", other.map(|r| r.token)),
    }

    let right = Credentials::Otp {
        email: "asha@example.com".to_string(),
        otp: "123456".to_string(),
        password: "hunter22".to_string(),
    };
    harness.controller.login(right).await.unwrap();
    assert!(harness.controller.is_authenticated());
}

#[tokio::test(start_paused = true)]
async fn test_denied_login_changes_nothing() {
    let mut harness = Harness::new(SessionConfig::default());
    harness.api.deny_logins();

    match harness.controller.login(password()).await {
        Err(AuthError::Rejected(message)) => assert_eq!(message, "Invalid credentials"),
        other => panic!("unexpected result: {:?}", other.map(|r| r.token)),
    }

    assert!(!harness.controller.is_authenticated());
    assert!(harness.drain().is_empty());
    assert_cleared(&harness);
}

#[tokio::test(start_paused = true)]
async fn test_absolute_timeout_after_wall_clock_jump() {
    let mut harness = Harness::logged_in(SessionConfig::default()).await;

    // Machine asleep: wall time jumps, no timer runs
    harness.clock.suspend(7 * DAY + Duration::from_secs(1));
    assert!(!harness.controller.is_authenticated());
    assert!(logouts(&harness.drain()).is_empty());

    // The revalidator catches it on its next tick, and timeout wins
    advance(5 * MINUTE).await;
    assert_eq!(logouts(&harness.drain()), vec![LogoutReason::Timeout]);
    assert_eq!(harness.controller.status().phase, TimerPhase::Expired);
    assert_cleared(&harness);
}

#[tokio::test(start_paused = true)]
async fn test_inactivity_logout() {
    let mut harness = Harness::logged_in(SessionConfig::default()).await;

    advance(HOUR).await;
    harness.controller.record_activity(ActivitySignal::KeyPress);
    assert_eq!(
        harness.stored(keys::LAST_ACTIVITY_TIME),
        Some(format_millis(at(HOUR)))
    );

    advance(2 * HOUR - Duration::from_secs(1)).await;
    assert!(harness.controller.is_authenticated());
    assert!(logouts(&harness.drain()).is_empty());

    advance(Duration::from_secs(1)).await;
    assert_eq!(logouts(&harness.drain()), vec![LogoutReason::Inactivity]);
    assert_cleared(&harness);
}

#[tokio::test(start_paused = true)]
async fn test_activity_is_throttled() {
    let harness = Harness::logged_in(SessionConfig::default()).await;

    advance(MINUTE).await;
    harness.controller.record_activity(ActivitySignal::PointerMove);
    advance(Duration::from_millis(500)).await;
    harness.controller.record_activity(ActivitySignal::PointerMove);
    assert_eq!(
        harness.stored(keys::LAST_ACTIVITY_TIME),
        Some(format_millis(at(MINUTE)))
    );

    advance(Duration::from_millis(500)).await;
    harness.controller.record_activity(ActivitySignal::PointerMove);
    assert_eq!(
        harness.stored(keys::LAST_ACTIVITY_TIME),
        Some(format_millis(at(MINUTE + Duration::from_secs(1))))
    );
}

#[tokio::test(start_paused = true)]
async fn test_failed_activity_write_is_retried() {
    let store = Arc::new(FlakyStore::new());
    let harness = Harness::with_store(SessionConfig::default(), store.clone());
    harness.controller.login(password()).await.unwrap();

    advance(MINUTE).await;
    store.fail_writes(true);
    harness.controller.record_activity(ActivitySignal::Click);
    assert_eq!(
        harness.stored(keys::LAST_ACTIVITY_TIME),
        Some(format_millis(t0()))
    );

    // The throttle window did not advance, so the very next event writes
    store.fail_writes(false);
    advance(Duration::from_millis(100)).await;
    harness.controller.record_activity(ActivitySignal::Click);
    assert_eq!(
        harness.stored(keys::LAST_ACTIVITY_TIME),
        Some(format_millis(at(MINUTE + Duration::from_millis(100))))
    );
}

#[tokio::test(start_paused = true)]
async fn test_extend_restarts_absolute_window() {
    let mut harness = Harness::logged_in(SessionConfig::default()).await;

    for _ in 0..6 {
        advance(HOUR).await;
        harness.controller.record_activity(ActivitySignal::Scroll);
    }
    advance(59 * MINUTE).await;

    let deadline = harness.controller.extend().await.unwrap();
    let extended_at = at(6 * HOUR + 59 * MINUTE);
    assert_eq!(deadline, extended_at + chrono::Duration::days(7));
    assert_eq!(harness.api.refresh_count(), 1);

    assert_eq!(
        harness.stored(keys::LOGIN_TIME),
        Some(format_millis(extended_at))
    );
    assert_eq!(
        harness.stored(keys::LAST_ACTIVITY_TIME),
        Some(format_millis(at(6 * HOUR)))
    );

    let status = harness.controller.status();
    assert_eq!(status.phase, TimerPhase::Extended);
    assert!(!status.warning_active);
    assert_eq!(status.remaining_absolute, Some(7 * DAY));

    let events = harness.drain();
    assert!(logouts(&events).is_empty());
    assert!(events
        .iter()
        .any(|event| matches!(event, SessionEvent::Extended { deadline: d } if *d == deadline)));
}

#[tokio::test(start_paused = true)]
async fn test_extend_always_moves_deadline_forward() {
    let harness = Harness::logged_in(SessionConfig::default()).await;

    // No time has passed since login
    let deadline = harness.controller.extend().await.unwrap();
    assert!(deadline > t0() + chrono::Duration::days(7));
}

#[tokio::test(start_paused = true)]
async fn test_warning_fires_once_per_epoch() {
    let mut harness = Harness::logged_in(short_config()).await;

    advance(2 * HOUR - MINUTE).await;
    assert_eq!(warnings(&harness.drain()), 0);

    advance(MINUTE + Duration::from_secs(1)).await;
    let events = harness.drain();
    assert_eq!(warnings(&events), 1);
    match events.iter().find(|e| matches!(e, SessionEvent::WarningRaised(_))) {
        Some(SessionEvent::WarningRaised(prompt)) => {
            assert!(prompt.remaining < HOUR);
            assert_eq!(prompt.deadline, at(3 * HOUR));
        }
        _ => unreachable!(),
    }
    assert!(harness.controller.status().warning_active);

    // Revalidator ticks and activity inside the window stay quiet
    harness.controller.record_activity(ActivitySignal::Click);
    advance(30 * MINUTE).await;
    assert_eq!(warnings(&harness.drain()), 0);

    // The countdown's logout and the absolute timer agree
    advance(30 * MINUTE).await;
    assert_eq!(logouts(&harness.drain()), vec![LogoutReason::Timeout]);
}

#[tokio::test(start_paused = true)]
async fn test_extend_resets_warning_latch() {
    let mut harness = Harness::logged_in(short_config()).await;

    advance(2 * HOUR + Duration::from_secs(1)).await;
    assert_eq!(warnings(&harness.drain()), 1);

    harness.controller.extend().await.unwrap();
    assert!(!harness.controller.status().warning_active);

    advance(2 * HOUR + Duration::from_secs(1)).await;
    let events = harness.drain();
    assert_eq!(warnings(&events), 1);
    assert!(logouts(&events).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_hidden_then_visible_after_suspend() {
    let mut harness = Harness::logged_in(SessionConfig::default()).await;

    advance(10 * MINUTE).await;
    harness.controller.record_activity(ActivitySignal::Hidden);
    assert_eq!(
        harness.stored(keys::LAST_ACTIVITY_TIME),
        Some(format_millis(at(10 * MINUTE)))
    );
    assert!(logouts(&harness.drain()).is_empty());

    harness.clock.suspend(3 * HOUR);
    harness.controller.record_activity(ActivitySignal::Visible);

    assert_eq!(logouts(&harness.drain()), vec![LogoutReason::Inactivity]);
    assert_cleared(&harness);
}

#[tokio::test(start_paused = true)]
async fn test_visible_rearms_timers_after_short_suspend() {
    let mut harness = Harness::logged_in(SessionConfig::default()).await;

    harness.clock.suspend(90 * MINUTE);
    harness.controller.record_activity(ActivitySignal::Focus);
    assert!(harness.controller.is_authenticated());

    // Re-armed against the remaining 30 minutes, not the original 2 hours
    advance(30 * MINUTE).await;
    assert_eq!(logouts(&harness.drain()), vec![LogoutReason::Inactivity]);
}

#[tokio::test(start_paused = true)]
async fn test_logout_is_idempotent() {
    let mut harness = Harness::logged_in(SessionConfig::default()).await;

    harness.controller.logout(LogoutReason::Manual);
    harness.controller.logout(LogoutReason::Manual);
    harness.controller.logout(LogoutReason::Timeout);
    assert_cleared(&harness);
    assert_eq!(harness.controller.status().phase, TimerPhase::Cancelled);

    // Nothing armed before the logout fires afterwards
    advance(8 * DAY).await;
    assert_eq!(logouts(&harness.drain()), vec![LogoutReason::Manual]);
    assert!(!harness.controller.is_authenticated());
}

#[tokio::test(start_paused = true)]
async fn test_activity_after_expiry_does_not_revive() {
    let mut harness = Harness::logged_in(SessionConfig::default()).await;

    harness.clock.suspend(3 * HOUR);
    harness.controller.record_activity(ActivitySignal::Click);

    assert_eq!(logouts(&harness.drain()), vec![LogoutReason::Inactivity]);
    assert_cleared(&harness);
}

#[tokio::test(start_paused = true)]
async fn test_restore_valid_session() {
    let mut harness = Harness::new(SessionConfig::default());
    let user = UserProfile::new("Asha", "asha@example.com", UserRole::Student);
    let mut record = SessionRecord::new("stored".into(), user, t0() - chrono::Duration::hours(1));
    record.last_activity_time = t0() - chrono::Duration::minutes(5);
    SessionRepository::new(harness.store.as_ref()).save(&record).unwrap();

    assert!(harness.controller.restore());
    assert!(harness.controller.is_authenticated());
    assert_eq!(
        harness.controller.user().map(|u| u.email),
        Some("asha@example.com".to_string())
    );

    let events = harness.drain();
    assert!(matches!(
        events.as_slice(),
        [SessionEvent::LoggedIn { restored: true, .. }]
    ));

    // Idle clock continues from the stored activity stamp
    advance(2 * HOUR - 5 * MINUTE).await;
    assert_eq!(logouts(&harness.drain()), vec![LogoutReason::Inactivity]);
}

#[tokio::test(start_paused = true)]
async fn test_restore_expired_session() {
    let mut harness = Harness::new(SessionConfig::default());
    let user = UserProfile::new("Asha", "asha@example.com", UserRole::Student);
    let record = SessionRecord::new("old".into(), user, t0() - chrono::Duration::days(8));
    SessionRepository::new(harness.store.as_ref()).save(&record).unwrap();

    assert!(!harness.controller.restore());
    assert_eq!(logouts(&harness.drain()), vec![LogoutReason::Timeout]);
    assert_cleared(&harness);
}

#[tokio::test(start_paused = true)]
async fn test_restore_corrupt_session() {
    let mut harness = Harness::new(SessionConfig::default());
    harness.store.set(keys::TOKEN, "orphan").unwrap();
    harness.store.set(keys::USER, "{not json").unwrap();

    assert!(!harness.controller.restore());
    assert_eq!(logouts(&harness.drain()), vec![LogoutReason::SessionInvalid]);
    assert_cleared(&harness);
}

#[tokio::test(start_paused = true)]
async fn test_restore_missing_login_time_is_timeout() {
    let mut harness = Harness::new(SessionConfig::default());
    let user = UserProfile::new("Asha", "asha@example.com", UserRole::Student);
    harness.store.set(keys::USER, &user_json(&user)).unwrap();
    harness.store.set(keys::TOKEN, "partial").unwrap();

    assert!(!harness.controller.restore());
    assert_eq!(logouts(&harness.drain()), vec![LogoutReason::Timeout]);
}

fn user_json(user: &UserProfile) -> String {
    format!(
        r#"{{"name":"{}","email":"{}","role":"student"}}"#,
        user.name, user.email
    )
}

#[tokio::test(start_paused = true)]
async fn test_restore_without_session_is_quiet() {
    let mut harness = Harness::new(SessionConfig::default());

    assert!(!harness.controller.restore());
    assert!(harness.drain().is_empty());
    assert_eq!(harness.controller.status().phase, TimerPhase::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_logout_elsewhere_is_noticed() {
    let mut harness = Harness::logged_in(SessionConfig::default()).await;
    let (other, _other_events) = harness.sibling();

    other.logout(LogoutReason::Manual);
    assert!(!harness.controller.is_authenticated());

    advance(5 * MINUTE).await;
    assert_eq!(
        logouts(&harness.drain()),
        vec![LogoutReason::SessionInvalid]
    );
}

#[tokio::test(start_paused = true)]
async fn test_activity_elsewhere_keeps_session_alive() {
    let mut harness = Harness::logged_in(SessionConfig::default()).await;
    let (other, mut other_events) = harness.sibling();
    assert!(other.restore());

    advance(HOUR).await;
    other.record_activity(ActivitySignal::Click);

    // This process's inactivity timer fires at T0+2h, sees the newer stamp
    // and re-arms instead of logging out
    advance(HOUR + Duration::from_secs(1)).await;
    assert!(logouts(&harness.drain()).is_empty());
    assert!(harness.controller.is_authenticated());

    assert!(logouts(&drain(&mut other_events)).is_empty());

    // The other process goes away; this one runs out on its own
    drop(other);
    advance(HOUR).await;
    assert_eq!(logouts(&harness.drain()), vec![LogoutReason::Inactivity]);
}

#[tokio::test(start_paused = true)]
async fn test_login_elsewhere_is_adopted() {
    let mut harness = Harness::logged_in(SessionConfig::default()).await;
    let (other, _other_events) = harness.sibling();

    advance(MINUTE).await;
    other
        .login(Credentials::Password {
            email: "ravi@example.com".to_string(),
            password: "pw".to_string(),
        })
        .await
        .unwrap();

    advance(5 * MINUTE).await;
    let events = harness.drain();
    assert!(logouts(&events).is_empty());
    assert!(events
        .iter()
        .any(|event| matches!(event, SessionEvent::LoggedIn { restored: true, .. })));
    assert_eq!(
        harness.controller.user().map(|u| u.email),
        Some("ravi@example.com".to_string())
    );
}

#[tokio::test(start_paused = true)]
async fn test_extension_elsewhere_is_followed() {
    let mut harness = Harness::logged_in(short_config()).await;
    let (other, _other_events) = harness.sibling();
    assert!(other.restore());

    advance(2 * HOUR + Duration::from_secs(1)).await;
    assert_eq!(warnings(&harness.drain()), 1);
    assert!(harness.controller.status().warning_active);

    let deadline = other.extend().await.unwrap();
    assert_eq!(deadline, at(5 * HOUR + Duration::from_secs(1)));

    // Past the deadline this process armed before the extension
    advance(HOUR).await;
    assert!(!harness.controller.expire_if_due());

    let events = harness.drain();
    assert!(logouts(&events).is_empty());
    assert!(events
        .iter()
        .any(|event| matches!(event, SessionEvent::Extended { deadline: d } if *d == deadline)));
    assert!(harness.stored(keys::TOKEN).is_some());
    assert!(harness.controller.is_authenticated());
    assert!(other.is_authenticated());

    let status = harness.controller.status();
    assert_eq!(status.phase, TimerPhase::Extended);
    assert!(!status.warning_active);

    // The latch was reset, so the new window warns again
    advance(HOUR + MINUTE).await;
    assert_eq!(warnings(&harness.drain()), 1);
}

#[tokio::test(start_paused = true)]
async fn test_expire_if_due_ends_only_expired_sessions() {
    let mut harness = Harness::logged_in(short_config()).await;

    assert!(!harness.controller.expire_if_due());
    assert!(harness.controller.is_authenticated());

    harness.clock.suspend(3 * HOUR);
    assert!(harness.controller.expire_if_due());
    assert_eq!(logouts(&harness.drain()), vec![LogoutReason::Timeout]);
    assert_cleared(&harness);

    assert!(!harness.controller.expire_if_due());
}

#[tokio::test(start_paused = true)]
async fn test_extend_rejected_is_session_invalid() {
    let mut harness = Harness::logged_in(SessionConfig::default()).await;
    harness.api.set_refresh(RefreshMode::Reject);

    match harness.controller.extend().await {
        Err(AuthError::Network(e)) => assert!(e.is_rejection()),
        other => panic!("unexpected result: {:?}", other),
    }
    assert_eq!(
        logouts(&harness.drain()),
        vec![LogoutReason::SessionInvalid]
    );
    assert_cleared(&harness);
}

#[tokio::test(start_paused = true)]
async fn test_extend_network_failure_is_session_error() {
    let mut harness = Harness::logged_in(SessionConfig::default()).await;
    harness.api.set_refresh(RefreshMode::Fail);

    assert!(matches!(
        harness.controller.extend().await,
        Err(AuthError::Network(_))
    ));
    assert_eq!(logouts(&harness.drain()), vec![LogoutReason::SessionError]);
}

#[tokio::test(start_paused = true)]
async fn test_extend_discarded_after_logout_in_flight() {
    let mut harness = Harness::logged_in(SessionConfig::default()).await;
    harness.api.set_refresh_delay(Duration::from_secs(5));

    let controller = harness.controller.clone();
    let pending = tokio::spawn(async move { controller.extend().await });
    settle().await;

    harness.controller.logout(LogoutReason::Manual);
    advance(Duration::from_secs(5)).await;

    assert!(matches!(
        pending.await.unwrap(),
        Err(AuthError::SessionChanged)
    ));
    assert_eq!(logouts(&harness.drain()), vec![LogoutReason::Manual]);
    assert_cleared(&harness);
}

#[tokio::test(start_paused = true)]
async fn test_extend_requires_session() {
    let harness = Harness::new(SessionConfig::default());

    assert!(matches!(
        harness.controller.extend().await,
        Err(AuthError::NotAuthenticated)
    ));
    assert_eq!(harness.api.refresh_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_sqlite_store_shared_between_controllers() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.db");

    let store = Arc::new(SqliteStore::open(&path).unwrap());
    let harness = Harness::with_store(SessionConfig::default(), store);
    harness.controller.login(password()).await.unwrap();

    let reopened: Arc<dyn SessionStore> = Arc::new(SqliteStore::open(&path).unwrap());
    let second = SessionController::new(
        SessionConfig::default(),
        reopened,
        Arc::new(FakeAuthApi::new()),
        harness.clock.clone(),
    );
    assert!(second.restore());
    assert_eq!(
        second.user().map(|u| u.email),
        Some("asha@example.com".to_string())
    );
}
