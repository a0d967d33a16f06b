//! Fakes for driving the session runtime in tests

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use prepdeck_core::{Clock, ManualClock, MemoryStore, SessionStore, UserProfile, UserRole};
use prepdeck_net::{AckResponse, AuthApi, AuthResponse, Error, Result};

/// How the fake answers `refresh_session`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshMode {
    Accept,
    Reject,
    Fail,
}

pub struct FakeAuthApi {
    refresh: Mutex<RefreshMode>,
    refresh_delay: Mutex<Duration>,
    deny_login: AtomicBool,
    logins: AtomicUsize,
    refreshes: AtomicUsize,
}

impl FakeAuthApi {
    pub fn new() -> Self {
        Self {
            refresh: Mutex::new(RefreshMode::Accept),
            refresh_delay: Mutex::new(Duration::ZERO),
            deny_login: AtomicBool::new(false),
            logins: AtomicUsize::new(0),
            refreshes: AtomicUsize::new(0),
        }
    }

    pub fn set_refresh(&self, mode: RefreshMode) {
        *self.refresh.lock().unwrap() = mode;
    }

    pub fn set_refresh_delay(&self, delay: Duration) {
        *self.refresh_delay.lock().unwrap() = delay;
    }

    pub fn deny_logins(&self) {
        self.deny_login.store(true, Ordering::SeqCst);
    }

    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    fn grant(&self, email: &str) -> AuthResponse {
        if self.deny_login.load(Ordering::SeqCst) {
            return AuthResponse {
                success: false,
                token: None,
                user: None,
                message: Some("Invalid credentials".to_string()),
            };
        }

        let n = self.logins.fetch_add(1, Ordering::SeqCst) + 1;
        AuthResponse {
            success: true,
            token: Some(format!("token-{}", n)),
            user: Some(UserProfile::new("Asha", email, UserRole::Student)),
            message: Some("Welcome".to_string()),
        }
    }
}

#[async_trait]
impl AuthApi for FakeAuthApi {
    async fn login(&self, email: &str, _password: &str) -> Result<AuthResponse> {
        Ok(self.grant(email))
    }

    async fn send_otp(&self, _name: &str, email: &str) -> Result<AckResponse> {
        Ok(AckResponse {
            success: !email.is_empty(),
            message: Some(format!("OTP sent to {}", email)),
        })
    }

    async fn verify_otp(&self, email: &str, otp: &str, _password: &str) -> Result<AuthResponse> {
        if otp != "123456" {
            return Ok(AuthResponse {
                success: false,
                token: None,
                user: None,
                message: Some("Invalid OTP".to_string()),
            });
        }
        Ok(self.grant(email))
    }

    async fn refresh_session(&self, _token: &str) -> Result<()> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        let delay = *self.refresh_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mode = *self.refresh.lock().unwrap();
        match mode {
            RefreshMode::Accept => Ok(()),
            RefreshMode::Reject => Err(Error::Rejected {
                status: 401,
                message: "Session expired".to_string(),
            }),
            RefreshMode::Fail => Err(Error::Server {
                status: 503,
                message: "Service unavailable".to_string(),
            }),
        }
    }
}

/// Wall clock that follows paused tokio time, plus explicit jumps.
///
/// `suspend` moves the wall clock without letting any timer run, which is
/// what a sleeping laptop looks like to the process.
pub struct TestClock {
    wall: ManualClock,
    origin: tokio::time::Instant,
}

impl TestClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            wall: ManualClock::new(start),
            origin: tokio::time::Instant::now(),
        }
    }

    pub fn suspend(&self, by: Duration) {
        self.wall.advance(by);
    }
}

impl Clock for TestClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.origin.elapsed()).unwrap_or(chrono::Duration::zero());
        self.wall.now() + elapsed
    }
}

/// Store whose writes can be made to fail
pub struct FlakyStore {
    inner: MemoryStore,
    fail_writes: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            fail_writes: AtomicBool::new(false),
        }
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_write(&self) -> prepdeck_core::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(prepdeck_core::Error::Storage("disk full".to_string()));
        }
        Ok(())
    }
}

impl SessionStore for FlakyStore {
    fn get(&self, key: &str) -> prepdeck_core::Result<Option<String>> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> prepdeck_core::Result<()> {
        self.check_write()?;
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> prepdeck_core::Result<()> {
        self.check_write()?;
        self.inner.remove(key)
    }
}
