//! Periodic revalidation
//!
//! One-shot timers can be starved by a suspended machine or a throttled
//! process. The revalidator re-reads the store on a coarse period and is the
//! backstop that eventually catches an expired session. It is also how this
//! process notices a logout or login performed by another process.

use std::sync::Arc;
use std::time::Duration;

use prepdeck_core::LogoutReason;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::controller::{RuntimeState, SessionController, Verdict};

/// Cancellable recurring task. Dropping the handle stops it.
pub struct RecurringTask {
    handle: JoinHandle<()>,
}

impl RecurringTask {
    /// Call `on_tick` every `period`, starting one period from now, until it
    /// returns false or the handle is dropped.
    pub fn spawn<F>(period: Duration, mut on_tick: F) -> Self
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let start = Instant::now() + period;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(start, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if !on_tick() {
                    break;
                }
            }
        });
        Self { handle }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for RecurringTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl SessionController {
    /// Start the revalidator unless it is already running
    pub(super) fn start_revalidator_locked(&self, state: &mut RuntimeState) {
        if state.timers.has_revalidator() {
            return;
        }

        let weak = Arc::downgrade(&self.inner);
        let task = RecurringTask::spawn(self.inner.config.revalidate_interval, move || {
            match weak.upgrade() {
                Some(inner) => {
                    SessionController { inner }.revalidate();
                    true
                }
                None => false,
            }
        });
        state.timers.set_revalidator(task);
        debug!(
            interval_secs = self.inner.config.revalidate_interval.as_secs(),
            "Revalidator started"
        );
    }

    /// One revalidation pass against the store
    pub(super) fn revalidate(&self) {
        let mut state = self.lock();
        if !state.phase.is_active() {
            return;
        }

        match self.check() {
            Verdict::Valid { snapshot, expiry } => {
                let replaced = state
                    .active
                    .as_ref()
                    .map_or(true, |active| active.token != snapshot.token);
                if replaced {
                    info!("Session replaced by another process, adopting it");
                    self.begin_locked(&mut state, snapshot, &expiry, true);
                } else if !self.follow_extension_locked(&mut state, &snapshot, &expiry) {
                    self.check_warning_locked(&mut state, &expiry);
                }
            }
            Verdict::Expired(reason) => {
                info!(reason = %reason, "Revalidation found an expired session");
                self.logout_locked(&mut state, reason);
            }
            Verdict::Missing => {
                info!("Session removed by another process");
                self.logout_locked(&mut state, LogoutReason::SessionInvalid);
            }
            Verdict::Unreadable(e) => {
                warn!(error = %e, "Session store unreadable, will retry next tick");
            }
        }
    }
}
