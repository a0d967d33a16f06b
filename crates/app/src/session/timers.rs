//! One-shot session timers
//!
//! Every armed timer carries a generation number. Cancelling or re-arming a
//! slot replaces its generation under the controller lock, so a task that was
//! already waking up when it got cancelled finds a mismatch and does nothing.

use std::sync::Arc;
use std::time::Duration;

use prepdeck_core::invariants::assert_delay_within;
use prepdeck_core::{Expiry, LogoutReason};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::controller::{RuntimeState, SessionController, Verdict};
use super::revalidator::RecurringTask;

/// Wait before re-reading a store that failed to answer
const STORE_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Stand-in deadline for delays past what `Instant` can represent
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Per-session timer state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerPhase {
    /// No session
    Idle,
    /// Timers running for a fresh or restored session
    Armed,
    /// Timers re-armed after a successful extension
    Extended,
    /// Ended by timeout or inactivity
    Expired,
    /// Ended by logout or an invalid session
    Cancelled,
}

impl TimerPhase {
    pub fn is_active(self) -> bool {
        matches!(self, TimerPhase::Armed | TimerPhase::Extended)
    }
}

/// Which one-shot timer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    Absolute,
    Inactivity,
    Warning,
}

impl TimerKind {
    const ALL: [TimerKind; 3] = [TimerKind::Absolute, TimerKind::Inactivity, TimerKind::Warning];

    fn index(self) -> usize {
        match self {
            TimerKind::Absolute => 0,
            TimerKind::Inactivity => 1,
            TimerKind::Warning => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TimerKind::Absolute => "absolute",
            TimerKind::Inactivity => "inactivity",
            TimerKind::Warning => "warning",
        }
    }
}

struct ArmedTimer {
    generation: u64,
    handle: JoinHandle<()>,
}

/// Handles of every task scheduled for the current session.
///
/// Dropping the set aborts all of them.
#[derive(Default)]
pub struct TimerSet {
    next_generation: u64,
    slots: [Option<ArmedTimer>; 3],
    revalidator: Option<RecurringTask>,
}

impl TimerSet {
    /// Schedule `on_fire(generation)` after `delay`, replacing whatever the
    /// slot held. The deadline is fixed now, not when the task first runs.
    pub fn arm<F>(&mut self, kind: TimerKind, delay: Duration, on_fire: F) -> u64
    where
        F: FnOnce(u64) + Send + 'static,
    {
        self.cancel(kind);

        self.next_generation += 1;
        let generation = self.next_generation;
        let now = Instant::now();
        let deadline = now.checked_add(delay).unwrap_or_else(|| now + FAR_FUTURE);
        let handle = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            on_fire(generation);
        });

        self.slots[kind.index()] = Some(ArmedTimer { generation, handle });
        generation
    }

    pub fn cancel(&mut self, kind: TimerKind) {
        if let Some(timer) = self.slots[kind.index()].take() {
            timer.handle.abort();
        }
    }

    /// Claim a firing. False when the slot was cancelled or re-armed since.
    pub fn take_fired(&mut self, kind: TimerKind, generation: u64) -> bool {
        let slot = &mut self.slots[kind.index()];
        let current = matches!(slot, Some(timer) if timer.generation == generation);
        if current {
            *slot = None;
        }
        current
    }

    pub fn is_armed(&self, kind: TimerKind) -> bool {
        self.slots[kind.index()].is_some()
    }

    pub fn has_revalidator(&self) -> bool {
        self.revalidator.is_some()
    }

    pub fn set_revalidator(&mut self, task: RecurringTask) {
        self.revalidator = Some(task);
    }

    /// Abort every one-shot timer and the revalidator
    pub fn cancel_all(&mut self) {
        for kind in TimerKind::ALL {
            self.cancel(kind);
        }
        self.revalidator = None;
    }
}

impl Drop for TimerSet {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

impl SessionController {
    /// Arm one timer slot that calls back into this controller
    pub(super) fn schedule_locked(&self, state: &mut RuntimeState, kind: TimerKind, delay: Duration) {
        let weak = Arc::downgrade(&self.inner);
        let generation = state.timers.arm(kind, delay, move |generation| {
            if let Some(inner) = weak.upgrade() {
                SessionController { inner }.on_timer(kind, generation);
            }
        });
        debug!(timer = kind.as_str(), generation, delay_secs = delay.as_secs(), "Timer armed");
    }

    /// Re-arm the absolute, inactivity and warning timers from `expiry`
    pub(super) fn arm_all_locked(&self, state: &mut RuntimeState, expiry: &Expiry) {
        assert_delay_within(
            expiry.remaining_absolute,
            self.inner.config.absolute_timeout,
            "absolute timer",
        );
        self.schedule_locked(state, TimerKind::Absolute, expiry.remaining_absolute);
        self.arm_inactivity_locked(state, expiry);
        self.arm_warning_locked(state, expiry);
        self.start_revalidator_locked(state);
    }

    /// Re-arm only the inactivity timer
    pub(super) fn arm_inactivity_locked(&self, state: &mut RuntimeState, expiry: &Expiry) {
        assert_delay_within(
            expiry.remaining_inactivity,
            self.inner.config.inactivity_timeout,
            "inactivity timer",
        );
        self.schedule_locked(state, TimerKind::Inactivity, expiry.remaining_inactivity);
    }

    fn on_timer(&self, kind: TimerKind, generation: u64) {
        let mut state = self.lock();
        if !state.timers.take_fired(kind, generation) {
            debug!(timer = kind.as_str(), generation, "Ignoring stale timer");
            return;
        }
        if !state.phase.is_active() {
            return;
        }

        // Another process may have moved the stamps since this timer was armed
        match self.check() {
            Verdict::Valid { snapshot, expiry } => {
                if self.follow_extension_locked(&mut state, &snapshot, &expiry) {
                    return;
                }
                match kind {
                    TimerKind::Absolute => {
                        info!("Absolute deadline not reached yet, re-arming");
                        self.schedule_locked(&mut state, kind, expiry.remaining_absolute);
                    }
                    TimerKind::Inactivity => {
                        debug!("Activity recorded elsewhere, re-arming inactivity timer");
                        self.arm_inactivity_locked(&mut state, &expiry);
                    }
                    TimerKind::Warning => self.arm_warning_locked(&mut state, &expiry),
                }
            }
            Verdict::Expired(reason) => self.logout_locked(&mut state, reason),
            Verdict::Missing => self.logout_locked(&mut state, LogoutReason::SessionInvalid),
            Verdict::Unreadable(e) => {
                warn!(timer = kind.as_str(), error = %e, "Session store unreadable, retrying");
                self.schedule_locked(&mut state, kind, STORE_RETRY_DELAY);
            }
        }
    }
}
