//! Session runtime
//!
//! Keeps the stored session honest: arms the absolute and inactivity timers,
//! records activity, revalidates on a period, warns before the absolute
//! deadline and extends on request. Everything funnels into
//! `SessionController::logout`, the single place a session ends.

mod activity;
mod controller;
mod error;
mod events;
mod extender;
mod revalidator;
mod timers;
mod warning;

#[cfg(test)]
pub(crate) mod testing;
#[cfg(test)]
mod tests;

pub use activity::ActivitySignal;
pub use controller::{Credentials, SessionController};
pub use error::AuthError;
pub use events::{SessionEvent, SessionStatus};
pub use timers::TimerPhase;
pub use warning::WarningPrompt;
