//! Console presentation of session events
//!
//! Turns `SessionEvent`s into lines for the user and runs the expiry
//! countdown once a warning is raised.

use std::time::Duration;

use prepdeck_core::LogoutReason;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::session::{SessionController, SessionEvent, WarningPrompt};

/// How often the countdown reminds the user
const COUNTDOWN_TICK: Duration = Duration::from_secs(5 * 60);

/// Text shown when a session ends. `None` means end quietly.
pub fn logout_message(reason: LogoutReason, inactivity: Duration) -> Option<String> {
    match reason {
        LogoutReason::Timeout => {
            Some("Your session has expired. Please log in again.".to_string())
        }
        LogoutReason::Inactivity => Some(format!(
            "You were logged out after {} of inactivity.",
            format_remaining(inactivity)
        )),
        LogoutReason::Manual => None,
        LogoutReason::SessionInvalid | LogoutReason::SessionError => {
            Some("Your session could not be verified. Please log in again.".to_string())
        }
    }
}

/// Coarse human duration: "6d 23h", "1h 05m", "4m 30s"
pub fn format_remaining(d: Duration) -> String {
    let secs = d.as_secs();
    let (days, hours, mins, secs) = (
        secs / 86_400,
        secs % 86_400 / 3600,
        secs % 3600 / 60,
        secs % 60,
    );
    if days > 0 {
        format!("{}d {}h", days, hours)
    } else if hours > 0 {
        format!("{}h {:02}m", hours, mins)
    } else {
        format!("{}m {:02}s", mins, secs)
    }
}

fn warning_message(prompt: &WarningPrompt) -> String {
    format!(
        "Your session expires in {} (at {}). Type 'extend' to stay signed in or 'logout' to end it.",
        format_remaining(prompt.remaining),
        prompt.deadline.format("%Y-%m-%d %H:%M UTC")
    )
}

pub struct Presenter {
    controller: SessionController,
    output: mpsc::UnboundedSender<String>,
    countdown: Option<JoinHandle<()>>,
}

impl Presenter {
    pub fn new(controller: SessionController, output: mpsc::UnboundedSender<String>) -> Self {
        Self {
            controller,
            output,
            countdown: None,
        }
    }

    /// Consume events until the channel closes
    pub async fn run(mut self, mut events: broadcast::Receiver<SessionEvent>) {
        loop {
            match events.recv().await {
                Ok(event) => self.handle(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Presenter fell behind session events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    fn handle(&mut self, event: SessionEvent) {
        debug!(?event, "Presenting session event");
        match event {
            SessionEvent::LoggedIn { user, restored } => {
                self.stop_countdown();
                if restored {
                    self.say(format!("Welcome back, {}.", user.name));
                } else {
                    self.say(format!("Logged in as {} <{}>.", user.name, user.email));
                }
            }
            SessionEvent::WarningRaised(prompt) => {
                self.say(warning_message(&prompt));
                self.start_countdown(prompt.remaining);
            }
            SessionEvent::Extended { deadline } => {
                self.stop_countdown();
                self.say(format!(
                    "Session extended until {}.",
                    deadline.format("%Y-%m-%d %H:%M UTC")
                ));
            }
            SessionEvent::LoggedOut { reason } => {
                self.stop_countdown();
                let inactivity = self.controller.config().inactivity_timeout;
                if let Some(message) = logout_message(reason, inactivity) {
                    self.say(message);
                }
            }
        }
    }

    /// Remind the user periodically and expire the session when the time is
    /// up, unless the store says otherwise
    fn start_countdown(&mut self, remaining: Duration) {
        self.stop_countdown();

        let controller = self.controller.clone();
        let output = self.output.clone();
        let start = Instant::now();
        let deadline = start + remaining;
        self.countdown = Some(tokio::spawn(async move {
            let mut next = start;
            loop {
                next = (next + COUNTDOWN_TICK).min(deadline);
                tokio::time::sleep_until(next).await;

                let left = deadline.saturating_duration_since(next);
                if left.is_zero() {
                    if !controller.expire_if_due() {
                        debug!("Countdown finished but the stored session is still valid");
                    }
                    break;
                }
                let _ = output.send(format!("Session expires in {}.", format_remaining(left)));
            }
        }));
    }

    fn stop_countdown(&mut self) {
        if let Some(task) = self.countdown.take() {
            task.abort();
        }
    }

    fn say(&self, line: String) {
        // The printer only goes away at shutdown
        let _ = self.output.send(line);
    }
}

impl Drop for Presenter {
    fn drop(&mut self) {
        self.stop_countdown();
    }
}
