//! PrepDeck - session console
//!
//! Restores the stored session before anything else, then drives it from
//! commands read on stdin. Session events are printed as they happen.

use std::sync::Arc;

use clap::Parser;
use prepdeck_core::{LogoutReason, SqliteStore, SystemClock};
use prepdeck_net::HttpAuthClient;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
mod commands;
mod presenter;
mod session;

use commands::Command;
use presenter::{format_remaining, Presenter};
use session::{AuthError, Credentials, SessionController, SessionStatus};

#[derive(Debug, thiserror::Error)]
enum StartupError {
    #[error(transparent)]
    Core(#[from] prepdeck_core::Error),

    #[error(transparent)]
    Net(#[from] prepdeck_net::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

type Output = mpsc::UnboundedSender<String>;

fn main() {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = cli::Cli::parse();
    tracing::info!("Starting PrepDeck");

    let runtime = tokio::runtime::Runtime::new().expect("Failed to create tokio runtime");
    if let Err(e) = runtime.block_on(run(cli)) {
        tracing::error!("Failed to run: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: cli::Cli) -> Result<(), StartupError> {
    let config = cli.load_config()?;
    let store = Arc::new(SqliteStore::open(cli.session_db_path()?)?);
    let api = Arc::new(HttpAuthClient::new(&config.api)?);
    let controller =
        SessionController::new(config.session.clone(), store, api, Arc::new(SystemClock));

    let (out, mut lines_out) = mpsc::unbounded_channel::<String>();
    let printer = tokio::spawn(async move {
        while let Some(line) = lines_out.recv().await {
            println!("{}", line);
        }
    });

    // Subscribe before restoring so the restore itself is reported
    let presenter = tokio::spawn(Presenter::new(controller.clone(), out.clone()).run(controller.subscribe()));

    if !controller.restore() {
        say(&out, "Not logged in. Type 'help' for commands.");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match commands::parse(&line) {
            Ok(Some(Command::Quit)) => break,
            Ok(Some(command)) => execute(&controller, command, &out).await,
            Ok(None) => {}
            Err(e) => say(&out, e.to_string()),
        }
    }

    tracing::info!("Shutting down");
    presenter.abort();
    drop(out);
    let _ = printer.await;
    Ok(())
}

async fn execute(controller: &SessionController, command: Command, out: &Output) {
    match command {
        Command::Login { email, password } => {
            let result = controller
                .login(Credentials::Password { email, password })
                .await;
            report_login(result.map(|_| ()), out);
        }
        Command::SendOtp { email, name } => match controller.send_otp(&name, &email).await {
            Ok(message) if message.is_empty() => say(out, "OTP sent."),
            Ok(message) => say(out, message),
            Err(e) => say(out, format!("Could not send OTP: {}", e)),
        },
        Command::VerifyOtp {
            email,
            otp,
            password,
        } => {
            let result = controller
                .login(Credentials::Otp {
                    email,
                    otp,
                    password,
                })
                .await;
            report_login(result.map(|_| ()), out);
        }
        Command::Activity(signal) => controller.record_activity(signal),
        Command::Extend => match controller.extend().await {
            Ok(_) => {}
            Err(AuthError::NotAuthenticated) => say(out, "Not logged in."),
            // The logout that follows is reported by the presenter
            Err(AuthError::Network(_)) | Err(AuthError::SessionChanged) => {}
            Err(e) => say(out, format!("Could not extend session: {}", e)),
        },
        Command::Logout => controller.logout(LogoutReason::Manual),
        Command::Status => say(out, describe(&controller.status())),
        Command::Help => say(out, commands::HELP),
        Command::Quit => {}
    }
}

fn report_login(result: Result<(), AuthError>, out: &Output) {
    match result {
        Ok(()) => {}
        Err(AuthError::Rejected(message)) => say(out, message),
        Err(e) => say(out, format!("Login failed: {}", e)),
    }
}

fn describe(status: &SessionStatus) -> String {
    let (Some(user), true) = (&status.user, status.authenticated) else {
        return "Not logged in.".to_string();
    };

    let mut text = format!("Logged in as {} <{}>", user.name, user.email);
    if let Some(remaining) = status.remaining_absolute {
        text.push_str(&format!(", session ends in {}", format_remaining(remaining)));
    }
    if let Some(idle) = status.remaining_inactivity {
        text.push_str(&format!(", idle logout in {}", format_remaining(idle)));
    }
    if status.warning_active {
        text.push_str(" (expiry warning active)");
    }
    text.push('.');
    text
}

fn say(out: &Output, line: impl Into<String>) {
    let _ = out.send(line.into());
}
