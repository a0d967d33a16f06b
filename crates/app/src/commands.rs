//! Console command parsing

use crate::session::ActivitySignal;

pub const HELP: &str = "\
Commands:
  login <email> <password>
  otp-send <email> <name...>
  otp-verify <email> <otp> <password>
  activity [kind]        record activity (click, key, scroll, ...)
  hide | show            window visibility changed
  focus | blur           window focus changed
  extend                 extend the session
  logout
  status
  help
  quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Login {
        email: String,
        password: String,
    },
    SendOtp {
        email: String,
        name: String,
    },
    VerifyOtp {
        email: String,
        otp: String,
        password: String,
    },
    Activity(ActivitySignal),
    Extend,
    Logout,
    Status,
    Help,
    Quit,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("Unknown command: {0} (try 'help')")]
    Unknown(String),

    #[error("Usage: {0}")]
    Usage(&'static str),

    #[error("{0}")]
    Signal(String),
}

/// Parse one input line. Blank lines are `Ok(None)`.
pub fn parse(line: &str) -> Result<Option<Command>, CommandError> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = words.collect();

    let command = match (verb.to_ascii_lowercase().as_str(), args.as_slice()) {
        ("login", [email, password]) => Command::Login {
            email: email.to_string(),
            password: password.to_string(),
        },
        ("login", _) => return Err(CommandError::Usage("login <email> <password>")),

        ("otp-send", [email, name @ ..]) if !name.is_empty() => Command::SendOtp {
            email: email.to_string(),
            name: name.join(" "),
        },
        ("otp-send", _) => return Err(CommandError::Usage("otp-send <email> <name...>")),

        ("otp-verify", [email, otp, password]) => Command::VerifyOtp {
            email: email.to_string(),
            otp: otp.to_string(),
            password: password.to_string(),
        },
        ("otp-verify", _) => {
            return Err(CommandError::Usage("otp-verify <email> <otp> <password>"))
        }

        ("activity", []) => Command::Activity(ActivitySignal::Click),
        ("activity", [kind]) => Command::Activity(kind.parse().map_err(CommandError::Signal)?),
        ("activity", _) => return Err(CommandError::Usage("activity [kind]")),

        ("hide", []) => Command::Activity(ActivitySignal::Hidden),
        ("show", []) => Command::Activity(ActivitySignal::Visible),
        ("focus", []) => Command::Activity(ActivitySignal::Focus),
        ("blur", []) => Command::Activity(ActivitySignal::Blur),
        ("extend", []) => Command::Extend,
        ("logout", []) => Command::Logout,
        ("status", []) => Command::Status,
        ("help" | "?", _) => Command::Help,
        ("quit" | "exit", _) => Command::Quit,

        (other, _) => return Err(CommandError::Unknown(other.to_string())),
    };
    Ok(Some(command))
}
