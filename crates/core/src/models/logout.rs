//! Why a session ended

use std::fmt;

use serde::{Deserialize, Serialize};

/// Reason passed to `logout`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogoutReason {
    /// Absolute session lifetime elapsed
    Timeout,
    /// No user activity within the inactivity window
    Inactivity,
    /// User logged out or declined the expiry warning
    Manual,
    /// Server rejected the token, the token went missing, or the record is corrupt
    SessionInvalid,
    /// Network failure while refreshing
    SessionError,
}

impl LogoutReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Inactivity => "inactivity",
            Self::Manual => "manual",
            Self::SessionInvalid => "session_invalid",
            Self::SessionError => "session_error",
        }
    }

    /// Whether the presentation layer should explain the logout
    pub fn is_expiry(self) -> bool {
        matches!(self, Self::Timeout | Self::Inactivity)
    }

    /// Whether the user initiated this logout
    pub fn is_silent(self) -> bool {
        self == Self::Manual
    }
}

impl fmt::Display for LogoutReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names() {
        assert_eq!(
            serde_json::to_string(&LogoutReason::SessionInvalid).unwrap(),
            "\"session_invalid\""
        );
        assert_eq!(LogoutReason::SessionError.to_string(), "session_error");
    }

    #[test]
    fn test_classification() {
        assert!(LogoutReason::Timeout.is_expiry());
        assert!(LogoutReason::Inactivity.is_expiry());
        assert!(!LogoutReason::SessionInvalid.is_expiry());
        assert!(LogoutReason::Manual.is_silent());
        assert!(!LogoutReason::SessionError.is_silent());
    }
}
