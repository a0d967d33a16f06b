//! Auth API message types
//!
//! All bodies are JSON. Every response carries a `success` flag and an
//! optional human-readable `message`.

use prepdeck_core::UserProfile;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// `POST /auth/login`
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// `POST /auth/send-otp`
#[derive(Debug, Clone, Serialize)]
pub struct SendOtpRequest {
    pub name: String,
    pub email: String,
}

/// `POST /auth/verify-otp`
#[derive(Debug, Clone, Serialize)]
pub struct VerifyOtpRequest {
    pub email: String,
    pub otp: String,
    pub password: String,
}

/// Response to login and OTP verification
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    pub success: bool,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub user: Option<UserProfile>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Response carrying only a status
#[derive(Debug, Clone, Deserialize)]
pub struct AckResponse {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

/// What an `AuthResponse` amounts to
#[derive(Debug, Clone)]
pub enum AuthOutcome {
    Granted { token: String, user: UserProfile },
    Denied { message: String },
}

impl AuthResponse {
    /// Interpret the response. A `success` without token or user is a
    /// protocol error, not a denial.
    pub fn outcome(self) -> Result<AuthOutcome> {
        if !self.success {
            return Ok(AuthOutcome::Denied {
                message: self
                    .message
                    .unwrap_or_else(|| "Authentication failed".to_string()),
            });
        }

        match (self.token, self.user) {
            (Some(token), Some(user)) if !token.is_empty() => {
                Ok(AuthOutcome::Granted { token, user })
            }
            _ => Err(Error::Protocol(
                "successful auth response without token or user".to_string(),
            )),
        }
    }
}
