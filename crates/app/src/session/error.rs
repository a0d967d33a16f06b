//! Session runtime errors

/// Why a login, OTP request or extension did not go through
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The server answered `success: false`
    #[error("{0}")]
    Rejected(String),

    #[error("Network error: {0}")]
    Network(#[from] prepdeck_net::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] prepdeck_core::Error),

    #[error("Not logged in")]
    NotAuthenticated,

    /// A logout or new login happened while the request was in flight
    #[error("Session changed during the request")]
    SessionChanged,
}
