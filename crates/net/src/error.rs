//! Auth API error types

/// Auth API result type
pub type Result<T> = std::result::Result<T, Error>;

/// Auth API errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl Error {
    /// The server looked at the request and refused it (4xx).
    ///
    /// Everything else is a transport or server failure the caller may
    /// treat as transient.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Error::Rejected { .. })
    }
}
