//! PrepDeck Network Library
//!
//! Client side of the platform's authentication API.
//!
//! # Architecture
//!
//! - **AuthApi**: the collaborator trait the session runtime depends on
//! - **HttpAuthClient**: JSON over HTTP implementation
//! - **Protocol**: request and response bodies
//!
//! # Usage
//!
//! ```ignore
//! let client = HttpAuthClient::new(&config.api)?;
//! match client.login("asha@example.com", "secret").await?.outcome()? {
//!     AuthOutcome::Granted { token, user } => { /* store session */ }
//!     AuthOutcome::Denied { message } => { /* show message */ }
//! }
//! ```

pub mod api;
pub mod client;
pub mod error;
pub mod protocol;

pub use api::AuthApi;
pub use client::HttpAuthClient;
pub use error::{Error, Result};
pub use protocol::{AckResponse, AuthOutcome, AuthResponse};
