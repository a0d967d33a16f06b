//! Authentication API collaborator

use async_trait::async_trait;

use crate::error::Result;
use crate::protocol::{AckResponse, AuthResponse};

/// Remote authentication endpoints the session runtime depends on.
///
/// `login` and `verify_otp` report a wrong password or OTP as
/// `Ok(AuthResponse { success: false, .. })`. `Err` is reserved for
/// transport failures and malformed responses. `refresh_session` has no
/// body worth returning; a refused token is `Error::Rejected`.
#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn login(&self, email: &str, password: &str) -> Result<AuthResponse>;

    async fn send_otp(&self, name: &str, email: &str) -> Result<AckResponse>;

    async fn verify_otp(&self, email: &str, otp: &str, password: &str) -> Result<AuthResponse>;

    async fn refresh_session(&self, token: &str) -> Result<()>;
}
