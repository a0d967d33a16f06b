//! HTTP client for the auth API

use std::time::Duration;

use async_trait::async_trait;
use prepdeck_core::ApiConfig;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::api::AuthApi;
use crate::error::{Error, Result};
use crate::protocol::{
    AckResponse, AuthResponse, LoginRequest, SendOtpRequest, VerifyOtpRequest,
};

const USER_AGENT: &str = concat!("prepdeck/", env!("CARGO_PKG_VERSION"));

/// JSON-over-HTTP implementation of `AuthApi`
pub struct HttpAuthClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAuthClient {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        info!(base_url = %config.base_url, "Created auth API client");

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }

    /// POST a JSON body and return the raw status and body text
    async fn exchange<B>(&self, path: &str, body: &B, bearer: Option<&str>) -> Result<(StatusCode, String)>
    where
        B: Serialize + ?Sized,
    {
        let url = self.endpoint(path);
        debug!(url = %url, "Auth API request");

        let mut request = self.client.post(&url).json(body);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        Ok((status, text))
    }

    /// POST a JSON body and parse the JSON reply.
    ///
    /// A 4xx whose body still parses as `R` is returned as `Ok` so the caller
    /// can read the server's `success: false` message.
    async fn post<B, R>(&self, path: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let (status, text) = self.exchange(path, body, None).await?;

        if status.is_success() {
            return serde_json::from_str(&text)
                .map_err(|e| Error::Protocol(format!("invalid response from {}: {}", path, e)));
        }

        if status.is_client_error() {
            if let Ok(parsed) = serde_json::from_str::<R>(&text) {
                return Ok(parsed);
            }
        }

        Err(failure(path, status, &text))
    }
}

#[async_trait]
impl AuthApi for HttpAuthClient {
    async fn login(&self, email: &str, password: &str) -> Result<AuthResponse> {
        let body = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        self.post("/auth/login", &body).await
    }

    async fn send_otp(&self, name: &str, email: &str) -> Result<AckResponse> {
        let body = SendOtpRequest {
            name: name.to_string(),
            email: email.to_string(),
        };
        self.post("/auth/send-otp", &body).await
    }

    async fn verify_otp(&self, email: &str, otp: &str, password: &str) -> Result<AuthResponse> {
        let body = VerifyOtpRequest {
            email: email.to_string(),
            otp: otp.to_string(),
            password: password.to_string(),
        };
        self.post("/auth/verify-otp", &body).await
    }

    async fn refresh_session(&self, token: &str) -> Result<()> {
        // Any 2xx counts, whatever the body
        let (status, text) = self
            .exchange("/auth/refresh", &serde_json::json!({}), Some(token))
            .await?;
        if status.is_success() {
            return Ok(());
        }
        Err(failure("/auth/refresh", status, &text))
    }
}

fn failure(path: &str, status: StatusCode, body: &str) -> Error {
    let error = classify_failure(status, body);
    warn!(path, error = %error, "Auth API request failed");
    error
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Turn a non-2xx response into an error
fn classify_failure(status: StatusCode, body: &str) -> Error {
    let message = extract_message(body)
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("Unknown error").to_string());

    if status.is_client_error() {
        Error::Rejected {
            status: status.as_u16(),
            message,
        }
    } else {
        Error::Server {
            status: status.as_u16(),
            message,
        }
    }
}

fn extract_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("message")
        .and_then(|m| m.as_str())
        .map(str::to_string)
}
