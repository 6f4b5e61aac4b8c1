//! Session verification against the account site.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use komob_common::Reason;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::db::kv::SessionLookup;
use crate::error::ServerError;

/// Why a session could not be turned into a verified user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum VerifyError {
    #[error("credentials rejected")]
    Credentials,
    /// The session belongs to a client the backend considers incompatible.
    /// The handshake already rejects unsupported announced versions before
    /// verifying, so `AccountVerifier` never returns this itself.
    #[error("unsupported protocol version")]
    Version,
    #[error("verification backend unavailable")]
    Unavailable,
}

impl VerifyError {
    /// Reason code reported to the client.
    pub fn reason(&self) -> Reason {
        match self {
            VerifyError::Credentials => Reason::Credentials,
            VerifyError::Version => Reason::Version,
            VerifyError::Unavailable => Reason::Unavailable,
        }
    }
}

/// Turns a session token into a verified user id.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, session_token: &str) -> Result<String, VerifyError>;
}

/// The part of the account API's user record the verifier reads.
#[derive(Debug, Deserialize)]
struct AccountRecord {
    #[serde(default)]
    is_active: Value,
}

/// Verifier backed by the session store and the account API's
/// `GET /api/user/<id>/json/` endpoint.
pub struct AccountVerifier {
    lookup: Arc<dyn SessionLookup>,
    http: reqwest::Client,
    base_url: Url,
}

impl AccountVerifier {
    pub fn new(
        lookup: Arc<dyn SessionLookup>,
        base_url: &str,
        timeout: Duration,
    ) -> Result<Self, ServerError> {
        let base_url =
            Url::parse(base_url).map_err(|e| ServerError::AccountUrl(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(ServerError::AccountUrl(base_url.to_string()));
        }
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            lookup,
            http,
            base_url,
        })
    }

    /// `<base>/api/user/<percent-encoded id>/json/`
    fn user_url(&self, user_id: &str) -> Option<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .ok()?
            .pop_if_empty()
            .extend(["api", "user", user_id, "json", ""]);
        Some(url)
    }
}

#[async_trait]
impl IdentityVerifier for AccountVerifier {
    async fn verify(&self, session_token: &str) -> Result<String, VerifyError> {
        let user_id = match self.lookup.user_id(session_token).await {
            Ok(Some(id)) => id,
            Ok(None) => {
                tracing::warn!("unknown session token");
                return Err(VerifyError::Credentials);
            }
            Err(e) => {
                tracing::error!(?e, "session lookup failed");
                return Err(VerifyError::Unavailable);
            }
        };

        let url = self.user_url(&user_id).ok_or(VerifyError::Unavailable)?;
        let response = self.http.get(url).send().await.map_err(|e| {
            tracing::error!(?e, %user_id, "error contacting account API");
            VerifyError::Unavailable
        })?;

        let status = response.status();
        if status.is_client_error() {
            tracing::warn!(%user_id, %status, "user not found in account API");
            return Err(VerifyError::Credentials);
        }
        if status != StatusCode::OK {
            tracing::error!(%user_id, %status, "error contacting account API");
            return Err(VerifyError::Unavailable);
        }

        let body = response.text().await.map_err(|e| {
            tracing::error!(?e, %user_id, "account API body read failed");
            VerifyError::Unavailable
        })?;
        let account: AccountRecord = serde_json::from_str(&body).map_err(|_| {
            tracing::warn!(%user_id, payload = %body, "could not parse account JSON");
            VerifyError::Unavailable
        })?;

        if is_truthy(&account.is_active) {
            Ok(user_id)
        } else {
            tracing::warn!(%user_id, "account is not active");
            Err(VerifyError::Credentials)
        }
    }
}

/// JSON truthiness: `null`, `false`, `0` and `""` are false.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
