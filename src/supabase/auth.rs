//! Identity endpoints of the hosted service: token grants, logout and the
//! RPC surface used for post-login identity linking.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

use super::SupabaseClient;

#[derive(Debug, Clone, Deserialize)]
pub struct TokenUser {
    pub id: Option<String>,
    pub email: Option<String>,
}

/// Raw payload of a successful token grant. Fields the provider may omit are
/// optional here; the access-control layer decides what absence means.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_in: Option<i64>,
    pub user: Option<TokenUser>,
}

/// Outcome of a token request: the provider either granted a token bundle or
/// rejected the request with a human-readable message. Transport and server
/// failures surface as errors instead.
#[derive(Debug, Clone)]
pub enum TokenOutcome {
    Granted(TokenGrant),
    Rejected(String),
}

impl SupabaseClient {
    async fn token(&self, grant_type: &str, body: serde_json::Value) -> Result<TokenOutcome> {
        let url = self.endpoint(&format!("/auth/v1/token?grant_type={grant_type}"))?;
        let resp = self
            .http()
            .post(url)
            .headers(self.service_headers(None))
            .json(&body)
            .send()
            .await?;
        let status = resp.status();
        if status.is_success() {
            let grant: TokenGrant = resp.json().await.context("token response was not valid JSON")?;
            Ok(TokenOutcome::Granted(grant))
        } else if status.is_client_error() {
            let v: serde_json::Value = resp.json().await.unwrap_or_else(|_| serde_json::json!({}));
            Ok(TokenOutcome::Rejected(provider_message(&v)))
        } else {
            Err(anyhow!("token endpoint failed: HTTP {status}"))
        }
    }

    /// Password grant: the provider's sign-in.
    pub async fn token_password(&self, email: &str, password: &str) -> Result<TokenOutcome> {
        self.token("password", serde_json::json!({ "email": email, "password": password }))
            .await
    }

    /// Refresh grant: exchanges a refresh token for a fresh bundle. Sessions
    /// are replaced wholesale with the result.
    pub async fn token_refresh(&self, refresh_token: &str) -> Result<TokenOutcome> {
        self.token("refresh_token", serde_json::json!({ "refresh_token": refresh_token }))
            .await
    }

    /// Provider-side sign-out for the given access token. Failures surface to
    /// the caller; nothing is retried.
    pub async fn logout(&self, access_token: &str) -> Result<()> {
        let url = self.endpoint("/auth/v1/logout")?;
        let resp = self
            .http()
            .post(url)
            .headers(self.service_headers(Some(access_token)))
            .send()
            .await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let v: serde_json::Value = resp.json().await.unwrap_or_else(|_| serde_json::json!({}));
        Err(anyhow!("logout failed: {}", provider_message(&v)))
    }

    /// Invoke a database RPC as the given subject.
    pub async fn rpc(&self, name: &str, access_token: &str) -> Result<()> {
        let url = self.endpoint(&format!("/rest/v1/rpc/{name}"))?;
        let resp = self
            .http()
            .post(url)
            .headers(self.service_headers(Some(access_token)))
            .json(&serde_json::json!({}))
            .send()
            .await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        Err(anyhow!("rpc {name} failed: HTTP {status}: {body}"))
    }
}

/// Best-effort extraction of the provider's error message. The identity
/// endpoints have used several body shapes across versions.
pub(crate) fn provider_message(v: &serde_json::Value) -> String {
    for key in ["error_description", "msg", "message", "error"] {
        if let Some(s) = v.get(key).and_then(|x| x.as_str()) {
            if !s.is_empty() {
                return s.to_string();
            }
        }
    }
    "authentication failed".to_string()
}
