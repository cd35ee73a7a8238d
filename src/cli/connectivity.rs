//! Remote session for the admin console: signs in through the StructIQe HTTP
//! API and keeps the client-local copy of the signed-in state in the durable
//! session store, restoring and expiry-checking it on open.

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use reqwest::Url;

use crate::identity::{AccessGrant, Session, SessionStore, FALLBACK_ROLE};

pub struct ApiSession {
    base: Url,
    client: reqwest::Client,
    store: SessionStore,
    current: Option<(Session, AccessGrant)>,
}

impl ApiSession {
    /// Open against the API base URL, restoring any persisted session that is
    /// still valid. An expired one is cleared, same as a fresh start.
    pub fn open(base: &str, state_dir: impl Into<PathBuf>) -> Result<Self> {
        let base = Url::parse(base).context("invalid API base URL")?;
        let client = reqwest::Client::new();
        let store = SessionStore::new(state_dir);
        let current = match store.restore() {
            Some((s, g)) if s.is_valid(Utc::now()) => Some((s, g)),
            Some(_) => {
                store.clear();
                None
            }
            None => None,
        };
        Ok(Self { base, client, store, current })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    pub fn current(&self) -> Option<(&Session, &AccessGrant)> {
        self.current.as_ref().map(|(s, g)| (s, g))
    }

    pub fn is_signed_in(&self) -> bool {
        matches!(&self.current, Some((s, _)) if s.is_valid(Utc::now()))
    }

    /// POST /api/signin and adopt the returned session. Returns the server's
    /// message on success.
    pub async fn sign_in(&mut self, email: &str, password: &str) -> Result<String> {
        let url = self.base.join("/api/signin")?;
        let resp = self
            .client
            .post(url)
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await?;
        let status = resp.status();
        let v: serde_json::Value =
            resp.json().await.unwrap_or(serde_json::json!({ "success": false }));
        if !status.is_success() || v.get("success").and_then(|s| s.as_bool()) != Some(true) {
            let msg = v.get("message").and_then(|m| m.as_str()).unwrap_or("sign-in failed");
            return Err(anyhow!("sign-in failed: {msg} (HTTP {status})"));
        }
        let session_value = v
            .get("session")
            .cloned()
            .ok_or_else(|| anyhow!("sign-in response missing session"))?;
        let session: Session =
            serde_json::from_value(session_value).context("sign-in response session did not parse")?;
        let role = v
            .get("access")
            .and_then(|a| a.as_str())
            .unwrap_or(FALLBACK_ROLE)
            .to_string();
        let grant = AccessGrant { user_id: session.user_id.clone(), role };
        self.store.persist(&session, &grant)?;
        let message = v
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("Login successful")
            .to_string();
        self.current = Some((session, grant));
        Ok(message)
    }

    /// POST /api/signout. The local state clears regardless; a server-side
    /// failure is surfaced afterwards.
    pub async fn sign_out(&mut self) -> Result<()> {
        let url = self.base.join("/api/signout")?;
        let resp = self.client.post(url).send().await;
        self.store.clear();
        self.current = None;
        let resp = resp?;
        if !resp.status().is_success() {
            let v: serde_json::Value = resp.json().await.unwrap_or(serde_json::json!({}));
            let msg = v.get("message").and_then(|m| m.as_str()).unwrap_or("sign-out failed");
            return Err(anyhow!("{msg}"));
        }
        Ok(())
    }

    fn require_signed_in(&self) -> Result<()> {
        if self.is_signed_in() {
            Ok(())
        } else {
            Err(anyhow!("not signed in (or session expired); run `signin <email> <password>` first"))
        }
    }

    async fn get_json(&self, path: &str) -> Result<serde_json::Value> {
        let url = self.base.join(path)?;
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        let v: serde_json::Value = resp
            .json()
            .await
            .unwrap_or(serde_json::json!({ "message": "invalid response body" }));
        if !status.is_success() {
            return Err(anyhow!("remote error (HTTP {status}): {v}"));
        }
        Ok(v)
    }

    pub async fn companies(&self) -> Result<serde_json::Value> {
        self.require_signed_in()?;
        self.get_json("/api/companies").await
    }

    pub async fn employees(&self, company_id: &str) -> Result<serde_json::Value> {
        self.require_signed_in()?;
        self.get_json(&format!("/api/companies/{company_id}/employees")).await
    }

    pub async fn overrides(&self) -> Result<serde_json::Value> {
        self.require_signed_in()?;
        self.get_json("/api/overrides").await
    }

    pub async fn set_override(
        &self,
        employee_id: &str,
        feature_key: &str,
        allow: bool,
    ) -> Result<serde_json::Value> {
        self.require_signed_in()?;
        let url = self.base.join(&format!("/api/overrides/{employee_id}/{feature_key}"))?;
        let resp = self
            .client
            .put(url)
            .json(&serde_json::json!({ "allow": allow }))
            .send()
            .await?;
        let status = resp.status();
        let v: serde_json::Value = resp.json().await.unwrap_or(serde_json::json!({}));
        if !status.is_success() {
            return Err(anyhow!("remote error (HTTP {status}): {v}"));
        }
        Ok(v)
    }

    pub async fn clear_override(&self, employee_id: &str, feature_key: &str) -> Result<()> {
        self.require_signed_in()?;
        let url = self.base.join(&format!("/api/overrides/{employee_id}/{feature_key}"))?;
        let resp = self.client.delete(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let v: serde_json::Value = resp.json().await.unwrap_or(serde_json::json!({}));
            return Err(anyhow!("remote error (HTTP {status}): {v}"));
        }
        Ok(())
    }
}
