//!
//! Hosted database service client
//! ------------------------------
//! Thin client for the hosted Postgres stack the app runs against: the
//! identity endpoints under `auth/v1` (password/refresh grants, logout, RPC)
//! and the table API under `rest/v1` (filtered selects, merge upserts,
//! filter deletes).
//!
//! Every call sends the anonymous API key; calls made on behalf of a signed-in
//! subject additionally carry that subject's bearer token. Calls are single
//! round trips with no retry and no client-side timeout.

pub mod auth;
pub mod table;

use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Url;

#[derive(Clone)]
pub struct SupabaseClient {
    base: Url,
    anon_key: String,
    client: reqwest::Client,
}

impl SupabaseClient {
    pub fn new(base: &str, anon_key: &str) -> Result<Self> {
        let base = Url::parse(base).context("invalid service base URL")?;
        let client = reqwest::Client::new();
        Ok(Self { base, anon_key: anon_key.to_string(), client })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.client
    }

    pub(crate) fn endpoint(&self, path: &str) -> Result<Url> {
        self.base.join(path).with_context(|| format!("invalid service path: {path}"))
    }

    /// Standard headers for a service call: the anonymous key, plus a bearer
    /// token (the subject's token when given, the anonymous key otherwise).
    pub(crate) fn service_headers(&self, bearer: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Ok(v) = HeaderValue::from_str(&self.anon_key) {
            headers.insert("apikey", v);
        }
        let token = bearer.unwrap_or(&self.anon_key);
        if let Ok(v) = HeaderValue::from_str(&format!("Bearer {token}")) {
            headers.insert(AUTHORIZATION, v);
        }
        headers
    }
}
