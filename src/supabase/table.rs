//! Table API of the hosted service: filtered/ordered selects, merge upserts
//! keyed on a conflict target, and filter deletes. Shapes pass through as
//! JSON rows; the callers own any typing.

use anyhow::{anyhow, Context, Result};
use reqwest::header::{HeaderValue, ACCEPT};
use reqwest::Url;

use super::SupabaseClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

impl Order {
    fn suffix(self) -> &'static str {
        match self {
            Order::Asc => "asc",
            Order::Desc => "desc",
        }
    }
}

/// Builder for a single-table select. Filters are equality-only, which is all
/// the app needs.
pub struct TableQuery<'a> {
    client: &'a SupabaseClient,
    table: String,
    select: Option<String>,
    filters: Vec<(String, String)>,
    order: Option<(String, Order)>,
    bearer: Option<String>,
}

impl SupabaseClient {
    pub fn from_table(&self, table: &str) -> TableQuery<'_> {
        TableQuery {
            client: self,
            table: table.to_string(),
            select: None,
            filters: Vec::new(),
            order: None,
            bearer: None,
        }
    }

    /// Upsert one row with a conflict target; the existing row's fields are
    /// overwritten. Returns the row representation(s) the service echoes back.
    pub async fn upsert(
        &self,
        table: &str,
        on_conflict: &str,
        row: &serde_json::Value,
        bearer: Option<&str>,
    ) -> Result<Vec<serde_json::Value>> {
        let mut url = self.endpoint(&format!("/rest/v1/{table}"))?;
        url.set_query(Some(&format!("on_conflict={on_conflict}")));
        let mut headers = self.service_headers(bearer);
        headers.insert(
            "Prefer",
            HeaderValue::from_static("resolution=merge-duplicates,return=representation"),
        );
        let resp = self.http().post(url).headers(headers).json(row).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow!("upsert into {table} failed: HTTP {status}: {body}"));
        }
        resp.json::<Vec<serde_json::Value>>()
            .await
            .with_context(|| format!("upsert into {table}: representation was not a JSON array"))
    }

    /// Delete all rows matching the equality filters. Deleting nothing is
    /// still success.
    pub async fn delete_matching(
        &self,
        table: &str,
        filters: &[(&str, &str)],
        bearer: Option<&str>,
    ) -> Result<()> {
        let mut url = self.endpoint(&format!("/rest/v1/{table}"))?;
        let query = filters
            .iter()
            .map(|(c, v)| format!("{c}=eq.{}", urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        url.set_query(Some(&query));
        let mut headers = self.service_headers(bearer);
        headers.insert("Prefer", HeaderValue::from_static("return=minimal"));
        let resp = self.http().delete(url).headers(headers).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow!("delete from {table} failed: HTTP {status}: {body}"));
        }
        Ok(())
    }
}

impl TableQuery<'_> {
    pub fn select(mut self, cols: &str) -> Self {
        self.select = Some(cols.to_string());
        self
    }

    pub fn eq(mut self, col: &str, value: &str) -> Self {
        self.filters.push((col.to_string(), value.to_string()));
        self
    }

    pub fn order(mut self, col: &str, order: Order) -> Self {
        self.order = Some((col.to_string(), order));
        self
    }

    /// Run the query as a signed-in subject instead of anonymously.
    pub fn bearer(mut self, token: &str) -> Self {
        self.bearer = Some(token.to_string());
        self
    }

    fn build_url(&self) -> Result<Url> {
        let mut url = self.client.endpoint(&format!("/rest/v1/{}", self.table))?;
        let mut parts: Vec<String> = Vec::new();
        if let Some(s) = &self.select {
            parts.push(format!("select={}", urlencoding::encode(s)));
        }
        for (c, v) in &self.filters {
            parts.push(format!("{c}=eq.{}", urlencoding::encode(v)));
        }
        if let Some((c, o)) = &self.order {
            parts.push(format!("order={c}.{}", o.suffix()));
        }
        if parts.is_empty() {
            url.set_query(None);
        } else {
            url.set_query(Some(&parts.join("&")));
        }
        Ok(url)
    }

    /// Fetch all matching rows as a JSON array.
    pub async fn fetch_rows(self) -> Result<Vec<serde_json::Value>> {
        let url = self.build_url()?;
        let resp = self
            .client
            .http()
            .get(url)
            .headers(self.client.service_headers(self.bearer.as_deref()))
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow!("select from {} failed: HTTP {status}: {body}", self.table));
        }
        resp.json::<Vec<serde_json::Value>>()
            .await
            .with_context(|| format!("select from {}: body was not a JSON array", self.table))
    }

    /// Fetch at most one row. Absence is `None`, not an error: the service
    /// reports zero-or-many as 406 under the single-object representation.
    pub async fn fetch_single(self) -> Result<Option<serde_json::Value>> {
        let url = self.build_url()?;
        let mut headers = self.client.service_headers(self.bearer.as_deref());
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.pgrst.object+json"));
        let resp = self.client.http().get(url).headers(headers).send().await?;
        let status = resp.status();
        if status.is_success() {
            let row = resp
                .json::<serde_json::Value>()
                .await
                .with_context(|| format!("select from {}: body was not JSON", self.table))?;
            return Ok(Some(row));
        }
        if status.as_u16() == 406 || status.as_u16() == 404 {
            return Ok(None);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(anyhow!("select from {} failed: HTTP {status}: {body}", self.table))
    }
}
