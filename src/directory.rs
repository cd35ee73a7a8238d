//! Read-only directory projections: the company list and the per-company
//! employee rows with their effective access, both served straight from the
//! hosted views.

use std::sync::Arc;

use crate::error::AppResult;
use crate::supabase::table::Order;
use crate::supabase::SupabaseClient;

pub const COMPANIES_TABLE: &str = "companies";
pub const EMPLOYEES_VIEW: &str = "employees_effective_access_mat";

pub struct Directory {
    client: Arc<SupabaseClient>,
}

impl Directory {
    pub fn new(client: Arc<SupabaseClient>) -> Self {
        Self { client }
    }

    /// All companies as {id, name}, sorted by name.
    pub async fn companies(&self) -> AppResult<Vec<serde_json::Value>> {
        let rows = self
            .client
            .from_table(COMPANIES_TABLE)
            .select("id, name")
            .order("name", Order::Asc)
            .fetch_rows()
            .await?;
        Ok(rows)
    }

    /// Employee-access rows for one company, sorted by name.
    pub async fn employees(&self, company_id: &str) -> AppResult<Vec<serde_json::Value>> {
        let rows = self
            .client
            .from_table(EMPLOYEES_VIEW)
            .eq("company_id", company_id)
            .order("name", Order::Asc)
            .fetch_rows()
            .await?;
        Ok(rows)
    }
}
