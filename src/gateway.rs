//! Feature-override gateway: thin CRUD over the per-employee override table.
//! No business rules beyond the (employee, feature) identity key; rows pass
//! through as the service returns them.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::supabase::table::Order;
use crate::supabase::SupabaseClient;

pub const OVERRIDES_TABLE: &str = "employee_feature_overrides";

/// One override row. Unique per (employee_id, feature_key); upsert overwrites
/// `allow` and `created_at` on conflict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureOverride {
    pub employee_id: String,
    pub feature_key: String,
    pub allow: bool,
    pub created_at: DateTime<Utc>,
}

pub struct OverrideGateway {
    client: Arc<SupabaseClient>,
}

impl OverrideGateway {
    pub fn new(client: Arc<SupabaseClient>) -> Self {
        Self { client }
    }

    /// All overrides, newest first. An empty table is an empty list.
    pub async fn list(&self) -> AppResult<Vec<serde_json::Value>> {
        let rows = self
            .client
            .from_table(OVERRIDES_TABLE)
            .order("created_at", Order::Desc)
            .fetch_rows()
            .await?;
        Ok(rows)
    }

    /// Upsert one override keyed on (employee_id, feature_key). Returns the
    /// stored row, or echoes the payload when the service returns no
    /// representation.
    pub async fn upsert(
        &self,
        employee_id: &str,
        feature_key: &str,
        allow: bool,
    ) -> AppResult<serde_json::Value> {
        let row = FeatureOverride {
            employee_id: employee_id.to_string(),
            feature_key: feature_key.to_string(),
            allow,
            created_at: Utc::now(),
        };
        let payload = serde_json::to_value(&row)
            .map_err(|e| AppError::internal("serialize_override".to_string(), e.to_string()))?;
        let stored = self
            .client
            .upsert(OVERRIDES_TABLE, "employee_id,feature_key", &payload, None)
            .await?;
        Ok(stored.into_iter().next().unwrap_or(payload))
    }

    /// Delete by key. Matching nothing is still success.
    pub async fn remove(&self, employee_id: &str, feature_key: &str) -> AppResult<()> {
        self.client
            .delete_matching(
                OVERRIDES_TABLE,
                &[("employee_id", employee_id), ("feature_key", feature_key)],
                None,
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_serializes_with_snake_case_columns() {
        let row = FeatureOverride {
            employee_id: "42".into(),
            feature_key: "darkMode".into(),
            allow: true,
            created_at: Utc::now(),
        };
        let v = serde_json::to_value(&row).unwrap();
        assert_eq!(v["employee_id"], "42");
        assert_eq!(v["feature_key"], "darkMode");
        assert_eq!(v["allow"], true);
        assert!(v["created_at"].is_string());
    }
}
