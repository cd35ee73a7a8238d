use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// TTL applied when the provider omits `expires_in`.
pub const DEFAULT_TTL_SECS: i64 = 3600;

/// An authenticated session. Immutable: refresh and re-login replace the
/// whole value, nothing mutates one in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
    pub email: String,
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Build a session from a provider grant. `expires_at` is the issue
    /// instant plus the provider-reported TTL, defaulting to one hour.
    pub fn issue(
        user_id: String,
        email: String,
        access_token: String,
        refresh_token: Option<String>,
        issued_at: DateTime<Utc>,
        ttl_secs: Option<i64>,
    ) -> Self {
        let ttl = ttl_secs.unwrap_or(DEFAULT_TTL_SECS);
        Session {
            user_id,
            email,
            access_token,
            refresh_token,
            issued_at,
            expires_at: issued_at + Duration::seconds(ttl),
        }
    }

    /// A session is valid iff the current time is strictly before expiry.
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}
