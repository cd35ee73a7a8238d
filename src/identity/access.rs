use serde::{Deserialize, Serialize};

/// Role assigned when no effective-access row exists for a subject.
pub const FALLBACK_ROLE: &str = "employee";

/// Effective access for a subject: the role/position label the directory
/// assigns them. Recomputed on every sign-in, never stored on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessGrant {
    pub user_id: String,
    pub role: String,
}

impl AccessGrant {
    pub fn fallback(user_id: &str) -> Self {
        AccessGrant { user_id: user_id.to_string(), role: FALLBACK_ROLE.to_string() }
    }
}

/// Result of an effective-access lookup. `explicit` records whether a grant
/// row actually existed; the permissive sign-in path ignores it, the strict
/// one rejects on `false`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessResolution {
    pub grant: AccessGrant,
    pub explicit: bool,
}

/// Outcome of the best-effort identity-link side call made after
/// authentication. Never fails the parent operation; a skip carries the
/// reason for the diagnostic log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOutcome {
    Linked,
    Skipped(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_grant_uses_employee_role() {
        let g = AccessGrant::fallback("user-9");
        assert_eq!(g.role, "employee");
        assert_eq!(g.user_id, "user-9");
    }
}
