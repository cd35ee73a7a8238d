//! Access-control client: wraps the external identity provider (sign-in,
//! sign-out, refresh) and the row-level effective-access lookup.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tracing::warn;

use super::access::{AccessGrant, AccessResolution, LinkOutcome, FALLBACK_ROLE};
use super::session::Session;
use crate::supabase::auth::TokenOutcome;
use crate::supabase::SupabaseClient;

#[derive(Debug, Error)]
pub enum AuthError {
    /// The provider rejected the credential pair; carries its message.
    #[error("{0}")]
    InvalidCredentials(String),
    /// The provider reported success but omitted the session data.
    #[error("Invalid session")]
    MissingSession,
    /// The provider reported success but omitted the subject id.
    #[error("Missing user ID")]
    MissingSubject,
    /// Any other failure from the provider or transport.
    #[error("{0}")]
    Upstream(String),
}

/// Seam between the session lifecycle and the external identity/database
/// service. One implementation talks to the hosted stack; tests script their
/// own.
#[async_trait]
pub trait AccessProvider: Send + Sync {
    async fn authenticate(&self, email: &str, secret: &str) -> Result<Session, AuthError>;

    /// Best-effort: associate the authenticated subject with its directory
    /// record. Must not fail the parent sign-in.
    async fn link_identity(&self, session: &Session) -> LinkOutcome;

    /// Look up the subject's effective access. Lookup failure and absence
    /// both resolve to the fallback grant; `explicit` distinguishes them.
    async fn resolve_access(&self, subject_id: &str, session: &Session) -> AccessResolution;

    /// Exchange the session's refresh token for a fresh session.
    async fn refresh(&self, session: &Session) -> Result<Session, AuthError>;

    async fn revoke(&self, session: &Session) -> Result<(), AuthError>;
}

pub struct SupabaseAccessProvider {
    client: Arc<SupabaseClient>,
}

impl SupabaseAccessProvider {
    pub fn new(client: Arc<SupabaseClient>) -> Self {
        Self { client }
    }

    fn session_from_grant(
        grant: crate::supabase::auth::TokenGrant,
        fallback_email: &str,
    ) -> Result<Session, AuthError> {
        let access_token = grant.access_token.ok_or(AuthError::MissingSession)?;
        let user = grant.user.ok_or(AuthError::MissingSession)?;
        let user_id = match user.id {
            Some(id) if !id.is_empty() => id,
            _ => return Err(AuthError::MissingSubject),
        };
        let email = user.email.unwrap_or_else(|| fallback_email.to_string());
        Ok(Session::issue(
            user_id,
            email,
            access_token,
            grant.refresh_token,
            Utc::now(),
            grant.expires_in,
        ))
    }
}

#[async_trait]
impl AccessProvider for SupabaseAccessProvider {
    async fn authenticate(&self, email: &str, secret: &str) -> Result<Session, AuthError> {
        let outcome = self
            .client
            .token_password(email.trim(), secret)
            .await
            .map_err(|e| AuthError::Upstream(e.to_string()))?;
        match outcome {
            TokenOutcome::Rejected(msg) => Err(AuthError::InvalidCredentials(msg)),
            TokenOutcome::Granted(grant) => Self::session_from_grant(grant, email.trim()),
        }
    }

    async fn link_identity(&self, session: &Session) -> LinkOutcome {
        match self.client.rpc("link_employee_to_auth", &session.access_token).await {
            Ok(()) => LinkOutcome::Linked,
            // Already-linked subjects land here too; the caller records the
            // diagnostic and moves on.
            Err(e) => LinkOutcome::Skipped(e.to_string()),
        }
    }

    async fn resolve_access(&self, subject_id: &str, session: &Session) -> AccessResolution {
        let lookup = self
            .client
            .from_table("effective_access")
            .eq("user_id", subject_id)
            .bearer(&session.access_token)
            .fetch_single()
            .await;
        match lookup {
            Ok(Some(row)) => {
                let role = row
                    .get("position")
                    .and_then(|v| v.as_str())
                    .unwrap_or(FALLBACK_ROLE)
                    .to_string();
                AccessResolution {
                    grant: AccessGrant { user_id: subject_id.to_string(), role },
                    explicit: true,
                }
            }
            Ok(None) => {
                warn!("no effective-access row for {subject_id}, using fallback role");
                AccessResolution { grant: AccessGrant::fallback(subject_id), explicit: false }
            }
            Err(e) => {
                warn!("effective-access lookup failed for {subject_id}: {e}, using fallback role");
                AccessResolution { grant: AccessGrant::fallback(subject_id), explicit: false }
            }
        }
    }

    async fn refresh(&self, session: &Session) -> Result<Session, AuthError> {
        let token = session
            .refresh_token
            .as_deref()
            .ok_or_else(|| AuthError::Upstream("session has no refresh token".into()))?;
        let outcome = self
            .client
            .token_refresh(token)
            .await
            .map_err(|e| AuthError::Upstream(e.to_string()))?;
        match outcome {
            TokenOutcome::Rejected(msg) => Err(AuthError::InvalidCredentials(msg)),
            TokenOutcome::Granted(grant) => Self::session_from_grant(grant, &session.email),
        }
    }

    async fn revoke(&self, session: &Session) -> Result<(), AuthError> {
        self.client
            .logout(&session.access_token)
            .await
            .map_err(|e| AuthError::Upstream(e.to_string()))
    }
}
