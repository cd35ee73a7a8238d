//! Session lifecycle controller: the single writer of the in-memory and
//! persisted session/access pair.
//!
//! States: `Unknown` (before the startup restore) → `LoggedOut` →
//! `Authenticating` → `LoggedIn`, back to `LoggedOut` on sign-out or on
//! expiry detected at restore time. Consumers never touch the state
//! directly; they read immutable snapshots.

use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};

use super::access::AccessGrant;
use super::provider::{AccessProvider, AuthError};
use super::session::Session;
use super::store::SessionStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Unknown,
    LoggedOut,
    Authenticating,
    LoggedIn,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CurrentUser {
    pub id: String,
    pub email: String,
}

/// Immutable view handed to consumers. `is_loading` is true only before the
/// startup restore resolves.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub user: Option<CurrentUser>,
    pub role: Option<String>,
    pub is_loading: bool,
}

#[derive(Debug, Error)]
pub enum SignInError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    /// Strict mode only: the subject has no effective-access row.
    #[error("No access assigned. Contact admin.")]
    NoAccessAssigned,
    #[error("failed to persist session: {0}")]
    Persist(String),
}

#[derive(Debug, Clone)]
pub struct SignInOk {
    pub session: Session,
    pub grant: AccessGrant,
}

struct Inner {
    state: LifecycleState,
    session: Option<Session>,
    grant: Option<AccessGrant>,
}

pub struct SessionController<P> {
    provider: P,
    store: SessionStore,
    require_grant: bool,
    inner: RwLock<Inner>,
}

impl<P: AccessProvider> SessionController<P> {
    pub fn new(provider: P, store: SessionStore, require_grant: bool) -> Self {
        Self {
            provider,
            store,
            require_grant,
            inner: RwLock::new(Inner {
                state: LifecycleState::Unknown,
                session: None,
                grant: None,
            }),
        }
    }

    /// Startup restore: adopt a persisted session that is still valid,
    /// otherwise clear the store. No stale session survives this.
    pub fn initialize(&self) {
        match self.store.restore() {
            Some((session, grant)) if session.is_valid(Utc::now()) => {
                info!("restored session for {}", session.email);
                let mut inner = self.inner.write();
                inner.session = Some(session);
                inner.grant = Some(grant);
                inner.state = LifecycleState::LoggedIn;
            }
            restored => {
                if restored.is_some() {
                    info!("persisted session expired, clearing");
                }
                self.store.clear();
                let mut inner = self.inner.write();
                inner.session = None;
                inner.grant = None;
                inner.state = LifecycleState::LoggedOut;
            }
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.inner.read().state
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let inner = self.inner.read();
        SessionSnapshot {
            user: inner
                .session
                .as_ref()
                .map(|s| CurrentUser { id: s.user_id.clone(), email: s.email.clone() }),
            role: inner.grant.as_ref().map(|g| g.role.clone()),
            is_loading: inner.state == LifecycleState::Unknown,
        }
    }

    pub fn current_session(&self) -> Option<Session> {
        self.inner.read().session.clone()
    }

    /// Authenticate, link the identity (best-effort), resolve access, persist
    /// and transition to `LoggedIn`. Any fatal failure transitions back to
    /// `LoggedOut` with the error surfaced.
    pub async fn sign_in(&self, email: &str, secret: &str) -> Result<SignInOk, SignInError> {
        self.inner.write().state = LifecycleState::Authenticating;
        let result = self.sign_in_flow(email, secret).await;
        let mut inner = self.inner.write();
        match result {
            Ok(ok) => {
                inner.state = LifecycleState::LoggedIn;
                inner.session = Some(ok.session.clone());
                inner.grant = Some(ok.grant.clone());
                Ok(ok)
            }
            Err(e) => {
                inner.state = LifecycleState::LoggedOut;
                inner.session = None;
                inner.grant = None;
                Err(e)
            }
        }
    }

    async fn sign_in_flow(&self, email: &str, secret: &str) -> Result<SignInOk, SignInError> {
        let session = self.provider.authenticate(email, secret).await?;
        match self.provider.link_identity(&session).await {
            super::access::LinkOutcome::Linked => {}
            super::access::LinkOutcome::Skipped(reason) => {
                warn!("identity link skipped for {}: {reason}", session.email);
            }
        }
        let resolution = self.provider.resolve_access(&session.user_id, &session).await;
        if self.require_grant && !resolution.explicit {
            return Err(SignInError::NoAccessAssigned);
        }
        self.store
            .persist(&session, &resolution.grant)
            .map_err(|e| SignInError::Persist(e.to_string()))?;
        info!("signed in {} as {}", session.email, resolution.grant.role);
        Ok(SignInOk { session, grant: resolution.grant })
    }

    /// Replace the current session wholesale via the provider's refresh
    /// grant. The access grant is kept; it is recomputed on sign-in only.
    pub async fn refresh_session(&self) -> Result<Session, AuthError> {
        let (session, grant) = {
            let inner = self.inner.read();
            match (&inner.session, &inner.grant) {
                (Some(s), Some(g)) => (s.clone(), g.clone()),
                _ => return Err(AuthError::MissingSession),
            }
        };
        let fresh = self.provider.refresh(&session).await?;
        if let Err(e) = self.store.persist(&fresh, &grant) {
            return Err(AuthError::Upstream(format!("failed to persist refreshed session: {e}")));
        }
        let mut inner = self.inner.write();
        inner.session = Some(fresh.clone());
        Ok(fresh)
    }

    /// Revoke at the provider (failure surfaced, never blocking), then clear
    /// the persisted triple and transition to `LoggedOut`.
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        let session = self.inner.read().session.clone();
        let revoke_result = match &session {
            Some(s) => self.provider.revoke(s).await,
            None => Ok(()),
        };
        if let Err(e) = &revoke_result {
            error!("provider sign-out failed: {e}");
        }
        self.store.clear();
        {
            let mut inner = self.inner.write();
            inner.session = None;
            inner.grant = None;
            inner.state = LifecycleState::LoggedOut;
        }
        revoke_result
    }
}
