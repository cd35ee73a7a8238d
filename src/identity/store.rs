//! Durable session store: the persisted copy of the signed-in state, written
//! as three keyed entries under a state directory — the subject (JSON), the
//! access role (plain string) and the session bundle (JSON). The lifecycle
//! controller is the only writer.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::access::AccessGrant;
use super::session::Session;

const USER_ENTRY: &str = "user.json";
const ACCESS_ENTRY: &str = "access";
const SESSION_ENTRY: &str = "session.json";

#[derive(Debug, Serialize, Deserialize)]
struct StoredUser {
    id: String,
    email: String,
}

pub struct SessionStore {
    root: PathBuf,
}

impl SessionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Write the triple. Last write wins; there is no partial-write recovery
    /// beyond restore() treating an incomplete triple as logged-out.
    pub fn persist(&self, session: &Session, grant: &AccessGrant) -> Result<()> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("creating session store dir {}", self.root.display()))?;
        let user = StoredUser { id: session.user_id.clone(), email: session.email.clone() };
        fs::write(self.entry(USER_ENTRY), serde_json::to_vec(&user)?)
            .context("writing user entry")?;
        fs::write(self.entry(ACCESS_ENTRY), grant.role.as_bytes())
            .context("writing access entry")?;
        fs::write(self.entry(SESSION_ENTRY), serde_json::to_vec(session)?)
            .context("writing session entry")?;
        Ok(())
    }

    /// Read the triple back. Any absent or unreadable entry means logged-out.
    pub fn restore(&self) -> Option<(Session, AccessGrant)> {
        let user: StoredUser =
            serde_json::from_slice(&fs::read(self.entry(USER_ENTRY)).ok()?).ok()?;
        let role = String::from_utf8(fs::read(self.entry(ACCESS_ENTRY)).ok()?).ok()?;
        let session: Session =
            serde_json::from_slice(&fs::read(self.entry(SESSION_ENTRY)).ok()?).ok()?;
        let grant = AccessGrant { user_id: user.id, role };
        Some((session, grant))
    }

    /// Remove all three entries. Idempotent: absent entries are fine.
    pub fn clear(&self) {
        for name in [USER_ENTRY, ACCESS_ENTRY, SESSION_ENTRY] {
            if let Err(e) = fs::remove_file(self.entry(name)) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("failed to remove session entry {name}: {e}");
                }
            }
        }
    }
}
