//! Environment configuration for the StructIQe server.
//! The hosted-service URL and anonymous key are required; everything else
//! has a default matching the deployed setup.

use std::path::PathBuf;

use anyhow::{Context, Result};

/// Browser origins allowed by the CORS layer. The frontends are local dev
/// servers on fixed ports.
pub const ALLOWED_ORIGINS: &[&str] = &[
    "http://localhost:5173",
    "http://localhost:3000",
    "http://localhost:5174",
];

pub const DEFAULT_HTTP_PORT: u16 = 3001;
pub const DEFAULT_STATE_DIR: &str = ".structiqe";

#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the hosted database service.
    pub supabase_url: String,
    /// Anonymous API key sent with every service call.
    pub supabase_anon_key: String,
    pub http_port: u16,
    /// Root directory for the durable session store.
    pub state_dir: PathBuf,
    /// When true, sign-in is rejected with 403 if the subject has no
    /// effective-access row. Off by default: the deployed system signs
    /// operators in with the fallback role instead.
    pub require_access_grant: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let supabase_url = std::env::var("SUPABASE_URL")
            .context("Missing SUPABASE_URL in environment")?;
        let supabase_anon_key = std::env::var("SUPABASE_ANON_KEY")
            .context("Missing SUPABASE_ANON_KEY in environment")?;

        let http_port = match std::env::var("STRUCTIQE_HTTP_PORT") {
            Ok(v) => v.parse::<u16>().with_context(|| format!("Invalid STRUCTIQE_HTTP_PORT: {v}"))?,
            Err(_) => DEFAULT_HTTP_PORT,
        };
        let state_dir = std::env::var("STRUCTIQE_STATE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_STATE_DIR));
        let require_access_grant = std::env::var("STRUCTIQE_REQUIRE_ACCESS_GRANT")
            .map(|v| parse_bool_flag(&v))
            .unwrap_or(false);

        Ok(Config {
            supabase_url,
            supabase_anon_key,
            http_port,
            state_dir,
            require_access_grant,
        })
    }
}

pub fn parse_bool_flag(v: &str) -> bool {
    matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
