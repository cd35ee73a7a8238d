use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Init logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    fmt().with_env_filter(filter).init();

    let cfg = structiqe::config::Config::from_env()?;

    // Startup banner at info level so something always prints at default verbosity
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    info!(
        target: "structiqe",
        "StructIQe starting: RUST_LOG='{}', http_port={}, state_dir='{}', require_access_grant={}",
        rust_log,
        cfg.http_port,
        cfg.state_dir.display(),
        cfg.require_access_grant
    );

    structiqe::server::run(cfg).await
}
