use anyhow::Context;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use sessiongate::config::AuthConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Init logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .context("building log filter")?;
    fmt().with_env_filter(filter).init();

    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    let http_port: u16 = std::env::var("SESSIONGATE_HTTP_PORT")
        .unwrap_or_else(|_| "7878".to_string())
        .parse()
        .context("SESSIONGATE_HTTP_PORT must be a port number")?;

    let config = match std::env::var("SESSIONGATE_CONFIG") {
        Ok(path) => AuthConfig::from_json_file(&path).with_context(|| format!("loading config from {path}"))?,
        Err(_) => AuthConfig::from_env()?,
    };
    info!(
        target: "sessiongate",
        "sessiongate starting: RUST_LOG='{}', http_port={}, session='{}', callback='{}'",
        rust_log, http_port, config.session_name, config.callback_url
    );

    sessiongate::server::run(config, http_port).await
}
