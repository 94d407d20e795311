//! Atrium realtime navigation server

use anyhow::Context;
use atrium_core::{
    HmacTokenVerifier, InMemoryPreferences, SystemClock, TracingAnalyticsSink, TracingArchiveSink,
};
use atrium_gateway::{AtriumConfig, Gateway, MapBundle, ServerEffects};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "atrium-server")]
#[command(about = "Indoor positioning and navigation gateway", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Map bundle (JSON)
    #[arg(short, long)]
    map: PathBuf,

    /// Listen address, overriding the configuration
    #[arg(short, long)]
    listen: Option<String>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Environment variable holding the token signing key
    #[arg(long, default_value = "ATRIUM_TOKEN_KEY")]
    token_key_env: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .context("invalid log filter")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = match &cli.config {
        Some(path) => AtriumConfig::load(path)?,
        None => AtriumConfig::default(),
    };
    if let Some(listen) = cli.listen {
        config.gateway.listen_addr = listen;
    }

    let map = MapBundle::load(&cli.map)?.build()?;
    let key = std::env::var(&cli.token_key_env)
        .with_context(|| format!("{} is not set", cli.token_key_env))?;

    let effects = ServerEffects {
        verifier: Arc::new(HmacTokenVerifier::new(key.as_bytes())?),
        preferences: Arc::new(InMemoryPreferences::new()),
        archive: Arc::new(TracingArchiveSink),
        analytics: Arc::new(TracingAnalyticsSink),
        clock: Arc::new(SystemClock),
        spatial: None,
    };
    let gateway = Gateway::assemble(config, map, effects)?;
    let listener = gateway.bind().await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received");
            let _ = shutdown_tx.send(true);
        }
    });

    gateway.serve(listener, shutdown_rx).await?;
    tracing::info!("Server stopped");
    Ok(())
}
