// src/main.rs

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use color_eyre::eyre::Result;
use tokio::net::TcpListener;
use tracing::{info, warn};

use recon_api::api::{self, rate_limit::RateLimiter};
use recon_api::config::Config;
use recon_api::core::enrichment::EnrichmentResolver;
use recon_api::core::handler::ScanHandler;
use recon_api::logging;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let env_file = dotenvy::dotenv().ok();
    let config = Config::parse();
    logging::initialize_logging()?;

    if let Some(path) = env_file {
        info!(path = %path.display(), "Loaded .env file.");
    }
    if !config.sudo && (config.syn_scan || config.udp_scan || config.os_detection) {
        warn!("SYN, UDP and OS detection need root; scans will fail unless the server runs privileged or --sudo is set.");
    }

    let enricher = EnrichmentResolver::new(config.enrichment_settings())?;
    let handler = ScanHandler::new(config.scanner_settings(), config.scan_profile(), Arc::new(enricher))
        .with_deadline(config.scan_deadline());
    let rate_limit = config.rate_limit_settings();
    let limiter = Arc::new(RateLimiter::new(rate_limit));
    limiter.clone().prune_every(rate_limit.window.max(Duration::from_secs(1)));
    let app = api::router(Arc::new(handler), limiter);

    let listener = TcpListener::bind(config.bind).await?;
    info!(address = %config.bind, "Listening.");
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped.");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal.");
        std::future::pending::<()>().await;
    }
}
