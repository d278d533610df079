// src/core/enrichment/mod.rs

//! Best-effort hosting attribution for a discovered address.
//!
//! Two independent lookups run concurrently: a plain-HTTP probe looking for a
//! CDN signature header, and an IP organization lookup. Each one degrades to
//! its default on failure; neither can fail the scan.

pub mod cdn_probe;
pub mod ip_lookup;
pub mod provider;

use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};
use url::Url;

use crate::core::errors::EnrichmentError;
use crate::core::models::EnrichmentResult;

use self::cdn_probe::{detect_cdn, probe_url};
use self::ip_lookup::lookup_ip_info;

/// Anything that can attribute an address. The handler depends on this seam
/// rather than on the HTTP-backed resolver.
#[async_trait]
pub trait Enrich: Send + Sync {
    async fn enrich(&self, address: Option<&str>) -> EnrichmentResult;
}

#[derive(Debug, Clone)]
pub struct EnrichmentSettings {
    /// Base URL of the IP metadata service; the address is appended as a path segment.
    pub ip_info_url: Url,
    /// Response header whose presence marks a CDN-fronted address.
    pub cdn_header: String,
    /// Port of the plain-HTTP probe, normally 80.
    pub cdn_probe_port: u16,
    /// Applies to each lookup separately.
    pub timeout: Duration,
}

/// The HTTP-backed [`Enrich`] implementation.
#[derive(Debug, Clone)]
pub struct EnrichmentResolver {
    client: reqwest::Client,
    settings: EnrichmentSettings,
}

impl EnrichmentResolver {
    pub fn new(settings: EnrichmentSettings) -> Result<Self, EnrichmentError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .timeout(settings.timeout)
            .build()
            .map_err(EnrichmentError::Client)?;
        Ok(Self { client, settings })
    }

    async fn probe(&self, address: &str) -> bool {
        let result = match probe_url(address, self.settings.cdn_probe_port) {
            Ok(url) => detect_cdn(&self.client, url, &self.settings.cdn_header).await,
            Err(e) => Err(e),
        };
        result.unwrap_or_else(|e| {
            warn!(address, error = %e, "CDN probe failed, assuming no CDN.");
            false
        })
    }
}

#[async_trait]
impl Enrich for EnrichmentResolver {
    async fn enrich(&self, address: Option<&str>) -> EnrichmentResult {
        let Some(address) = address else {
            info!("No address discovered, returning placeholder enrichment.");
            return EnrichmentResult::default();
        };

        let (is_behind_cdn, ip_info) = tokio::join!(
            self.probe(address),
            lookup_ip_info(&self.client, &self.settings.ip_info_url, address)
        );

        let ip_info = match ip_info {
            Ok(info) => Some(info),
            Err(e) => {
                warn!(address, error = %e, "IP lookup failed, omitting IP info.");
                None
            }
        };
        let hosting_provider = provider::classify(ip_info.as_ref());

        info!(address, is_behind_cdn, provider = %hosting_provider, "Enrichment finished.");
        EnrichmentResult {
            is_behind_cdn,
            ip_info,
            hosting_provider,
        }
    }
}

#[cfg(test)]
pub(crate) async fn spawn_local_server(router: axum::Router) -> std::net::SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::{HostingProvider, IpInfo};
    use axum::extract::Path;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::{Json, Router};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn closed_port() -> u16 {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        port
    }

    fn settings(ip_info_url: Url, cdn_probe_port: u16) -> EnrichmentSettings {
        EnrichmentSettings {
            ip_info_url,
            cdn_header: "cf-ray".to_string(),
            cdn_probe_port,
            timeout: Duration::from_secs(2),
        }
    }

    fn unreachable_settings() -> EnrichmentSettings {
        let ip_info_url = Url::parse(&format!("http://127.0.0.1:{}/json", closed_port())).unwrap();
        settings(ip_info_url, closed_port())
    }

    async fn cdn_fronted_server() -> u16 {
        let router = Router::new().route(
            "/",
            get(|| async { (StatusCode::FORBIDDEN, [("cf-ray", "8d1f2a3b4c5d-AMS")], "blocked") }),
        );
        spawn_local_server(router).await.port()
    }

    async fn metadata_server() -> Url {
        let router = Router::new().route(
            "/json/{address}",
            get(|Path(address): Path<String>| async move {
                Json(json!({
                    "status": "success",
                    "query": address,
                    "isp": "Amazon.com, Inc.",
                    "org": "AWS EC2 (us-east-1)",
                    "as": "AS14618 Amazon.com, Inc.",
                }))
            }),
        );
        let addr = spawn_local_server(router).await;
        Url::parse(&format!("http://{}/json", addr)).unwrap()
    }

    #[tokio::test]
    async fn absent_address_returns_placeholder_without_lookups() {
        let resolver = EnrichmentResolver::new(unreachable_settings()).unwrap();
        let result = resolver.enrich(None).await;

        assert_eq!(result.is_behind_cdn, false);
        assert_eq!(result.ip_info, Some(IpInfo::unknown()));
        assert_eq!(result.hosting_provider, HostingProvider::Unknown);
    }

    #[tokio::test]
    async fn unreachable_metadata_service_yields_no_ip_info() {
        let resolver = EnrichmentResolver::new(unreachable_settings()).unwrap();
        let result = resolver.enrich(Some("127.0.0.1")).await;

        assert_eq!(result.ip_info, None);
        assert_eq!(result.hosting_provider, HostingProvider::Unknown);
        assert!(!result.is_behind_cdn);
    }

    #[tokio::test]
    async fn detected_cdn_survives_failed_ip_lookup() {
        let unreachable = unreachable_settings().ip_info_url;
        let resolver = EnrichmentResolver::new(settings(unreachable, cdn_fronted_server().await)).unwrap();

        let result = resolver.enrich(Some("127.0.0.1")).await;

        assert!(result.is_behind_cdn);
        assert_eq!(result.ip_info, None);
        assert_eq!(result.hosting_provider, HostingProvider::Unknown);
    }

    #[tokio::test]
    async fn ip_info_survives_failed_cdn_probe() {
        let resolver = EnrichmentResolver::new(settings(metadata_server().await, closed_port())).unwrap();

        let result = resolver.enrich(Some("127.0.0.1")).await;

        assert!(!result.is_behind_cdn);
        assert_eq!(result.ip_info.as_ref().map(|i| i.query.as_str()), Some("127.0.0.1"));
        assert_eq!(result.hosting_provider, HostingProvider::Aws);
    }
}
