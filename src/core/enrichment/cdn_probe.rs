// src/core/enrichment/cdn_probe.rs

use std::net::IpAddr;

use reqwest::header::HeaderMap;
use tracing::{debug, info};
use url::Url;

use crate::core::errors::EnrichmentError;

/// Builds the plain-HTTP probe URL for an address, bracketing IPv6 literals.
/// Port 80 is left implicit.
pub fn probe_url(address: &str, port: u16) -> Result<Url, EnrichmentError> {
    let host = match address.parse::<IpAddr>() {
        Ok(IpAddr::V6(v6)) => format!("[{}]", v6),
        _ => address.to_string(),
    };
    Ok(Url::parse(&format!("http://{}:{}/", host, port))?)
}

/// Checks whether `name` is present in the response headers.
fn has_header(headers: &HeaderMap, name: &str) -> bool {
    match headers.get(name) {
        Some(value) => {
            debug!(header_name = name, value = ?value, "Signature header found.");
            true
        }
        None => {
            debug!(header_name = name, "Signature header not found.");
            false
        }
    }
}

/// Probes `url` over plain HTTP and looks for the CDN signature header.
///
/// Only an erroring response (4xx/5xx) is inspected for `signature_header`;
/// a successful response always yields `false`. Transport failures (refused
/// connection, DNS, timeout) are returned as [`EnrichmentError::CdnProbe`].
pub async fn detect_cdn(
    client: &reqwest::Client,
    url: Url,
    signature_header: &str,
) -> Result<bool, EnrichmentError> {
    info!(url = %url, "Starting CDN probe.");

    let response = client
        .get(url.clone())
        .send()
        .await
        .map_err(EnrichmentError::CdnProbe)?;
    let status = response.status();

    if status.is_client_error() || status.is_server_error() {
        let detected = has_header(response.headers(), signature_header);
        info!(url = %url, status = %status, detected, "CDN probe got an error response.");
        Ok(detected)
    } else {
        info!(url = %url, status = %status, "CDN probe got a non-error response.");
        Ok(false)
    }
}
