// src/core/enrichment/ip_lookup.rs

use tracing::{debug, info};
use url::Url;

use crate::core::errors::EnrichmentError;
use crate::core::models::IpInfo;

/// Fields requested from the metadata service.
pub const IP_INFO_FIELDS: &str = "status,message,query,isp,org,as";

/// Builds `<base>/<address>?fields=...`.
pub fn lookup_url(base: &Url, address: &str) -> Result<Url, EnrichmentError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| EnrichmentError::IpLookupRejected(format!("{} cannot carry a path", base)))?
        .pop_if_empty()
        .push(address);
    url.query_pairs_mut().append_pair("fields", IP_INFO_FIELDS);
    Ok(url)
}

/// Queries the IP metadata service for `address`.
///
/// Any transport error, non-2xx status, undecodable body or a body whose
/// `status` is not `"success"` is an error.
pub async fn lookup_ip_info(
    client: &reqwest::Client,
    base: &Url,
    address: &str,
) -> Result<IpInfo, EnrichmentError> {
    let url = lookup_url(base, address)?;
    info!(address, url = %url, "Starting IP lookup.");

    let info: IpInfo = client
        .get(url)
        .send()
        .await
        .and_then(|response| response.error_for_status())
        .map_err(EnrichmentError::IpLookup)?
        .json()
        .await
        .map_err(EnrichmentError::IpLookup)?;

    if !info.is_success() {
        let reason = info.message.clone().unwrap_or_else(|| info.status.clone());
        return Err(EnrichmentError::IpLookupRejected(reason));
    }

    debug!(address, org = %info.org, isp = %info.isp, "IP lookup finished.");
    Ok(info)
}
