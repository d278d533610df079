// src/core/models.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;

/// Message returned with every successful scan.
pub const MSG_TARGET_SCANNED: &str = "Target scanned!";
/// Message returned when the scanner could not run or exited abnormally.
pub const MSG_SCAN_FAILED: &str = "Failed to scan target.";
/// Message returned when the scanner finished but its report was unusable.
pub const MSG_SCAN_ERROR: &str = "Error on scan.";
/// Message returned by the last-resort fault handler.
pub const MSG_INTERNAL_ERROR: &str = "Internal server error";

// --- Request ---

/// A single inbound scan request.
///
/// `target` is opaque (hostname or IP address). Its shape is never validated
/// by the core; the value is handed to the scanner as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScanRequest {
    pub target: String,
}

// --- Parsed Report ---

/// A network address reported by the scanner, e.g. `{ addr: "10.0.0.1", family: "ipv4" }`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub addr: String,
    pub family: String,
}

impl Address {
    /// MAC addresses share the `<address>` element with IP addresses.
    pub fn is_ip(&self) -> bool {
        matches!(self.family.as_str(), "ipv4" | "ipv6")
    }
}

/// A single operating-system guess with its accuracy score (0-100).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsMatch {
    pub name: String,
    pub accuracy: u8,
}

/// One probed port, whatever its state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Port {
    pub id: u16,
    pub protocol: String,
    pub state: String,
    pub service_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl Port {
    pub fn is_open(&self) -> bool {
        self.state == "open"
    }
}

/// Timing and summary figures from the scanner's closing `runstats` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStats {
    pub elapsed_seconds: Option<f64>,
    pub summary: Option<String>,
    pub exit: Option<String>,
}

/// Metadata about the scanner run itself, read from the root element.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScannerInfo {
    pub version: Option<String>,
    pub args: Option<String>,
    pub start_time: Option<i64>,
}

/// The normalized view of one scanner report.
///
/// Every list only holds the entries the parser could locate; absent or
/// malformed sections leave the list empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedReport {
    pub scanner: ScannerInfo,
    pub host_status: Option<String>,
    /// The host-hint address if one was reported, otherwise the primary host's.
    pub address: Option<Address>,
    /// Every address of the primary host, including non-IP ones.
    pub addresses: Vec<Address>,
    pub hostnames: Vec<String>,
    pub os_matches: Vec<OsMatch>,
    pub ports: Vec<Port>,
    pub run_stats: Option<RunStats>,
}

impl ParsedReport {
    /// The address enrichment should run against, if the scanner found one.
    pub fn discovered_address(&self) -> Option<&str> {
        self.address.as_ref().map(|a| a.addr.as_str())
    }

    /// Returns the OS guess with the highest accuracy. Ties keep the first entry.
    pub fn best_os_match(&self) -> Option<&OsMatch> {
        self.os_matches.iter().reduce(|best, candidate| {
            if candidate.accuracy > best.accuracy {
                candidate
            } else {
                best
            }
        })
    }

    /// Ports whose state is exactly `open`, in report order.
    pub fn open_ports(&self) -> impl Iterator<Item = &Port> {
        self.ports.iter().filter(|p| p.is_open())
    }
}

// --- Enrichment ---

/// Organization metadata for an IP address, as returned by the lookup service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpInfo {
    #[serde(default)]
    pub query: String,
    pub status: String,
    #[serde(default)]
    pub isp: String,
    #[serde(default)]
    pub org: String,
    #[serde(rename = "as", default)]
    pub asn: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl IpInfo {
    /// Placeholder returned when there is no address to look up.
    pub fn unknown() -> Self {
        Self {
            query: "unknown".to_string(),
            status: "success".to_string(),
            isp: "unknown".to_string(),
            org: "unknown".to_string(),
            asn: "unknown".to_string(),
            message: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

/// Hosting platform inferred from IP organization metadata.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "kebab-case")]
pub enum HostingProvider {
    Cloudflare,
    Vercel,
    #[strum(serialize = "AWS")]
    Aws,
    #[strum(serialize = "Google Cloud")]
    GoogleCloud,
    Azure,
    DigitalOcean,
    #[default]
    Unknown,
}

/// Combined outcome of the two enrichment lookups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichmentResult {
    pub is_behind_cdn: bool,
    pub ip_info: Option<IpInfo>,
    pub hosting_provider: HostingProvider,
}

impl Default for EnrichmentResult {
    fn default() -> Self {
        Self {
            is_behind_cdn: false,
            ip_info: Some(IpInfo::unknown()),
            hosting_provider: HostingProvider::Unknown,
        }
    }
}

// --- Outcome ---

/// Everything returned alongside a successful scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanData {
    pub report: ParsedReport,
    pub cloudflare_detected: bool,
    pub ip_info: Option<IpInfo>,
    pub hosting_provider: HostingProvider,
    pub os_guess: Option<OsMatch>,
    pub open_ports: Vec<Port>,
    pub scanned_at: DateTime<Utc>,
}

impl ScanData {
    pub fn new(report: ParsedReport, enrichment: EnrichmentResult) -> Self {
        let os_guess = report.best_os_match().cloned();
        let open_ports = report.open_ports().cloned().collect();
        Self {
            report,
            cloudflare_detected: enrichment.is_behind_cdn,
            ip_info: enrichment.ip_info,
            hosting_provider: enrichment.hosting_provider,
            os_guess,
            open_ports,
            scanned_at: Utc::now(),
        }
    }
}

/// The terminal value handed back to the transport layer.
///
/// `data` is either fully present (`success == true`) or absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanOutcome {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<ScanData>,
}

impl ScanOutcome {
    pub fn success(data: ScanData) -> Self {
        Self {
            success: true,
            message: MSG_TARGET_SCANNED.to_string(),
            data: Some(data),
        }
    }

    pub fn failure(message: &str) -> Self {
        Self {
            success: false,
            message: message.to_string(),
            data: None,
        }
    }

    pub fn internal_error() -> Self {
        Self::failure(MSG_INTERNAL_ERROR)
    }
}
