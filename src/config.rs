// src/config.rs

use std::net::SocketAddr;
use std::time::Duration;

use clap::{ArgAction, Parser};
use url::Url;

use crate::api::rate_limit::RateLimitSettings;
use crate::core::enrichment::EnrichmentSettings;
use crate::core::profile::{PortSelection, ScanProfile};
use crate::core::scanner::ScannerSettings;

/// Runtime configuration. Every flag can also be set through its `RECON_API_*`
/// environment variable or a `.env` file.
#[derive(Debug, Clone, Parser)]
#[command(name = "recon-api", version, about = "Single-shot network reconnaissance over HTTP")]
pub struct Config {
    /// Address the HTTP server listens on.
    #[arg(long, env = "RECON_API_BIND", default_value = "0.0.0.0:3001")]
    pub bind: SocketAddr,

    /// Scanner binary to run.
    #[arg(long, env = "RECON_API_NMAP_PATH", default_value = "nmap")]
    pub nmap_path: String,

    /// Run the scanner through `sudo -n` (SYN, UDP and OS detection need raw sockets).
    #[arg(long, env = "RECON_API_SUDO")]
    pub sudo: bool,

    #[arg(long, env = "RECON_API_SYN_SCAN", default_value_t = true, action = ArgAction::Set)]
    pub syn_scan: bool,

    #[arg(long, env = "RECON_API_UDP_SCAN", default_value_t = true, action = ArgAction::Set)]
    pub udp_scan: bool,

    /// Timing template, 0 (paranoid) to 5 (insane).
    #[arg(long, env = "RECON_API_TIMING", default_value_t = 4, value_parser = clap::value_parser!(u8).range(0..=5))]
    pub timing: u8,

    /// Number of most common ports to probe. Ignored when `--ports` is given.
    #[arg(long, env = "RECON_API_TOP_PORTS", default_value_t = 1000)]
    pub top_ports: u16,

    /// Explicit port spec, e.g. `22,80,8000-8100`.
    #[arg(long, env = "RECON_API_PORTS")]
    pub ports: Option<String>,

    #[arg(long, env = "RECON_API_OS_DETECTION", default_value_t = true, action = ArgAction::Set)]
    pub os_detection: bool,

    #[arg(long, env = "RECON_API_SERVICE_DETECTION")]
    pub service_detection: bool,

    /// Scanner script to run against the target.
    #[arg(long, env = "RECON_API_SCRIPT")]
    pub script: Option<String>,

    /// Base URL of the IP metadata service.
    #[arg(long, env = "RECON_API_IP_INFO_URL", default_value = "http://ip-api.com/json")]
    pub ip_info_url: Url,

    /// Response header that marks a CDN-fronted address.
    #[arg(long, env = "RECON_API_CDN_HEADER", default_value = "cf-ray")]
    pub cdn_header: String,

    /// Port the plain-HTTP CDN probe connects to.
    #[arg(long, env = "RECON_API_CDN_PROBE_PORT", default_value_t = 80)]
    pub cdn_probe_port: u16,

    #[arg(long, env = "RECON_API_ENRICHMENT_TIMEOUT_SECS", default_value_t = 10)]
    pub enrichment_timeout_secs: u64,

    /// Stop scans still running after this many seconds. `0` disables the deadline.
    #[arg(long, env = "RECON_API_SCAN_TIMEOUT_SECS", default_value_t = 600)]
    pub scan_timeout_secs: u64,

    /// Requests each client IP may make per window. `0` disables limiting.
    #[arg(long, env = "RECON_API_RATE_LIMIT_MAX", default_value_t = 3)]
    pub rate_limit_max: u32,

    #[arg(long, env = "RECON_API_RATE_LIMIT_WINDOW_SECS", default_value_t = 60)]
    pub rate_limit_window_secs: u64,
}

impl Config {
    pub fn scan_profile(&self) -> ScanProfile {
        let ports = match &self.ports {
            Some(spec) if !spec.trim().is_empty() => PortSelection::List(spec.trim().to_string()),
            _ => PortSelection::Top(self.top_ports),
        };
        ScanProfile {
            syn_scan: self.syn_scan,
            udp_scan: self.udp_scan,
            timing: self.timing,
            ports,
            os_detection: self.os_detection,
            service_detection: self.service_detection,
            script: self.script.clone().filter(|s| !s.trim().is_empty()),
        }
    }

    pub fn scanner_settings(&self) -> ScannerSettings {
        ScannerSettings {
            binary: self.nmap_path.clone(),
            elevate: self.sudo,
        }
    }

    pub fn enrichment_settings(&self) -> EnrichmentSettings {
        EnrichmentSettings {
            ip_info_url: self.ip_info_url.clone(),
            cdn_header: self.cdn_header.to_ascii_lowercase(),
            cdn_probe_port: self.cdn_probe_port,
            timeout: Duration::from_secs(self.enrichment_timeout_secs),
        }
    }

    pub fn scan_deadline(&self) -> Option<Duration> {
        (self.scan_timeout_secs > 0).then(|| Duration::from_secs(self.scan_timeout_secs))
    }

    pub fn rate_limit_settings(&self) -> RateLimitSettings {
        RateLimitSettings {
            max_requests: self.rate_limit_max,
            window: Duration::from_secs(self.rate_limit_window_secs),
        }
    }
}
