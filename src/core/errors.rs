// src/core/errors.rs

use thiserror::Error;

use crate::core::models::{MSG_SCAN_ERROR, MSG_SCAN_FAILED};

/// Failures of a single scan, from spawning the process to parsing its report.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("a scan is already in progress on this scanner")]
    AlreadyInProgress,

    #[error("failed to run the scan process: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("scan process exited with code {exit_code:?}")]
    ProcessFailed {
        exit_code: Option<i32>,
        stderr_tail: String,
    },

    #[error("scan was stopped before it finished")]
    Stopped,

    #[error("scan report could not be parsed: {0}")]
    Parse(#[from] ParseError),
}

impl ScanError {
    /// The only text about this failure that may reach a client.
    pub fn user_message(&self) -> &'static str {
        match self {
            ScanError::Parse(_) => MSG_SCAN_ERROR,
            ScanError::AlreadyInProgress
            | ScanError::Spawn(_)
            | ScanError::ProcessFailed { .. }
            | ScanError::Stopped => MSG_SCAN_FAILED,
        }
    }
}

/// Raised only for a complete report that is not well-formed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("report is empty")]
    Empty,

    #[error("malformed report at byte {position}: {message}")]
    Malformed { position: u64, message: String },

    #[error("unexpected root element <{0}>")]
    UnexpectedRoot(String),

    #[error("report ended with {open_elements} unclosed element(s)")]
    Truncated { open_elements: usize },
}

/// Enrichment lookups never fail the request; these are only logged.
#[derive(Debug, Error)]
pub enum EnrichmentError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("CDN probe failed: {0}")]
    CdnProbe(#[source] reqwest::Error),

    #[error("IP lookup failed: {0}")]
    IpLookup(#[source] reqwest::Error),

    #[error("IP lookup rejected: {0}")]
    IpLookupRejected(String),

    #[error("invalid lookup URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}
