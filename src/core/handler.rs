// src/core/handler.rs

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::core::enrichment::Enrich;
use crate::core::errors::ScanError;
use crate::core::events::{EventSink, ScanEvent};
use crate::core::models::{ParsedReport, ScanData, ScanOutcome, ScanRequest};
use crate::core::profile::ScanProfile;
use crate::core::scanner::{Scanner, ScannerSettings};

/// Request-level orchestration: scan, then enrich, then assemble the outcome.
///
/// Every request gets its own [`Scanner`], so concurrent requests never share
/// an in-flight guard.
pub struct ScanHandler {
    scanner_settings: ScannerSettings,
    profile: ScanProfile,
    enricher: Arc<dyn Enrich>,
    deadline: Option<Duration>,
}

impl ScanHandler {
    pub fn new(scanner_settings: ScannerSettings, profile: ScanProfile, enricher: Arc<dyn Enrich>) -> Self {
        Self {
            scanner_settings,
            profile,
            enricher,
            deadline: None,
        }
    }

    /// Stops any scan still running after `deadline`. `None` waits forever.
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Runs one request to a terminal outcome. Scan failures are mapped to
    /// fixed messages; enrichment failures only degrade fields.
    pub async fn handle(&self, request: ScanRequest) -> ScanOutcome {
        let target = request.target;
        let scanner = Scanner::new(self.scanner_settings.clone());

        let (tx, rx) = mpsc::unbounded_channel();
        let progress = tokio::spawn(log_progress(target.clone(), rx));
        let result = self.run_scan(&scanner, &target, EventSink::new(tx)).await;
        join_progress(&target, progress).await;

        let report = match result {
            Ok(report) => report,
            Err(e) => {
                warn!(target = %target, error = %e, "Scan did not produce a report.");
                return ScanOutcome::failure(e.user_message());
            }
        };

        let enrichment = self.enricher.enrich(report.discovered_address()).await;
        info!(
            target = %target,
            address = ?report.discovered_address(),
            cdn = enrichment.is_behind_cdn,
            "Target scanned."
        );
        ScanOutcome::success(ScanData::new(report, enrichment))
    }

    async fn run_scan(&self, scanner: &Scanner, target: &str, events: EventSink) -> Result<ParsedReport, ScanError> {
        let scan = scanner.scan(&self.profile, target, events);
        let Some(deadline) = self.deadline else {
            return scan.await;
        };

        tokio::pin!(scan);
        tokio::select! {
            result = &mut scan => result,
            _ = tokio::time::sleep(deadline) => {
                warn!(target = %target, seconds = deadline.as_secs(), "Scan deadline reached, stopping.");
                scanner.stop();
                scan.await
            }
        }
    }
}

/// Waits for the progress task. Its failure is logged and never affects the outcome.
async fn join_progress(target: &str, progress: JoinHandle<()>) -> bool {
    match progress.await {
        Ok(()) => true,
        Err(e) => {
            warn!(target = %target, error = %e, "Progress logging task failed.");
            false
        }
    }
}

async fn log_progress(target: String, mut events: UnboundedReceiver<ScanEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            ScanEvent::Data(snapshot) => {
                debug!(target = %target, ports = snapshot.ports.len(), "Scan progress.")
            }
            ScanEvent::Error(text) => debug!(target = %target, stderr = %text.trim_end(), "Scanner stderr."),
            ScanEvent::Complete(report) => {
                debug!(target = %target, open_ports = report.open_ports().count(), "Scan report complete.")
            }
            ScanEvent::Stopped => debug!(target = %target, "Scan stopped."),
        }
    }
}
