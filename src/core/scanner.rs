// src/core/scanner.rs

use std::sync::{Mutex, MutexGuard};

use strum::Display;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::core::errors::ScanError;
use crate::core::events::{EventSink, ScanEvent};
use crate::core::models::ParsedReport;
use crate::core::parser;
use crate::core::profile::ScanProfile;
use crate::core::runner;

/// Where a [`Scanner`] is in its lifecycle.
///
/// `Completed`, `Failed` and `Stopped` behave like `Idle`: a new scan may start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ScanState {
    Idle,
    Running,
    Completed,
    Failed,
    Stopped,
}

/// How the scanner binary is invoked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannerSettings {
    pub binary: String,
    pub elevate: bool,
}

impl Default for ScannerSettings {
    fn default() -> Self {
        Self {
            binary: "nmap".to_string(),
            elevate: false,
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: ScanState,
    stop_tx: Option<oneshot::Sender<()>>,
}

/// Drives one external scan at a time.
///
/// The in-flight guard is per instance: two scanners never contend, and a
/// second `scan()` on a busy instance fails with [`ScanError::AlreadyInProgress`].
#[derive(Debug)]
pub struct Scanner {
    settings: ScannerSettings,
    inner: Mutex<Inner>,
}

impl Scanner {
    pub fn new(settings: ScannerSettings) -> Self {
        Self {
            settings,
            inner: Mutex::new(Inner {
                state: ScanState::Idle,
                stop_tx: None,
            }),
        }
    }

    pub fn state(&self) -> ScanState {
        self.lock().state
    }

    pub fn is_scanning(&self) -> bool {
        self.state() == ScanState::Running
    }

    /// Runs one scan of `target` with `profile` and returns the parsed report.
    ///
    /// Progress is reported through `events`: `Data` snapshots and `Error`
    /// chunks while running, then `Complete` or `Stopped`.
    pub async fn scan(
        &self,
        profile: &ScanProfile,
        target: &str,
        events: EventSink,
    ) -> Result<ParsedReport, ScanError> {
        let stop_rx = self.begin()?;
        let mut in_flight = InFlight {
            scanner: self,
            outcome: ScanState::Stopped,
        };

        let args = profile.build_arguments(target);
        info!(
            target = %target,
            binary = %self.settings.binary,
            elevated = self.settings.elevate,
            "Starting scan."
        );

        // The stop receiver is consumed by the runner, so once it returns the
        // process exit has been observed and `stop()` can no longer reach it.
        let result = runner::run(
            &self.settings.binary,
            &args,
            self.settings.elevate,
            &events,
            stop_rx,
        )
        .await
        .and_then(|raw| parser::parse(&raw).map_err(ScanError::from));

        in_flight.outcome = match &result {
            Ok(_) => ScanState::Completed,
            Err(ScanError::Stopped) => ScanState::Stopped,
            Err(_) => ScanState::Failed,
        };
        drop(in_flight);

        match &result {
            Ok(report) => {
                info!(target = %target, ports = report.ports.len(), "Scan completed.");
                events.emit(ScanEvent::Complete(report.clone()));
            }
            Err(ScanError::Stopped) => {
                info!(target = %target, "Scan stopped.");
                events.emit(ScanEvent::Stopped);
            }
            Err(e) => warn!(target = %target, error = %e, "Scan failed."),
        }

        result
    }

    /// Asks the in-flight scan to terminate its process.
    ///
    /// Returns `false`, doing nothing, when no scan is running or its process
    /// has already exited. Safe to call from any task.
    pub fn stop(&self) -> bool {
        let mut inner = self.lock();
        if inner.state != ScanState::Running {
            return false;
        }
        match inner.stop_tx.take() {
            Some(tx) => tx.send(()).is_ok(),
            None => false,
        }
    }

    fn begin(&self) -> Result<oneshot::Receiver<()>, ScanError> {
        let mut inner = self.lock();
        if inner.state == ScanState::Running {
            return Err(ScanError::AlreadyInProgress);
        }
        let (stop_tx, stop_rx) = oneshot::channel();
        inner.state = ScanState::Running;
        inner.stop_tx = Some(stop_tx);
        Ok(stop_rx)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Leaves `Running` however the scan future ends, including when it is dropped.
struct InFlight<'a> {
    scanner: &'a Scanner,
    outcome: ScanState,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut inner = self.scanner.lock();
        debug!(from = %inner.state, to = %self.outcome, "Scanner state settled.");
        inner.state = self.outcome;
        inner.stop_tx = None;
    }
}
