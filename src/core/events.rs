// src/core/events.rs

use tokio::sync::mpsc::UnboundedSender;

use crate::core::models::ParsedReport;

/// Lifecycle milestones of one scan.
#[derive(Debug, Clone)]
pub enum ScanEvent {
    /// A full re-parse of everything the scanner printed so far. May be incomplete.
    Data(ParsedReport),
    /// A raw chunk of the scanner's standard error. Does not end the scan.
    Error(String),
    Complete(ParsedReport),
    Stopped,
}

/// Optional receiver side for scan progress. Emitting never blocks or fails.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<UnboundedSender<ScanEvent>>,
}

impl EventSink {
    pub fn new(tx: UnboundedSender<ScanEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// A sink that drops everything.
    pub fn none() -> Self {
        Self { tx: None }
    }

    /// True while someone is listening. Used to skip work nobody will see.
    pub fn is_attached(&self) -> bool {
        self.tx.as_ref().is_some_and(|tx| !tx.is_closed())
    }

    pub fn emit(&self, event: ScanEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}
