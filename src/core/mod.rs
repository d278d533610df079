// src/core/mod.rs

/// Request, report, enrichment and outcome types shared by every layer.
pub mod models;

/// Typed failures of scanning, parsing and enrichment.
pub mod errors;

/// Progress events emitted while a scan runs.
pub mod events;

/// The fixed scan profile and its argument list.
pub mod profile;

/// Scanner XML report parsing.
pub mod parser;

/// Spawning the scanner process and streaming its output.
pub mod runner;

/// The single-scan state machine.
pub mod scanner;

/// CDN detection and IP organization lookup.
pub mod enrichment;

/// Scan, enrich and assemble one request's outcome.
pub mod handler;
