// src/lib.rs

//! Single-shot network reconnaissance: run an external port/OS scan against a
//! target, normalize its report, attribute the discovered address to a
//! hosting platform, and serve the result over HTTP.

pub mod api;
pub mod config;
pub mod core;
pub mod logging;
