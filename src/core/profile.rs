// src/core/profile.rs

use serde::{Deserialize, Serialize};

/// Which ports the scanner probes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortSelection {
    /// The scanner's N most common ports (`--top-ports N`).
    Top(u16),
    /// An explicit port spec passed through verbatim (`-p 22,80,8000-8100`).
    List(String),
}

impl Default for PortSelection {
    fn default() -> Self {
        PortSelection::Top(1000)
    }
}

/// The fixed set of probe parameters applied to every scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanProfile {
    pub syn_scan: bool,
    pub udp_scan: bool,
    /// Timing template, 0 (paranoid) to 5 (insane).
    pub timing: u8,
    pub ports: PortSelection,
    pub os_detection: bool,
    pub service_detection: bool,
    pub script: Option<String>,
}

impl Default for ScanProfile {
    fn default() -> Self {
        Self {
            syn_scan: true,
            udp_scan: true,
            timing: 4,
            ports: PortSelection::default(),
            os_detection: true,
            service_detection: false,
            script: None,
        }
    }
}

impl ScanProfile {
    /// Builds the scanner's argument list for one target.
    ///
    /// The order is fixed: probe types, timing, ports, detection flags,
    /// XML-to-stdout, then `--` and the target as a single trailing argument.
    /// The separator keeps a target starting with `-` from being read as an option.
    pub fn build_arguments(&self, target: &str) -> Vec<String> {
        let mut args: Vec<String> = Vec::new();

        if self.syn_scan {
            args.push("-sS".to_string());
        }
        if self.udp_scan {
            args.push("-sU".to_string());
        }

        args.push(format!("-T{}", self.timing.min(5)));

        match &self.ports {
            PortSelection::Top(count) => {
                args.push("--top-ports".to_string());
                args.push(count.to_string());
            }
            PortSelection::List(spec) => {
                args.push("-p".to_string());
                args.push(spec.clone());
            }
        }

        if self.os_detection {
            args.push("-O".to_string());
        }
        if self.service_detection {
            args.push("-sV".to_string());
        }
        if let Some(script) = &self.script {
            args.push(format!("--script={}", script));
        }

        args.push("-oX".to_string());
        args.push("-".to_string());
        args.push("--".to_string());
        args.push(target.to_string());

        args
    }
}
