#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use recon_api::core::enrichment::Enrich;
use recon_api::core::models::EnrichmentResult;
use recon_api::core::scanner::ScannerSettings;
use tempfile::TempDir;

pub const SINGLE_PORT_REPORT: &str = include_str!("../fixtures/single_port.xml");
pub const SCANME_REPORT: &str = include_str!("../fixtures/scanme.xml");

/// A shell script standing in for the scanner binary. It records its
/// arguments, writes a line to stderr, prints `report` in two chunks and
/// exits with `exit_code`.
pub struct FakeScanner {
    dir: TempDir,
    pub path: PathBuf,
}

impl FakeScanner {
    pub fn new(report: &str, exit_code: i32) -> Self {
        Self::with_delay(report, exit_code, 0.0)
    }

    pub fn with_delay(report: &str, exit_code: i32, delay_secs: f32) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let report_path = dir.path().join("report.xml");
        let invocations_path = dir.path().join("invocations");
        fs::write(&report_path, report).unwrap();

        let split = report.len() / 2;
        let script = format!(
            "#!/bin/sh\n\
             echo \"$@\" >> '{invocations}'\n\
             echo 'Starting fake scan' >&2\n\
             sleep {delay}\n\
             head -c {split} '{report}'\n\
             sleep 0.05\n\
             tail -c +{rest} '{report}'\n\
             exit {code}\n",
            invocations = invocations_path.display(),
            report = report_path.display(),
            delay = delay_secs,
            split = split,
            rest = split + 1,
            code = exit_code,
        );

        let path = dir.path().join("fake-nmap");
        fs::write(&path, script).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();

        Self { dir, path }
    }

    pub fn settings(&self) -> ScannerSettings {
        ScannerSettings {
            binary: self.path.display().to_string(),
            elevate: false,
        }
    }

    /// One entry per process spawned, holding its argument line.
    pub fn invocations(&self) -> Vec<String> {
        fs::read_to_string(self.dir.path().join("invocations"))
            .map(|text| text.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }
}

/// A wrapper script that forks the real work into a background child and
/// waits on it, the way `sudo` sits in front of the scanner.
pub struct ForkingScanner {
    dir: TempDir,
    pub path: PathBuf,
}

impl ForkingScanner {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let pid_path = dir.path().join("inner.pid");
        let script = format!(
            "#!/bin/sh\n\
             sleep 37.5 &\n\
             echo $! > '{pid}'\n\
             wait\n",
            pid = pid_path.display(),
        );

        let path = dir.path().join("fake-sudo-nmap");
        fs::write(&path, script).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();

        Self { dir, path }
    }

    pub fn settings(&self) -> ScannerSettings {
        ScannerSettings {
            binary: self.path.display().to_string(),
            elevate: false,
        }
    }

    /// Pid of the forked child, once the wrapper has written it.
    pub fn inner_pid(&self) -> Option<u32> {
        fs::read_to_string(self.dir.path().join("inner.pid"))
            .ok()
            .and_then(|text| text.trim().parse().ok())
    }
}

/// Whether `pid` is a live process. Zombies count as exited.
#[cfg(target_os = "linux")]
pub fn process_alive(pid: u32) -> bool {
    match fs::read_to_string(format!("/proc/{}/stat", pid)) {
        Ok(stat) => stat
            .rsplit(')')
            .next()
            .map(|rest| !rest.trim_start().starts_with('Z'))
            .unwrap_or(false),
        Err(_) => false,
    }
}

/// Records the addresses it was asked about and returns a fixed result.
pub struct RecordingEnricher {
    pub result: EnrichmentResult,
    pub calls: Mutex<Vec<Option<String>>>,
}

impl RecordingEnricher {
    pub fn new(result: EnrichmentResult) -> Self {
        Self {
            result,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<Option<String>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Enrich for RecordingEnricher {
    async fn enrich(&self, address: Option<&str>) -> EnrichmentResult {
        self.calls.lock().unwrap().push(address.map(str::to_string));
        self.result.clone()
    }
}

pub struct PanickingEnricher;

#[async_trait]
impl Enrich for PanickingEnricher {
    async fn enrich(&self, _address: Option<&str>) -> EnrichmentResult {
        panic!("enrichment blew up");
    }
}
