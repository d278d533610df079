// src/core/runner.rs

use std::io;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::core::errors::ScanError;
use crate::core::events::{EventSink, ScanEvent};
use crate::core::parser::parse_partial;

/// Privilege-escalation wrapper used when a scan needs raw sockets.
const ELEVATION_WRAPPER: &str = "sudo";
const CHUNK_SIZE: usize = 8 * 1024;
const STDERR_TAIL_LINES: usize = 10;
/// How long a stopped scan gets to exit on SIGTERM before it is killed.
const STOP_GRACE: Duration = Duration::from_secs(3);

/// Builds the scanner command. With `elevate`, the binary runs under `sudo -n`
/// so a missing credential fails fast instead of waiting on a password prompt.
///
/// On unix the command leads its own process group, so a stop reaches every
/// process it forks.
pub fn build_command(program: &str, args: &[String], elevate: bool) -> Command {
    let mut cmd = if elevate {
        let mut cmd = Command::new(ELEVATION_WRAPPER);
        cmd.arg("-n").arg(program);
        cmd
    } else {
        Command::new(program)
    };

    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);
    cmd
}

/// Runs the scanner to completion and returns everything it wrote to stdout.
///
/// Every stdout chunk is appended to a buffer and, when `events` has a
/// listener, the whole buffer is re-parsed and emitted as a
/// [`ScanEvent::Data`] snapshot. Stderr chunks are emitted as
/// [`ScanEvent::Error`] and never end the scan on their own.
///
/// Resolving `stop` sends SIGTERM to the process group (`sudo` relays it to
/// the scanner), kills the direct child if it outlives [`STOP_GRACE`], and
/// returns [`ScanError::Stopped`]. An exit observed first wins over the stop.
pub async fn run(
    program: &str,
    args: &[String],
    elevate: bool,
    events: &EventSink,
    stop: oneshot::Receiver<()>,
) -> Result<String, ScanError> {
    debug!(program, ?args, elevate, "Spawning scan process.");

    let mut child = build_command(program, args, elevate).spawn()?;
    let pid = child.id();
    let mut group = ProcessGroup::new(pid);
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| io::Error::other("scan process stdout was not captured"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| io::Error::other("scan process stderr was not captured"))?;

    let finished = tokio::select! {
        biased;
        outcome = async {
            let (raw, stderr) = tokio::join!(pump_stdout(stdout, events), pump_stderr(stderr, events));
            (raw, stderr, child.wait().await)
        } => Some(outcome),
        Ok(()) = stop => None,
    };

    let Some((raw, stderr, status)) = finished else {
        warn!(?pid, "Stop requested, terminating scan process group.");
        group.signal(StopSignal::Terminate);
        match tokio::time::timeout(STOP_GRACE, child.wait()).await {
            Ok(status) => debug!(?pid, ?status, "Scan process exited after SIGTERM."),
            Err(_) => {
                warn!(?pid, grace = ?STOP_GRACE, "Scan process ignored SIGTERM, killing.");
                if let Err(e) = child.kill().await {
                    warn!(?pid, error = %e, "Failed to kill scan process.");
                }
            }
        }
        return Err(ScanError::Stopped);
    };
    group.disarm();

    let status = status?;
    let raw = raw?;
    let stderr = stderr?;

    if status.success() {
        info!(?pid, bytes = raw.len(), "Scan process exited cleanly.");
        Ok(raw)
    } else {
        let stderr_tail = tail(&stderr, STDERR_TAIL_LINES);
        warn!(?pid, exit_code = ?status.code(), stderr = %stderr_tail, "Scan process failed.");
        Err(ScanError::ProcessFailed {
            exit_code: status.code(),
            stderr_tail,
        })
    }
}

async fn pump_stdout<R>(mut reader: R, events: &EventSink) -> io::Result<String>
where
    R: AsyncRead + Unpin,
{
    let mut buffer: Vec<u8> = Vec::new();
    let mut chunk = vec![0u8; CHUNK_SIZE];

    loop {
        let read = reader.read(&mut chunk).await?;
        if read == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..read]);

        // The parser is not resumable: each snapshot re-reads the whole buffer.
        if events.is_attached() {
            let snapshot = parse_partial(&String::from_utf8_lossy(&buffer));
            events.emit(ScanEvent::Data(snapshot));
        }
    }

    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

async fn pump_stderr<R>(mut reader: R, events: &EventSink) -> io::Result<String>
where
    R: AsyncRead + Unpin,
{
    let mut collected = String::new();
    let mut pending: Vec<u8> = Vec::new();
    let mut chunk = vec![0u8; CHUNK_SIZE];

    loop {
        let read = reader.read(&mut chunk).await?;
        if read == 0 {
            break;
        }
        pending.extend_from_slice(&chunk[..read]);

        // Only whole lines are decoded, so a multi-byte character split
        // across two reads is never replaced.
        let Some(last_newline) = pending.iter().rposition(|b| *b == b'\n') else {
            continue;
        };
        let lines: Vec<u8> = pending.drain(..=last_newline).collect();
        let text = String::from_utf8_lossy(&lines).into_owned();
        collected.push_str(&text);
        events.emit(ScanEvent::Error(text));
    }

    if !pending.is_empty() {
        let text = String::from_utf8_lossy(&pending).into_owned();
        collected.push_str(&text);
        events.emit(ScanEvent::Error(text));
    }

    Ok(collected)
}

#[derive(Debug, Clone, Copy)]
enum StopSignal {
    Terminate,
    Kill,
}

/// The scanner's process group. Dropping it while still armed kills
/// whatever is left in the group.
struct ProcessGroup {
    pgid: Option<u32>,
    armed: bool,
}

impl ProcessGroup {
    fn new(pgid: Option<u32>) -> Self {
        Self { pgid, armed: true }
    }

    /// Marks the group as finished once the scanner exit has been observed.
    fn disarm(&mut self) {
        self.armed = false;
    }

    #[cfg(unix)]
    fn signal(&self, signal: StopSignal) {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        let Some(pgid) = self.pgid else {
            return;
        };
        let signal = match signal {
            StopSignal::Terminate => Signal::SIGTERM,
            StopSignal::Kill => Signal::SIGKILL,
        };
        // ESRCH means the group is already gone; EPERM means only root-owned
        // members are left, which `sudo` takes care of.
        if let Err(e) = killpg(Pid::from_raw(pgid as i32), signal) {
            debug!(pgid, ?signal, error = %e, "Could not signal scan process group.");
        }
    }

    #[cfg(not(unix))]
    fn signal(&self, _signal: StopSignal) {}
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        if self.armed {
            self.signal(StopSignal::Kill);
        }
    }
}

fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.lines().collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn elevated_command_wraps_binary() {
        let args = vec!["-oX".to_string(), "-".to_string(), "10.0.0.1".to_string()];
        let cmd = build_command("nmap", &args, true);
        let std_cmd = cmd.as_std();

        assert_eq!(std_cmd.get_program(), "sudo");
        let argv: Vec<_> = std_cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(argv, vec!["-n", "nmap", "-oX", "-", "10.0.0.1"]);
    }

    #[test]
    fn plain_command_runs_binary_directly() {
        let args = vec!["10.0.0.1".to_string()];
        let cmd = build_command("/usr/local/bin/nmap", &args, false);
        assert_eq!(cmd.as_std().get_program(), "/usr/local/bin/nmap");
        assert_eq!(cmd.as_std().get_args().count(), 1);
    }

    #[test]
    fn tail_keeps_last_lines() {
        assert_eq!(tail("a\nb\nc\nd", 2), "c\nd");
        assert_eq!(tail("only", 10), "only");
        assert_eq!(tail("", 10), "");
    }

    #[tokio::test]
    async fn stderr_split_inside_a_character_is_decoded_whole() {
        let bytes = "nmap: r\u{e9}solution failed\nsecond line".as_bytes();
        let split = bytes.iter().position(|b| *b == 0xC3).unwrap() + 1;
        let reader = (&bytes[..split]).chain(&bytes[split..]);
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        let collected = pump_stderr(reader, &EventSink::new(tx)).await.unwrap();

        assert_eq!(collected, "nmap: r\u{e9}solution failed\nsecond line");
        let mut events = Vec::new();
        while let Some(ScanEvent::Error(text)) = rx.recv().await {
            events.push(text);
        }
        assert_eq!(events, vec!["nmap: r\u{e9}solution failed\n", "second line"]);
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_error() {
        let (_stop_tx, stop_rx) = oneshot::channel();
        let result = run(
            "/nonexistent/definitely-not-a-scanner",
            &[],
            false,
            &EventSink::none(),
            stop_rx,
        )
        .await;
        assert!(matches!(result, Err(ScanError::Spawn(_))));
    }
}
