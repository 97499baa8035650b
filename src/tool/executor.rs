//! Streaming build executor
//!
//! Runs `<tool> build` (and `<tool> push`) as a subprocess in its own
//! process group, with stdout and stderr on one pipe so lines keep the
//! order the tool wrote them. A single reader thread feeds a bounded
//! channel; the main loop receives with a short poll interval so the
//! deadline and the interrupt flag are checked even while the tool is
//! silent.
//!
//! Every line is appended to the build log and the last `tail_lines` lines
//! are kept for failure reports.

use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::Child;
use std::sync::mpsc::{self, RecvTimeoutError, SyncSender};
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::process::{
    exit_code, exit_drain_window, kill_group, spawn_combined, terminate, RunError, POLL_INTERVAL,
};
use super::BuildTool;
use crate::context::BuildContext;
use crate::output::Output;
use crate::signal::Interrupt;
use crate::timeout::Deadline;

/// Lines buffered between the reader threads and the main loop.
const CHANNEL_CAPACITY: usize = 256;

/// Result of one build (or push) invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BuildOutcome {
    Success { artifact_id: String },
    BuildFailure { exit_code: i32, log: Vec<String> },
    Timeout { elapsed: Duration },
    ToolUnavailable { diagnostic: String },
    Cancelled { elapsed: Duration },
}

impl BuildOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, BuildOutcome::Success { .. })
    }

    /// Stable short name used in the summary.
    pub fn kind(&self) -> &'static str {
        match self {
            BuildOutcome::Success { .. } => "success",
            BuildOutcome::BuildFailure { .. } => "build_failure",
            BuildOutcome::Timeout { .. } => "timeout",
            BuildOutcome::ToolUnavailable { .. } => "tool_unavailable",
            BuildOutcome::Cancelled { .. } => "cancelled",
        }
    }
}

/// Build log file plus in-memory tail.
struct BuildLog {
    file: Option<File>,
    tail: VecDeque<String>,
    cap: usize,
}

impl BuildLog {
    fn open(path: Option<&Path>, truncate: bool, cap: usize) -> Self {
        let file = path.and_then(|p| {
            let mut opts = OpenOptions::new();
            opts.create(true);
            if truncate {
                opts.write(true).truncate(true);
            } else {
                opts.append(true);
            }
            match opts.open(p) {
                Ok(f) => Some(f),
                Err(e) => {
                    tracing::warn!(path = %p.display(), error = %e, "cannot open build log; output kept in memory only");
                    None
                }
            }
        });
        Self {
            file,
            tail: VecDeque::with_capacity(cap.min(1024)),
            cap: cap.max(1),
        }
    }

    fn record(&mut self, line: &str) {
        if let Some(ref mut f) = self.file {
            let _ = writeln!(f, "{}", line);
        }
        if self.tail.len() == self.cap {
            self.tail.pop_front();
        }
        self.tail.push_back(line.to_string());
    }

    fn note(&mut self, message: &str) {
        if let Some(ref mut f) = self.file {
            let _ = writeln!(f, "[mpack] {}", message);
        }
    }

    fn tail(&self) -> Vec<String> {
        self.tail.iter().cloned().collect()
    }
}

/// Drives long-running build tool invocations.
#[derive(Debug, Clone)]
pub struct BuildExecutor {
    tool: BuildTool,
    interrupt: Interrupt,
    log_path: Option<PathBuf>,
    tail_lines: usize,
}

impl BuildExecutor {
    pub fn new(tool: BuildTool, interrupt: Interrupt) -> Self {
        Self {
            tool,
            interrupt,
            log_path: None,
            tail_lines: crate::config::PackagerConfig::default().log_tail_lines,
        }
    }

    /// Tee every output line into `path`.
    pub fn with_log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    pub fn with_tail_lines(mut self, lines: usize) -> Self {
        self.tail_lines = lines;
        self
    }

    pub fn tool(&self) -> &BuildTool {
        &self.tool
    }

    /// Build `context` tagged `artifact_id`. Starts a fresh build log.
    pub fn run(
        &self,
        context: &BuildContext,
        artifact_id: &str,
        timeout: Duration,
        verbose: bool,
        out: &mut Output,
    ) -> BuildOutcome {
        let args = BuildTool::build_args(artifact_id, &context.dir);
        tracing::info!(command = %self.tool.display_command(&args), ?timeout, "starting build");
        self.stream(&args, artifact_id, timeout, verbose, out, true)
    }

    /// Push `artifact_id`. Appends to the build log.
    pub fn push(&self, artifact_id: &str, timeout: Duration, verbose: bool, out: &mut Output) -> BuildOutcome {
        let args = BuildTool::push_args(artifact_id);
        tracing::info!(command = %self.tool.display_command(&args), ?timeout, "starting push");
        self.stream(&args, artifact_id, timeout, verbose, out, false)
    }

    fn stream(
        &self,
        args: &[String],
        artifact_id: &str,
        timeout: Duration,
        verbose: bool,
        out: &mut Output,
        fresh_log: bool,
    ) -> BuildOutcome {
        let deadline = Deadline::new(timeout);
        let mut log = BuildLog::open(self.log_path.as_deref(), fresh_log, self.tail_lines);
        log.note(&self.tool.display_command(args));

        let (mut child, output) = match spawn_combined(self.tool.command(args)) {
            Ok(spawned) => spawned,
            Err(RunError::NotFound(program)) => {
                return BuildOutcome::ToolUnavailable {
                    diagnostic: format!("{} command not found", program),
                }
            }
            Err(e) => {
                return BuildOutcome::ToolUnavailable {
                    diagnostic: e.to_string(),
                }
            }
        };

        let (tx, rx) = mpsc::sync_channel::<String>(CHANNEL_CAPACITY);
        spawn_reader(output, tx);

        let mut streams_open = true;
        let status = loop {
            if self.interrupt.is_cancel_requested() {
                log.note("interrupted, stopping tool");
                self.stop(&mut child);
                return BuildOutcome::Cancelled {
                    elapsed: deadline.elapsed(),
                };
            }
            if deadline.check().is_expired() {
                log.note(&format!("timed out after {}s, stopping tool", timeout.as_secs()));
                self.stop(&mut child);
                return BuildOutcome::Timeout {
                    elapsed: deadline.elapsed(),
                };
            }

            let poll = deadline.next_wait(POLL_INTERVAL);
            let exited = if streams_open {
                match rx.recv_timeout(poll) {
                    Ok(line) => {
                        if verbose {
                            out.line(&line);
                        }
                        log.record(&line);
                        continue;
                    }
                    Err(RecvTimeoutError::Timeout) => child.try_wait(),
                    Err(RecvTimeoutError::Disconnected) => {
                        streams_open = false;
                        continue;
                    }
                }
            } else {
                let exited = child.try_wait();
                if matches!(exited, Ok(None)) {
                    thread::sleep(poll);
                }
                exited
            };

            match exited {
                Ok(Some(status)) => break status,
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(error = %e, "failed to poll build tool");
                    self.stop(&mut child);
                    return BuildOutcome::BuildFailure {
                        exit_code: -1,
                        log: log.tail(),
                    };
                }
            }
        };

        kill_group(&child);
        let window = exit_drain_window(&deadline);
        loop {
            match rx.recv_timeout(window.remaining()) {
                Ok(line) => {
                    if verbose {
                        out.line(&line);
                    }
                    log.record(&line);
                }
                Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {
                    log.note("output still open after exit, truncated");
                    break;
                }
            }
        }

        let code = exit_code(&status);
        log.note(&format!("exit {}", code));
        tracing::debug!(exit_code = code, elapsed_ms = deadline.elapsed().as_millis() as u64, "tool exited");

        if status.success() {
            BuildOutcome::Success {
                artifact_id: artifact_id.to_string(),
            }
        } else {
            BuildOutcome::BuildFailure {
                exit_code: code,
                log: log.tail(),
            }
        }
    }

    fn stop(&self, child: &mut Child) {
        if let Err(e) = terminate(child, self.tool.termination_grace()) {
            tracing::warn!(pid = child.id(), error = %e, "failed to reap build tool");
        }
    }
}

fn spawn_reader<R: Read + Send + 'static>(reader: R, tx: SyncSender<String>) {
    thread::spawn(move || {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    let text = String::from_utf8_lossy(&buf)
                        .trim_end_matches(['\n', '\r'])
                        .to_string();
                    if tx.send(text).is_err() {
                        break;
                    }
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tail_keeps_last_lines() {
        let mut log = BuildLog::open(None, true, 3);
        for i in 0..10 {
            log.record(&format!("step {}", i));
        }
        assert_eq!(log.tail(), vec!["step 7", "step 8", "step 9"]);
    }

    #[test]
    fn test_log_file_lines_and_notes() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("build.log");
        {
            let mut log = BuildLog::open(Some(&path), true, 10);
            log.note("docker build -t m:1 ctx");
            log.record("Step 1/8");
            log.record("warning: cache miss");
        }
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "[mpack] docker build -t m:1 ctx\nStep 1/8\nwarning: cache miss\n");
    }

    #[test]
    fn test_outcome_kinds() {
        assert_eq!(
            BuildOutcome::Timeout {
                elapsed: Duration::from_secs(1)
            }
            .kind(),
            "timeout"
        );
        assert!(BuildOutcome::Success {
            artifact_id: "m:1".into()
        }
        .is_success());
        assert!(!BuildOutcome::Cancelled {
            elapsed: Duration::ZERO
        }
        .is_success());
    }
}
