//! Subprocess helpers: bounded runs and process-group termination

use std::io::{self, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use os_pipe::PipeReader;

use crate::timeout::Deadline;

/// Poll interval while waiting on a child.
pub(crate) const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Minimum time spent collecting output an exited child already wrote.
const EXIT_DRAIN: Duration = Duration::from_millis(100);

/// Errors from [`run_bounded`]
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("executable not found: {0}")]
    NotFound(String),

    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Captured output of a completed short-lived command.
#[derive(Debug)]
pub struct BoundedOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

/// Put the child in its own process group so the whole tree can be
/// signalled.
pub(crate) fn isolate(cmd: &mut Command) {
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }
    #[cfg(not(unix))]
    {
        let _ = cmd;
    }
}

/// Spawn with piped output, mapping `NotFound` separately.
pub(crate) fn spawn_piped(mut cmd: Command) -> Result<Child, RunError> {
    isolate(&mut cmd);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    spawn(&mut cmd)
}

/// Spawn with stdout and stderr sharing one pipe, so output is read back in
/// the order the child wrote it.
pub(crate) fn spawn_combined(mut cmd: Command) -> Result<(Child, PipeReader), RunError> {
    let (reader, writer) = os_pipe::pipe()?;
    let writer_err = writer.try_clone()?;
    isolate(&mut cmd);
    cmd.stdin(Stdio::null()).stdout(writer).stderr(writer_err);
    let child = spawn(&mut cmd)?;
    // the parent's write ends live in `cmd`; EOF needs them closed
    drop(cmd);
    Ok((child, reader))
}

fn spawn(cmd: &mut Command) -> Result<Child, RunError> {
    let program = cmd.get_program().to_string_lossy().into_owned();
    cmd.spawn().map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
            RunError::NotFound(program)
        } else {
            RunError::Spawn { program, source }
        }
    })
}

/// Window for reading what an exited child left in its pipes: the rest of
/// `deadline`, but never less than [`EXIT_DRAIN`].
pub(crate) fn exit_drain_window(deadline: &Deadline) -> Deadline {
    Deadline::new(deadline.remaining().max(EXIT_DRAIN))
}

/// Run `cmd` to completion within `limit`, capturing stdout and stderr.
///
/// On expiry the process group is terminated and [`RunError::TimedOut`]
/// returned. Once the child exits, anything left in its process group is
/// killed and output collection is bounded by the same deadline.
pub fn run_bounded(cmd: Command, limit: Duration, grace: Duration) -> Result<BoundedOutput, RunError> {
    let deadline = Deadline::new(limit);
    let mut child = spawn_piped(cmd)?;

    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);

    let status = loop {
        if deadline.check().is_expired() {
            terminate(&mut child, grace)?;
            return Err(RunError::TimedOut(limit));
        }
        match child.try_wait()? {
            Some(status) => break status,
            None => thread::sleep(deadline.next_wait(POLL_INTERVAL)),
        }
    };

    kill_group(&child);
    let window = exit_drain_window(&deadline);
    Ok(BoundedOutput {
        status,
        stdout: collect(stdout, &window),
        stderr: collect(stderr, &window),
    })
}

fn drain<R: Read + Send + 'static>(mut reader: R) -> Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = [0u8; 8192];
        loop {
            match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if tx.send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
    });
    rx
}

/// Gather drained chunks until the pipe closes or `window` runs out.
fn collect(rx: Option<Receiver<Vec<u8>>>, window: &Deadline) -> String {
    let mut bytes = Vec::new();
    if let Some(rx) = rx {
        loop {
            match rx.recv_timeout(window.remaining()) {
                Ok(chunk) => bytes.extend_from_slice(&chunk),
                Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {
                    tracing::debug!("output pipe still open after exit, truncating");
                    break;
                }
            }
        }
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

/// SIGKILL whatever is left of the child's process group. Used after the
/// group leader has exited so background children cannot hold pipes open.
pub(crate) fn kill_group(child: &Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        let _ = killpg(Pid::from_raw(child.id() as i32), Signal::SIGKILL);
    }
    #[cfg(not(unix))]
    {
        let _ = child;
    }
}

/// Stop `child` and its process group: SIGTERM, wait up to `grace`, then
/// SIGKILL. Always reaps the child.
pub(crate) fn terminate(child: &mut Child, grace: Duration) -> io::Result<ExitStatus> {
    #[cfg(unix)]
    {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        let pgid = Pid::from_raw(child.id() as i32);
        if let Err(e) = killpg(pgid, Signal::SIGTERM) {
            tracing::debug!(pgid = child.id(), error = %e, "SIGTERM to process group failed");
        }

        let deadline = Deadline::new(grace);
        while !deadline.check().is_expired() {
            if let Some(status) = child.try_wait()? {
                kill_group(child);
                return Ok(status);
            }
            thread::sleep(deadline.next_wait(POLL_INTERVAL));
        }

        tracing::debug!(pgid = child.id(), "grace period elapsed, sending SIGKILL");
        let _ = killpg(pgid, Signal::SIGKILL);
    }

    let _ = child.kill();
    child.wait()
}

/// Exit code, or -1 when the process was killed by a signal.
pub(crate) fn exit_code(status: &ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[test]
    fn test_run_bounded_captures_output() {
        let out = run_bounded(
            sh("echo out; echo err >&2; exit 3"),
            Duration::from_secs(5),
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(out.status.code(), Some(3));
        assert_eq!(out.stdout, "out\n");
        assert_eq!(out.stderr, "err\n");
    }

    #[test]
    fn test_run_bounded_times_out() {
        let start = std::time::Instant::now();
        let err = run_bounded(
            sh("exec sleep 30"),
            Duration::from_millis(300),
            Duration::from_secs(1),
        )
        .unwrap_err();
        assert!(matches!(err, RunError::TimedOut(_)));
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_background_child_does_not_outlive_deadline() {
        let start = std::time::Instant::now();
        let out = run_bounded(
            sh("sleep 15 & echo ok; exit 0"),
            Duration::from_secs(2),
            Duration::from_secs(1),
        )
        .unwrap();
        assert!(out.status.success());
        assert_eq!(out.stdout, "ok\n");
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_combined_pipe_keeps_write_order() {
        let (mut child, mut reader) =
            spawn_combined(sh("for i in 1 2 3; do echo \"out $i\"; echo \"err $i\" >&2; done")).unwrap();
        let mut text = String::new();
        reader.read_to_string(&mut text).unwrap();
        child.wait().unwrap();
        assert_eq!(text, "out 1\nerr 1\nout 2\nerr 2\nout 3\nerr 3\n");
    }

    #[test]
    fn test_not_found() {
        let err = run_bounded(
            Command::new("/nonexistent/mpack-tool"),
            Duration::from_secs(1),
            Duration::from_secs(1),
        )
        .unwrap_err();
        assert!(matches!(err, RunError::NotFound(_)));
    }

    #[test]
    fn test_exit_code_for_signal() {
        let mut cmd = sh("exec sleep 30");
        isolate(&mut cmd);
        let mut child = cmd.spawn().unwrap();
        let status = terminate(&mut child, Duration::from_secs(2)).unwrap();
        assert_eq!(exit_code(&status), -1);
    }
}
