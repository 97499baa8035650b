//! Post-build image verification (best-effort)

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::process::{run_bounded, RunError};
use super::BuildTool;

/// Verification status recorded in the summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum Verification {
    /// Image listed under the requested identifier
    Verified,
    /// `images` succeeded but did not list the identifier
    NotListed,
    /// `images` exited non-zero or could not be started
    Failed(String),
    /// `images` did not finish in time
    TimedOut,
    /// No build happened (fallback path)
    Skipped,
}

impl Verification {
    pub fn is_verified(&self) -> bool {
        matches!(self, Verification::Verified)
    }
}

pub(super) fn verify(tool: &BuildTool, artifact_id: &str, timeout: Duration) -> Verification {
    let cmd = tool.command(&BuildTool::images_args(artifact_id));

    let result = match run_bounded(cmd, timeout, tool.termination_grace()) {
        Ok(out) if out.status.success() => {
            if is_listed(&out.stdout, artifact_id) {
                Verification::Verified
            } else {
                Verification::NotListed
            }
        }
        Ok(out) => Verification::Failed(format!(
            "exit {}: {}",
            out.status.code().unwrap_or(-1),
            out.stderr.trim()
        )),
        Err(RunError::TimedOut(_)) => Verification::TimedOut,
        Err(e) => Verification::Failed(e.to_string()),
    };

    match &result {
        Verification::Verified => tracing::info!(image = artifact_id, "image verified"),
        other => tracing::warn!(image = artifact_id, result = ?other, "build succeeded but image verification failed"),
    }
    result
}

/// `name` with `:latest` appended when the last path component carries no
/// tag or digest. A registry port (`host:5000/name`) is not a tag.
fn with_default_tag(reference: &str) -> String {
    let name = reference.rsplit('/').next().unwrap_or(reference);
    if name.contains(':') || name.contains('@') {
        reference.to_string()
    } else {
        format!("{}:latest", reference)
    }
}

/// Whether one line of `images` output names exactly `artifact_id`.
fn is_listed(stdout: &str, artifact_id: &str) -> bool {
    let wanted = with_default_tag(artifact_id.trim());
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .any(|line| with_default_tag(line) == wanted)
}

#[cfg(test)]
mod matching_tests {
    use super::*;

    #[test]
    fn test_exact_line_match() {
        assert!(is_listed("other:2\nmy_ai_model:1.0\n", "my_ai_model:1.0"));
        assert!(!is_listed("m:10\n", "m:1"));
        assert!(!is_listed("org/m:1\n", "m:1"));
        assert!(!is_listed("", "m:1"));
    }

    #[test]
    fn test_implicit_latest_tag() {
        assert!(is_listed("ml_model:latest\n", "ml_model"));
        assert!(is_listed("ml_model\n", "ml_model:latest"));
        assert!(!is_listed("ml_model:1.0\n", "ml_model"));
        assert!(is_listed("localhost:5000/team/m:latest\n", "localhost:5000/team/m"));
    }
}
