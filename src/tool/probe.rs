//! Build tool availability probe

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::process::{run_bounded, RunError};
use super::BuildTool;

/// Longest stderr excerpt carried in a diagnostic.
const STDERR_EXCERPT_CHARS: usize = 400;

/// Result of probing the build tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Availability {
    pub available: bool,
    pub diagnostic: String,
}

impl Availability {
    fn ok() -> Self {
        Self {
            available: true,
            diagnostic: "OK".to_string(),
        }
    }

    fn unavailable(diagnostic: String) -> Self {
        Self {
            available: false,
            diagnostic,
        }
    }
}

pub(super) fn probe(tool: &BuildTool, timeout: Duration) -> Availability {
    let cmd = tool.command(&BuildTool::version_args());
    tracing::debug!(tool = tool.program(), ?timeout, "probing build tool");

    let availability = match run_bounded(cmd, timeout, tool.termination_grace()) {
        Ok(out) if out.status.success() => Availability::ok(),
        Ok(out) => {
            let excerpt = excerpt(&out.stderr);
            let code = out
                .status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            if excerpt.is_empty() {
                Availability::unavailable(format!(
                    "{} daemon not responding (exit {})",
                    tool.program(),
                    code
                ))
            } else {
                Availability::unavailable(format!(
                    "{} daemon not responding (exit {}): {}",
                    tool.program(),
                    code,
                    excerpt
                ))
            }
        }
        Err(RunError::NotFound(_)) => Availability::unavailable(format!(
            "{} command not found; is it installed and on PATH?",
            tool.program()
        )),
        Err(RunError::TimedOut(limit)) => Availability::unavailable(format!(
            "{} daemon check timed out after {}s; try restarting the daemon",
            tool.program(),
            limit.as_secs()
        )),
        Err(e) => Availability::unavailable(format!("{} check failed: {}", tool.program(), e)),
    };

    if availability.available {
        tracing::info!(tool = tool.program(), "build tool available");
    } else {
        tracing::warn!(tool = tool.program(), diagnostic = %availability.diagnostic, "build tool unavailable");
    }
    availability
}

fn excerpt(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.chars().count() <= STDERR_EXCERPT_CHARS {
        return trimmed.to_string();
    }
    let mut out: String = trimmed.chars().take(STDERR_EXCERPT_CHARS).collect();
    out.push_str("...");
    out
}
