//! External build tool driver
//!
//! Every interaction with the container tool goes through [`BuildTool`]:
//! - `version --format json` for the availability probe
//! - `build -t <id> <context>` for the image build
//! - `images <id> --format ...` for post-build verification
//! - `push <id>` when publishing was requested

mod executor;
mod probe;
mod process;
mod verify;

pub use executor::{BuildExecutor, BuildOutcome};
pub use probe::Availability;
pub use process::{BoundedOutput, RunError};
pub use verify::Verification;

use std::path::Path;
use std::process::Command;
use std::time::Duration;

use crate::config::PackagerConfig;

/// Format passed to `images` so each listed image prints as `repo:tag`.
pub const IMAGE_LIST_FORMAT: &str = "{{.Repository}}:{{.Tag}}";

/// A container build tool executable (`docker`, `podman`, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildTool {
    program: String,
    termination_grace: Duration,
}

impl BuildTool {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            termination_grace: Duration::from_secs(10),
        }
    }

    pub fn from_config(config: &PackagerConfig) -> Self {
        Self::new(config.tool.clone()).with_termination_grace(config.timeouts.termination_grace())
    }

    /// Time between SIGTERM and SIGKILL when stopping the tool.
    pub fn with_termination_grace(mut self, grace: Duration) -> Self {
        self.termination_grace = grace;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn termination_grace(&self) -> Duration {
        self.termination_grace
    }

    pub fn version_args() -> Vec<String> {
        vec!["version".into(), "--format".into(), "json".into()]
    }

    pub fn build_args(artifact_id: &str, context_dir: &Path) -> Vec<String> {
        vec![
            "build".into(),
            "-t".into(),
            artifact_id.into(),
            context_dir.display().to_string(),
        ]
    }

    pub fn images_args(artifact_id: &str) -> Vec<String> {
        vec![
            "images".into(),
            artifact_id.into(),
            "--format".into(),
            IMAGE_LIST_FORMAT.into(),
        ]
    }

    pub fn push_args(artifact_id: &str) -> Vec<String> {
        vec!["push".into(), artifact_id.into()]
    }

    /// Command for `args` with no stdio configured.
    pub fn command(&self, args: &[String]) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(args);
        cmd
    }

    /// Check that the tool's daemon answers. Never fails; see [`Availability`].
    pub fn probe(&self, timeout: Duration) -> Availability {
        probe::probe(self, timeout)
    }

    /// Best-effort check that `artifact_id` is listed after a build.
    pub fn verify(&self, artifact_id: &str, timeout: Duration) -> Verification {
        verify::verify(self, artifact_id, timeout)
    }

    /// Printable form of an invocation, for progress output.
    pub fn display_command(&self, args: &[String]) -> String {
        let mut parts = Vec::with_capacity(args.len() + 1);
        parts.push(self.program.clone());
        parts.extend(args.iter().cloned());
        parts.join(" ")
    }
}
