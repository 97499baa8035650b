//! Packaging pipeline orchestration
//!
//! Runs one packaging request end to end:
//! - Validate the request (no side effects before this)
//! - Detect the framework
//! - Assemble the build context
//! - Probe the build tool (skipped when disabled)
//! - Build with streaming output and a deadline
//! - Verify the image (best-effort) and optionally push it
//!
//! The portable fallback package is produced instead when the tool is
//! unavailable or disabled, or when the build fails and
//! `fallback_on_build_failure` is set. Every terminal state after
//! validation writes `packaging_summary.json` and prints one `RESULT:` line.

use std::time::Duration;

use chrono::Utc;
use mpack_framework::{detect_with_table, FrameworkProfile};
use thiserror::Error;
use uuid::Uuid;

use crate::config::{ConfigSource, PackagerConfig};
use crate::context::{ContextAssembler, ContextError};
use crate::fallback::{FallbackError, FallbackPackager};
use crate::output::Output;
use crate::request::{PackagingRequest, RequestError};
use crate::signal::Interrupt;
use crate::summary::{file_sha256, BuildRecord, ExitCode, PackagingPath, PackagingSummary};
use crate::tool::{BuildExecutor, BuildOutcome, BuildTool, Verification};

/// Lines of the captured build log echoed on failure.
const FAILURE_TAIL_ECHO: usize = 20;

/// Pipeline errors
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid request: {0}")]
    Request(#[from] RequestError),

    #[error("build context error: {0}")]
    Context(#[from] ContextError),

    #[error("fallback packaging failed: {0}")]
    Fallback(#[from] FallbackError),

    #[error("build failed with exit code {exit_code}")]
    BuildFailed { exit_code: i32 },

    #[error("build timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("push failed: {0}")]
    PushFailed(String),

    #[error("cancelled")]
    Cancelled,
}

impl PipelineError {
    pub fn exit_code(&self) -> ExitCode {
        match self {
            PipelineError::Request(_) => ExitCode::Validation,
            PipelineError::Timeout(_) => ExitCode::Timeout,
            PipelineError::Cancelled => ExitCode::Cancelled,
            _ => ExitCode::Failure,
        }
    }

    pub fn path(&self) -> PackagingPath {
        match self {
            PipelineError::Timeout(_) => PackagingPath::Timeout,
            PipelineError::Cancelled => PackagingPath::Cancelled,
            _ => PackagingPath::Failed,
        }
    }
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Behaviour switches taken from configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Package portably instead of failing when the build fails or times out.
    pub fallback_on_build_failure: bool,
}

impl PipelineOptions {
    pub fn from_config(config: &PackagerConfig) -> Self {
        Self {
            fallback_on_build_failure: config.fallback_on_build_failure,
        }
    }
}

/// Sequential packaging pipeline.
pub struct Pipeline {
    config: PackagerConfig,
    options: PipelineOptions,
    config_sources: Vec<ConfigSource>,
    tool: BuildTool,
    interrupt: Interrupt,
    out: Output,
}

impl Pipeline {
    pub fn new(config: PackagerConfig, interrupt: Interrupt, out: Output) -> Self {
        let tool = BuildTool::from_config(&config);
        let options = PipelineOptions::from_config(&config);
        Self {
            config,
            options,
            config_sources: Vec::new(),
            tool,
            interrupt,
            out,
        }
    }

    /// Record where the configuration came from in the summary.
    pub fn with_config_sources(mut self, sources: Vec<ConfigSource>) -> Self {
        self.config_sources = sources;
        self
    }

    /// Run `request` to a terminal state.
    ///
    /// Returns `Err` only when the request is invalid; nothing is written in
    /// that case. Every other outcome, including failures, comes back as a
    /// summary whose `exit_code` the caller should exit with.
    pub fn run(&mut self, request: &PackagingRequest) -> PipelineResult<PackagingSummary> {
        if let Err(e) = request.validate() {
            let err = PipelineError::from(e);
            tracing::error!(error = %err, "request rejected");
            self.out.line(format!(
                "RESULT: {} artifact={} exit={}",
                PackagingPath::Failed,
                request.artifact_id(),
                err.exit_code().as_i32()
            ));
            return Err(err);
        }

        let run_id = Uuid::new_v4().to_string();
        let mut summary = PackagingSummary::new(
            run_id.clone(),
            Utc::now(),
            request.target_image(),
            request.model_path(),
            self.config_sources.clone(),
        );
        tracing::info!(run_id = %run_id, model = %request.model_path().display(), image = %request.target_image(), "packaging started");

        match self.execute(request, &mut summary) {
            Ok(path) => {
                let human = match path {
                    PackagingPath::Fallback => format!(
                        "Created portable package {}",
                        summary.artifact_location.as_deref().unwrap_or("")
                    ),
                    _ => format!("Built image {}", request.target_image()),
                };
                summary.finish(path, path.default_exit_code(), human);
            }
            Err(err) => {
                tracing::error!(error = %err, "packaging failed");
                self.out.line(format!("ERROR: {}", err));
                summary.error = Some(err.to_string());
                summary.finish(err.path(), err.exit_code(), err.to_string());
            }
        }

        let summary_path = self.config.summary_path();
        if let Err(e) = summary.write_to_file(&summary_path) {
            tracing::warn!(path = %summary_path.display(), error = %e, "failed to write packaging summary");
        }
        self.out.line(summary.result_line());
        Ok(summary)
    }

    fn execute(
        &mut self,
        request: &PackagingRequest,
        summary: &mut PackagingSummary,
    ) -> PipelineResult<PackagingPath> {
        match file_sha256(request.model_path()) {
            Ok(digest) => summary.model_sha256 = Some(digest),
            Err(e) => tracing::warn!(error = %e, "could not hash model file"),
        }

        let table = self.config.profile_table();
        let framework = detect_with_table(request.model_path(), request.framework_override(), &table);
        summary.framework = Some(framework);
        let profile = table.profile(framework).clone();
        self.out.line(format!("Detected framework: {}", framework.display_name()));

        let assembler = ContextAssembler::from_config(&self.config);
        let context = assembler.assemble(request, &profile)?;
        self.out.line(format!("Build context ready: {}", context.dir.display()));

        if request.disable_build_tool() {
            self.out.line("Build tool disabled; creating portable package instead");
            return self.fallback(request, &profile, summary);
        }

        let availability = self.tool.probe(self.config.timeouts.probe());
        if !availability.available {
            self.out.line(format!("WARNING: {}", availability.diagnostic));
            self.out.line("Falling back to portable packaging");
            summary.build = Some(BuildRecord::from(&BuildOutcome::ToolUnavailable {
                diagnostic: availability.diagnostic,
            }));
            return self.fallback(request, &profile, summary);
        }
        self.check_interrupt()?;

        let image = request.target_image();
        let executor = BuildExecutor::new(self.tool.clone(), self.interrupt.clone())
            .with_log_file(self.config.build_log_path())
            .with_tail_lines(self.config.log_tail_lines);

        let args = BuildTool::build_args(&image, &context.dir);
        self.out.line(format!("Building image: {}", image));
        self.out.line(format!("Running: {}", self.tool.display_command(&args)));
        let outcome = executor.run(&context, &image, request.build_timeout(), request.verbose(), &mut self.out);
        summary.build = Some(BuildRecord::from(&outcome));

        match outcome {
            BuildOutcome::Success { .. } => {
                self.out.line(format!("SUCCESS: Built image {}", image));
            }
            BuildOutcome::ToolUnavailable { diagnostic } => {
                self.out.line(format!("WARNING: {}", diagnostic));
                self.out.line("Falling back to portable packaging");
                return self.fallback(request, &profile, summary);
            }
            BuildOutcome::Cancelled { .. } => return Err(PipelineError::Cancelled),
            BuildOutcome::BuildFailure { exit_code, log } => {
                self.out.line(format!("Build failed with exit code {}", exit_code));
                let skip = log.len().saturating_sub(FAILURE_TAIL_ECHO);
                for line in &log[skip..] {
                    self.out.line(format!("  | {}", line));
                }
                if self.options.fallback_on_build_failure {
                    self.out.line("Falling back to portable packaging");
                    return self.fallback(request, &profile, summary);
                }
                return Err(PipelineError::BuildFailed { exit_code });
            }
            BuildOutcome::Timeout { elapsed } => {
                self.out.line(format!("Build timed out after {}s", elapsed.as_secs()));
                if self.options.fallback_on_build_failure {
                    self.out.line("Falling back to portable packaging");
                    return self.fallback(request, &profile, summary);
                }
                return Err(PipelineError::Timeout(request.build_timeout()));
            }
        }

        let verification = self.tool.verify(&image, self.config.timeouts.verify());
        if verification.is_verified() {
            self.out.line(format!("VERIFIED: Image {} exists and is ready to use", image));
            self.out.line(format!("Run inference: {} run --rm {}", self.tool.program(), image));
        } else {
            self.out.line(format!(
                "WARNING: Build succeeded but image verification failed ({:?})",
                verification
            ));
        }
        summary.verification = Some(verification);
        summary.artifact_location = Some(image.clone());

        if request.push() {
            self.check_interrupt()?;
            self.out.line(format!("Pushing image: {}", image));
            let pushed = executor.push(&image, self.config.timeouts.push(), request.verbose(), &mut self.out);
            summary.push = Some(BuildRecord::from(&pushed));
            match pushed {
                BuildOutcome::Success { .. } => self.out.line(format!("SUCCESS: Pushed {}", image)),
                BuildOutcome::Cancelled { .. } => return Err(PipelineError::Cancelled),
                BuildOutcome::BuildFailure { exit_code, .. } => {
                    return Err(PipelineError::PushFailed(format!(
                        "exit code {}; image remains local",
                        exit_code
                    )))
                }
                BuildOutcome::Timeout { elapsed } => {
                    return Err(PipelineError::PushFailed(format!(
                        "timed out after {}s; image remains local",
                        elapsed.as_secs()
                    )))
                }
                BuildOutcome::ToolUnavailable { diagnostic } => {
                    return Err(PipelineError::PushFailed(diagnostic))
                }
            }
        }

        Ok(PackagingPath::Image)
    }

    fn fallback(
        &mut self,
        request: &PackagingRequest,
        profile: &FrameworkProfile,
        summary: &mut PackagingSummary,
    ) -> PipelineResult<PackagingPath> {
        self.check_interrupt()?;

        let packager = FallbackPackager::from_config(&self.config);
        let archive = packager.package(request.model_path(), &request.package_name(), profile)?;

        summary.verification = Some(Verification::Skipped);
        summary.artifact_location = Some(archive.display().to_string());

        self.out.line(format!("SUCCESS: Created portable package: {}", archive.display()));
        self.out.line("To use:");
        self.out.line(format!("   1. Extract {}", archive.display()));
        self.out.line("   2. Run: python run.py (Unix/Mac/Linux)");
        self.out.line("   3. Or: run.bat (Windows)");
        Ok(PackagingPath::Fallback)
    }

    fn check_interrupt(&self) -> PipelineResult<()> {
        if self.interrupt.is_cancel_requested() {
            return Err(PipelineError::Cancelled);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::SharedBuffer;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn config_in(dir: &Path) -> PackagerConfig {
        PackagerConfig {
            work_dir: dir.to_path_buf(),
            tool: "/nonexistent/mpack-docker".to_string(),
            ..PackagerConfig::default()
        }
    }

    fn write_companions(dir: &Path) {
        fs::write(dir.join("infer.py"), "# infer\n").unwrap();
        fs::write(dir.join("model_loader.py"), "# loader\n").unwrap();
    }

    #[test]
    fn test_invalid_request_has_no_side_effects() {
        let dir = TempDir::new().unwrap();
        let config = config_in(dir.path());
        let buffer = SharedBuffer::new();
        let mut pipeline = Pipeline::new(config, Interrupt::new(), buffer.output());

        let request = PackagingRequest::builder(dir.path().join("missing.pth"), "m:1")
            .build()
            .unwrap_err();
        assert!(matches!(request, RequestError::ModelNotFound(_)));

        let model = dir.path().join("m.pth");
        fs::write(&model, b"x").unwrap();
        let valid = PackagingRequest::builder(&model, "m:1").build().unwrap();
        fs::remove_file(&model).unwrap();

        let err = pipeline.run(&valid).unwrap_err();
        assert_eq!(err.exit_code(), ExitCode::Validation);
        assert!(!dir.path().join("build_context").exists());
        assert!(!dir.path().join("packaging_summary.json").exists());
        assert_eq!(buffer.contents().matches("RESULT:").count(), 1);
    }

    #[test]
    fn test_missing_tool_falls_back() {
        let dir = TempDir::new().unwrap();
        write_companions(dir.path());
        let model = dir.path().join("resnet18.pth");
        fs::write(&model, b"\x80\x02").unwrap();

        let buffer = SharedBuffer::new();
        let mut pipeline = Pipeline::new(config_in(dir.path()), Interrupt::new(), buffer.output());
        let request = PackagingRequest::builder(&model, "my_model:1.0").build().unwrap();

        let summary = pipeline.run(&request).unwrap();
        assert_eq!(summary.path, PackagingPath::Fallback);
        assert_eq!(summary.exit_code, 0);
        assert!(dir.path().join("my_model_1.0_package.zip").is_file());
        assert!(dir.path().join("packaging_summary.json").is_file());
        assert_eq!(summary.build.as_ref().map(|b| b.kind.as_str()), Some("tool_unavailable"));

        let out = buffer.contents();
        assert_eq!(out.matches("RESULT:").count(), 1);
        assert!(out.contains("RESULT: fallback"));
    }

    #[test]
    fn test_pre_cancelled_run() {
        let dir = TempDir::new().unwrap();
        write_companions(dir.path());
        let model = dir.path().join("m.pth");
        fs::write(&model, b"x").unwrap();

        let interrupt = Interrupt::new();
        interrupt.handle_signal();
        let buffer = SharedBuffer::new();
        let mut pipeline = Pipeline::new(config_in(dir.path()), interrupt, buffer.output());
        let request = PackagingRequest::builder(&model, "m:1")
            .disable_build_tool(true)
            .build()
            .unwrap();

        let summary = pipeline.run(&request).unwrap();
        assert_eq!(summary.path, PackagingPath::Cancelled);
        assert_eq!(summary.exit_code, 130);
        assert!(buffer.contents().contains("RESULT: cancelled"));
    }

    #[test]
    fn test_error_exit_codes() {
        assert_eq!(
            PipelineError::Timeout(Duration::from_secs(1)).exit_code(),
            ExitCode::Timeout
        );
        assert_eq!(PipelineError::Cancelled.path(), PackagingPath::Cancelled);
        assert_eq!(
            PipelineError::BuildFailed { exit_code: 2 }.exit_code(),
            ExitCode::Failure
        );
        assert_eq!(
            PipelineError::PushFailed("x".into()).path(),
            PackagingPath::Failed
        );
    }
}
