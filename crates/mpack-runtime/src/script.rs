//! Entry point driven through an interpreter subprocess.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use mpack_framework::Framework;

use crate::{InferenceError, InferenceResult, Model, Predictions};

/// How to invoke the inference entry point.
#[derive(Debug, Clone)]
pub struct ScriptRunner {
    /// Interpreter executable (`python3` by default).
    pub interpreter: String,
    /// Path to the entry point script.
    pub entry_point: PathBuf,
}

impl Default for ScriptRunner {
    fn default() -> Self {
        Self {
            interpreter: "python3".to_string(),
            entry_point: PathBuf::from("infer.py"),
        }
    }
}

impl ScriptRunner {
    /// Create a runner for the given interpreter and entry point.
    pub fn new(interpreter: impl Into<String>, entry_point: impl Into<PathBuf>) -> Self {
        Self {
            interpreter: interpreter.into(),
            entry_point: entry_point.into(),
        }
    }

    /// Build the entry point command line.
    pub fn command(&self, model_path: &Path, input: Option<&Path>) -> Command {
        let mut cmd = Command::new(&self.interpreter);
        cmd.arg(&self.entry_point).arg("--model").arg(model_path);
        if let Some(input) = input {
            cmd.arg("--test-input").arg(input);
        }
        cmd
    }

    /// Run one forward pass and parse the report.
    pub fn run(
        &self,
        framework: Framework,
        model_path: &Path,
        input: Option<&Path>,
    ) -> InferenceResult<Predictions> {
        if !self.entry_point.is_file() {
            return Err(InferenceError::EntryPointNotFound(
                self.entry_point.display().to_string(),
            ));
        }

        tracing::debug!(
            interpreter = %self.interpreter,
            entry_point = %self.entry_point.display(),
            model = %model_path.display(),
            "running inference entry point"
        );

        let output = self
            .command(model_path, input)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| InferenceError::Spawn {
                interpreter: self.interpreter.clone(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if output.status.success() {
            return Ok(Predictions::parse(&stdout));
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(classify_failure(framework, &stderr, output.status.code()))
    }
}

/// Map the entry point's error channel onto the error taxonomy.
fn classify_failure(framework: Framework, stderr: &str, code: Option<i32>) -> InferenceError {
    for line in stderr.lines().map(str::trim) {
        if let Some(rest) = line.strip_prefix("Error: Model file not found:") {
            return InferenceError::ModelNotFound(rest.trim().to_string());
        }
        if line.starts_with("Error loading") {
            let detail = line.split_once(':').map(|(_, d)| d.trim()).unwrap_or(line);
            return InferenceError::Load {
                framework,
                detail: detail.to_string(),
            };
        }
        if let Some(rest) = line.strip_prefix("Error processing image:") {
            return InferenceError::Preprocess(rest.trim().to_string());
        }
        if let Some(rest) = line.strip_prefix("Error during inference:") {
            return InferenceError::Inference(rest.trim().to_string());
        }
    }

    let detail = stderr.trim();
    if detail.is_empty() {
        InferenceError::Inference(match code {
            Some(c) => format!("entry point exited with status {}", c),
            None => "entry point terminated by signal".to_string(),
        })
    } else {
        InferenceError::Inference(detail.to_string())
    }
}

/// A model handled by the entry point script.
#[derive(Debug, Clone)]
pub struct ScriptModel {
    framework: Framework,
    model_path: PathBuf,
    runner: ScriptRunner,
}

impl ScriptModel {
    pub(crate) fn new(framework: Framework, model_path: PathBuf, runner: ScriptRunner) -> Self {
        Self {
            framework,
            model_path,
            runner,
        }
    }

    /// Path of the loaded model file.
    pub fn model_path(&self) -> &Path {
        &self.model_path
    }
}

impl Model for ScriptModel {
    fn framework(&self) -> Framework {
        self.framework
    }

    fn predict(&self, input: Option<&Path>) -> InferenceResult<Predictions> {
        self.runner.run(self.framework, &self.model_path, input)
    }
}
