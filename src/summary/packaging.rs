//! Packaging summary (packaging_summary.json)

use std::fs;
use std::io;
use std::path::Path;

use chrono::{DateTime, Utc};
use mpack_framework::Framework;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::failure::{ExitCode, PackagingPath};
use crate::config::ConfigSource;
use crate::tool::{BuildOutcome, Verification};

/// Schema version for packaging_summary.json
pub const SUMMARY_SCHEMA_VERSION: u32 = 1;

/// Schema identifier for packaging_summary.json
pub const SUMMARY_SCHEMA_ID: &str = "mpack/packaging_summary@1";

/// File name inside the work directory
pub const SUMMARY_FILE_NAME: &str = "packaging_summary.json";

/// Build outcome as recorded in the summary (log tail omitted).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRecord {
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
}

impl From<&BuildOutcome> for BuildRecord {
    fn from(outcome: &BuildOutcome) -> Self {
        let mut record = BuildRecord {
            kind: outcome.kind().to_string(),
            exit_code: None,
            elapsed_ms: None,
            diagnostic: None,
        };
        match outcome {
            BuildOutcome::Success { .. } => record.exit_code = Some(0),
            BuildOutcome::BuildFailure { exit_code, .. } => record.exit_code = Some(*exit_code),
            BuildOutcome::Timeout { elapsed } | BuildOutcome::Cancelled { elapsed } => {
                record.elapsed_ms = Some(elapsed.as_millis() as u64)
            }
            BuildOutcome::ToolUnavailable { diagnostic } => record.diagnostic = Some(diagnostic.clone()),
        }
        record
    }
}

/// One packaging run, written at every terminal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackagingSummary {
    pub schema_version: u32,
    pub schema_id: String,

    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,

    pub path: PackagingPath,
    pub exit_code: i32,

    /// Identifier handed to the build tool
    pub artifact_id: String,

    /// Image identifier or archive path
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_location: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub framework: Option<Framework>,

    pub model_path: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_sha256: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildRecord>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification: Option<Verification>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub push: Option<BuildRecord>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub config_sources: Vec<ConfigSource>,

    pub human_summary: String,
}

impl PackagingSummary {
    /// Start a summary for a run that began at `started_at`.
    pub fn new(
        run_id: String,
        started_at: DateTime<Utc>,
        artifact_id: String,
        model_path: &Path,
        config_sources: Vec<ConfigSource>,
    ) -> Self {
        Self {
            schema_version: SUMMARY_SCHEMA_VERSION,
            schema_id: SUMMARY_SCHEMA_ID.to_string(),
            run_id,
            started_at,
            finished_at: started_at,
            duration_ms: 0,
            path: PackagingPath::Failed,
            exit_code: ExitCode::Failure.as_i32(),
            artifact_id,
            artifact_location: None,
            framework: None,
            model_path: model_path.display().to_string(),
            model_sha256: None,
            build: None,
            verification: None,
            push: None,
            error: None,
            config_sources,
            human_summary: String::new(),
        }
    }

    /// Fix the terminal state and timing.
    pub fn finish(&mut self, path: PackagingPath, exit_code: ExitCode, human_summary: String) {
        let now = Utc::now();
        self.finished_at = now;
        self.duration_ms = (now - self.started_at).num_milliseconds().max(0) as u64;
        self.path = path;
        self.exit_code = exit_code.as_i32();
        self.human_summary = human_summary;
    }

    /// The single `RESULT:` line printed at the end of a run.
    pub fn result_line(&self) -> String {
        let mut line = format!("RESULT: {}", self.path);
        if let Some(ref location) = self.artifact_location {
            line.push_str(&format!(" artifact={}", location));
        } else {
            line.push_str(&format!(" artifact={}", self.artifact_id));
        }
        line.push_str(&format!(" exit={}", self.exit_code));
        line
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn write_to_file(&self, path: &Path) -> io::Result<()> {
        let json = self.to_json().map_err(|e| {
            io::Error::new(io::ErrorKind::InvalidData, format!("JSON error: {}", e))
        })?;
        fs::write(path, json)
    }

    pub fn from_file(path: &Path) -> io::Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("JSON error: {}", e)))
    }

    pub fn exit_code_enum(&self) -> Option<ExitCode> {
        ExitCode::from_i32(self.exit_code)
    }
}

/// SHA-256 of a file, hex encoded.
pub fn file_sha256(path: &Path) -> io::Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}
