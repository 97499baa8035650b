//! Packager configuration
//!
//! Configuration is merged from four layers, lowest precedence first:
//! 1. Built-in defaults
//! 2. User config (~/.config/mpack/config.toml)
//! 3. Project config (./mpack.toml, or --config)
//! 4. CLI flags
//!
//! The merged value is deserialized into [`PackagerConfig`], which is then
//! handed to each pipeline component instead of living in globals.

mod defaults;
mod effective;

pub use defaults::{
    DEFAULT_BUILD_TIMEOUT_SECS, DEFAULT_PROBE_TIMEOUT_SECS, DEFAULT_PUSH_TIMEOUT_SECS,
    DEFAULT_VERIFY_TIMEOUT_SECS,
};
pub use effective::{deep_merge, ConfigError, ConfigOrigin, ConfigSource, EffectiveConfig};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use mpack_framework::{Framework, FrameworkProfile, ProfileTable};
use serde::{Deserialize, Serialize};

/// Timeouts in seconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TimeoutSettings {
    /// Wall-clock limit for the image build.
    pub build_secs: u64,
    /// Limit for the availability probe.
    pub probe_secs: u64,
    /// Limit for the post-build image lookup.
    pub verify_secs: u64,
    /// Limit for `push` after a successful build.
    pub push_secs: u64,
    /// Time between SIGTERM and SIGKILL when stopping a subprocess.
    pub termination_grace_secs: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            build_secs: DEFAULT_BUILD_TIMEOUT_SECS,
            probe_secs: DEFAULT_PROBE_TIMEOUT_SECS,
            verify_secs: DEFAULT_VERIFY_TIMEOUT_SECS,
            push_secs: DEFAULT_PUSH_TIMEOUT_SECS,
            termination_grace_secs: defaults::DEFAULT_TERMINATION_GRACE_SECS,
        }
    }
}

impl TimeoutSettings {
    pub fn build(&self) -> Duration {
        Duration::from_secs(self.build_secs)
    }

    pub fn probe(&self) -> Duration {
        Duration::from_secs(self.probe_secs)
    }

    pub fn verify(&self) -> Duration {
        Duration::from_secs(self.verify_secs)
    }

    pub fn push(&self) -> Duration {
        Duration::from_secs(self.push_secs)
    }

    pub fn termination_grace(&self) -> Duration {
        Duration::from_secs(self.termination_grace_secs)
    }
}

/// Per-framework override of the built-in profile.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FrameworkOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requirements: Option<Vec<String>>,
}

/// Fully merged packager configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PackagerConfig {
    /// Build tool executable.
    pub tool: String,

    /// Working directory that relative output locations resolve against.
    pub work_dir: PathBuf,

    /// Build context directory (relative to `work_dir`).
    pub context_dir: PathBuf,

    /// Where fallback packages and archives are written (relative to `work_dir`).
    pub output_dir: PathBuf,

    /// Inference entry point script copied into every artifact.
    pub entry_point: PathBuf,

    /// Loader module shipped alongside the entry point in fallback packages.
    pub loader_script: PathBuf,

    /// Optional sample input baked into images.
    pub sample_input: PathBuf,

    /// Interpreter used by `mpack infer`.
    pub interpreter: String,

    pub timeouts: TimeoutSettings,

    /// Lines of build output retained for failure reports.
    pub log_tail_lines: usize,

    /// Take the fallback path when the image build fails or times out.
    pub fallback_on_build_failure: bool,

    /// Profile overrides keyed by framework id.
    pub frameworks: BTreeMap<String, FrameworkOverride>,
}

impl Default for PackagerConfig {
    fn default() -> Self {
        Self {
            tool: defaults::DEFAULT_TOOL.to_string(),
            work_dir: PathBuf::from("."),
            context_dir: PathBuf::from(defaults::DEFAULT_CONTEXT_DIR),
            output_dir: PathBuf::from("."),
            entry_point: PathBuf::from(defaults::DEFAULT_ENTRY_POINT),
            loader_script: PathBuf::from(defaults::DEFAULT_LOADER_SCRIPT),
            sample_input: PathBuf::from(defaults::DEFAULT_SAMPLE_INPUT),
            interpreter: defaults::DEFAULT_INTERPRETER.to_string(),
            timeouts: TimeoutSettings::default(),
            log_tail_lines: defaults::DEFAULT_LOG_TAIL_LINES,
            fallback_on_build_failure: false,
            frameworks: BTreeMap::new(),
        }
    }
}

impl PackagerConfig {
    /// Load from layered sources. See [`EffectiveConfig::build`].
    pub fn load(
        user_path: Option<&Path>,
        project_path: Option<&Path>,
        cli_overrides: Option<serde_json::Value>,
    ) -> Result<(Self, EffectiveConfig), ConfigError> {
        let effective = EffectiveConfig::build(user_path, project_path, cli_overrides)?;
        let config: PackagerConfig = serde_json::from_value(effective.config.clone())
            .map_err(|e| ConfigError::ParseError(format!("invalid configuration: {}", e)))?;
        config.validate()?;
        Ok((config, effective))
    }

    /// Check value bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tool.trim().is_empty() {
            return Err(ConfigError::ValidationError("tool must not be empty".to_string()));
        }
        if self.interpreter.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "interpreter must not be empty".to_string(),
            ));
        }

        let t = &self.timeouts;
        check_range("timeouts.build_secs", t.build_secs, 1, 86_400)?;
        check_range("timeouts.probe_secs", t.probe_secs, 1, 60)?;
        check_range("timeouts.verify_secs", t.verify_secs, 1, 300)?;
        check_range("timeouts.push_secs", t.push_secs, 1, 86_400)?;
        check_range("timeouts.termination_grace_secs", t.termination_grace_secs, 0, 300)?;
        check_range("log_tail_lines", self.log_tail_lines as u64, 1, 100_000)?;

        for (key, fw) in &self.frameworks {
            key.parse::<Framework>()
                .map_err(|e| ConfigError::ValidationError(format!("frameworks.{}: {}", key, e)))?;
            if let Some(ref reqs) = fw.requirements {
                if reqs.is_empty() {
                    return Err(ConfigError::ValidationError(format!(
                        "frameworks.{}.requirements must not be empty",
                        key
                    )));
                }
                if let Some(bad) = reqs
                    .iter()
                    .find(|r| r.trim().is_empty() || r.contains(['\n', '\r']))
                {
                    return Err(ConfigError::ValidationError(format!(
                        "frameworks.{}.requirements contains an invalid entry: {:?}",
                        key, bad
                    )));
                }
            }
        }

        Ok(())
    }

    /// Built-in profile table with configured overrides applied.
    pub fn profile_table(&self) -> ProfileTable {
        let mut table = ProfileTable::builtin();
        for (key, over) in &self.frameworks {
            let Ok(framework) = key.parse::<Framework>() else {
                continue;
            };
            let mut profile: FrameworkProfile = table.profile(framework).clone();
            if let Some(ref exts) = over.extensions {
                profile.extensions = exts
                    .iter()
                    .map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
                    .collect();
            }
            if let Some(ref reqs) = over.requirements {
                profile.requirements = reqs.clone();
            }
            table = table.with_profile(profile);
        }
        table
    }

    /// Absolute-or-relative build context location.
    pub fn context_path(&self) -> PathBuf {
        self.work_dir.join(&self.context_dir)
    }

    /// Directory receiving fallback packages.
    pub fn output_path(&self) -> PathBuf {
        self.work_dir.join(&self.output_dir)
    }

    /// Resolve a configured path against `work_dir`. Absolute paths are
    /// returned unchanged.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        self.work_dir.join(path)
    }

    pub fn entry_point_path(&self) -> PathBuf {
        self.resolve(&self.entry_point)
    }

    pub fn loader_script_path(&self) -> PathBuf {
        self.resolve(&self.loader_script)
    }

    pub fn sample_input_path(&self) -> PathBuf {
        self.resolve(&self.sample_input)
    }

    /// Log file for build tool output.
    pub fn build_log_path(&self) -> PathBuf {
        self.work_dir.join("build.log")
    }

    /// Location of the JSON summary written at every terminal state.
    pub fn summary_path(&self) -> PathBuf {
        self.work_dir.join(crate::summary::SUMMARY_FILE_NAME)
    }
}

fn check_range(name: &str, value: u64, min: u64, max: u64) -> Result<(), ConfigError> {
    if value < min || value > max {
        return Err(ConfigError::ValidationError(format!(
            "{} must be in [{}, {}], got {}",
            name, min, max, value
        )));
    }
    Ok(())
}

/// Default user config location, if a home directory is known.
pub fn default_user_config_path() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config/mpack/config.toml"))
}

/// Default project config location.
pub fn default_project_config_path() -> PathBuf {
    PathBuf::from(defaults::PROJECT_CONFIG_FILE)
}
