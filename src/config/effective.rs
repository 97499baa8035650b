//! Layered configuration with provenance
//!
//! Each contributing file is recorded with its SHA-256 digest so a
//! packaging summary can say exactly which configuration produced it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

use super::defaults::default_layer;

/// Origin of a configuration layer
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConfigOrigin {
    Builtin,
    User,
    Project,
    Cli,
}

/// A layer that contributed to the merged configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfigSource {
    pub origin: ConfigOrigin,

    /// File path (None for builtin/cli)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// SHA-256 of the raw file bytes (None for builtin/cli)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

/// Merged configuration value plus the layers it came from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveConfig {
    pub created_at: DateTime<Utc>,

    /// Merged configuration object
    pub config: Value,

    /// Contributing layers, lowest precedence first
    pub sources: Vec<ConfigSource>,
}

impl EffectiveConfig {
    /// Merge defaults, user file, project file and CLI overrides.
    ///
    /// The user file is optional and skipped when absent. An explicitly
    /// named project file must exist.
    pub fn build(
        user_path: Option<&Path>,
        project_path: Option<&Path>,
        cli_overrides: Option<Value>,
    ) -> Result<Self, ConfigError> {
        let mut merged = default_layer();
        let mut sources = vec![ConfigSource {
            origin: ConfigOrigin::Builtin,
            path: None,
            digest: None,
        }];

        if let Some(path) = user_path.filter(|p| p.exists()) {
            let (value, digest) = load_toml_file(path)?;
            merged = deep_merge(merged, value);
            sources.push(ConfigSource {
                origin: ConfigOrigin::User,
                path: Some(path.display().to_string()),
                digest: Some(digest),
            });
        }

        if let Some(path) = project_path {
            let (value, digest) = load_toml_file(path)?;
            merged = deep_merge(merged, value);
            sources.push(ConfigSource {
                origin: ConfigOrigin::Project,
                path: Some(path.display().to_string()),
                digest: Some(digest),
            });
        }

        if let Some(cli) = cli_overrides {
            merged = deep_merge(merged, cli);
            sources.push(ConfigSource {
                origin: ConfigOrigin::Cli,
                path: None,
                digest: None,
            });
        }

        tracing::debug!(layers = sources.len(), "configuration merged");

        Ok(Self {
            created_at: Utc::now(),
            config: merged,
            sources,
        })
    }

    /// Look up a value by dot-separated path.
    pub fn get(&self, path: &str) -> Option<&Value> {
        path.split('.').try_fold(&self.config, |cur, part| cur.get(part))
    }
}

/// Deep-merge `overlay` onto `base`.
///
/// Tables merge key by key; arrays and scalars from the overlay replace the
/// base value outright. A `null` overlay leaves the base untouched so that
/// optional CLI flags can be passed through without clearing defaults.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                let next = match base_map.remove(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value,
                };
                base_map.insert(key, next);
            }
            Value::Object(base_map)
        }
        (base, Value::Null) => base,
        (_, overlay) => overlay,
    }
}

fn load_toml_file(path: &Path) -> Result<(Value, String), ConfigError> {
    let bytes = fs::read(path)
        .map_err(|e| ConfigError::IoError(format!("{}: {}", path.display(), e)))?;
    let digest = hex::encode(Sha256::digest(&bytes));

    let text = String::from_utf8(bytes)
        .map_err(|e| ConfigError::ParseError(format!("{}: invalid UTF-8: {}", path.display(), e)))?;
    let table: toml::Value = toml::from_str(&text)
        .map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))?;

    Ok((toml_to_json(table), digest))
}

fn toml_to_json(value: toml::Value) -> Value {
    match value {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::from(i),
        toml::Value::Float(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(items) => Value::Array(items.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect(),
        ),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn toml_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults_only() {
        let config = EffectiveConfig::build(None, None, None).unwrap();
        assert_eq!(config.sources.len(), 1);
        assert_eq!(config.sources[0].origin, ConfigOrigin::Builtin);
        assert_eq!(config.get("tool"), Some(&json!("docker")));
        assert_eq!(config.get("timeouts.verify_secs"), Some(&json!(10)));
    }

    #[test]
    fn test_layer_precedence() {
        let user = toml_file("tool = \"podman\"\n[timeouts]\nbuild_secs = 600\nprobe_secs = 8\n");
        let project = toml_file("[timeouts]\nbuild_secs = 900\n");
        let cli = json!({ "timeouts": { "probe_secs": 3 } });

        let config =
            EffectiveConfig::build(Some(user.path()), Some(project.path()), Some(cli)).unwrap();

        assert_eq!(config.get("tool"), Some(&json!("podman")));
        assert_eq!(config.get("timeouts.build_secs"), Some(&json!(900)));
        assert_eq!(config.get("timeouts.probe_secs"), Some(&json!(3)));
        assert_eq!(config.get("timeouts.verify_secs"), Some(&json!(10)));

        let origins: Vec<_> = config.sources.iter().map(|s| s.origin).collect();
        assert_eq!(
            origins,
            vec![
                ConfigOrigin::Builtin,
                ConfigOrigin::User,
                ConfigOrigin::Project,
                ConfigOrigin::Cli
            ]
        );
    }

    #[test]
    fn test_source_digest() {
        let contents = "tool = \"nerdctl\"\n";
        let project = toml_file(contents);
        let config = EffectiveConfig::build(None, Some(project.path()), None).unwrap();

        let expected = hex::encode(Sha256::digest(contents.as_bytes()));
        assert_eq!(config.sources[1].digest.as_deref(), Some(expected.as_str()));
    }

    #[test]
    fn test_missing_user_file_is_skipped() {
        let config =
            EffectiveConfig::build(Some(Path::new("/nonexistent/mpack.toml")), None, None).unwrap();
        assert_eq!(config.sources.len(), 1);
    }

    #[test]
    fn test_missing_project_file_is_error() {
        let result = EffectiveConfig::build(None, Some(Path::new("/nonexistent/mpack.toml")), None);
        assert!(matches!(result, Err(ConfigError::IoError(_))));
    }

    #[test]
    fn test_invalid_toml() {
        let project = toml_file("tool = [unterminated\n");
        let result = EffectiveConfig::build(None, Some(project.path()), None);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_merge_arrays_replace() {
        let merged = deep_merge(
            json!({ "frameworks": { "pytorch": { "extensions": ["pth", "pt"] } } }),
            json!({ "frameworks": { "pytorch": { "extensions": ["bin"] } } }),
        );
        assert_eq!(merged["frameworks"]["pytorch"]["extensions"], json!(["bin"]));
    }

    #[test]
    fn test_merge_null_keeps_base() {
        let merged = deep_merge(
            json!({ "timeouts": { "build_secs": 1800 } }),
            json!({ "timeouts": { "build_secs": null } }),
        );
        assert_eq!(merged["timeouts"]["build_secs"], 1800);
    }
}
