//! Built-in defaults (layer 1)

use serde_json::Value;

use super::PackagerConfig;

pub const DEFAULT_TOOL: &str = "docker";
pub const DEFAULT_CONTEXT_DIR: &str = "build_context";
pub const DEFAULT_ENTRY_POINT: &str = "infer.py";
pub const DEFAULT_LOADER_SCRIPT: &str = "model_loader.py";
pub const DEFAULT_SAMPLE_INPUT: &str = "sample.jpg";
pub const DEFAULT_INTERPRETER: &str = "python3";
pub const PROJECT_CONFIG_FILE: &str = "mpack.toml";

pub const DEFAULT_BUILD_TIMEOUT_SECS: u64 = 1800;
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_VERIFY_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_PUSH_TIMEOUT_SECS: u64 = 900;
pub const DEFAULT_TERMINATION_GRACE_SECS: u64 = 10;
pub const DEFAULT_LOG_TAIL_LINES: usize = 200;

/// Defaults as a JSON layer for merging.
pub fn default_layer() -> Value {
    // strings, paths, integers and maps only; serialization cannot fail
    serde_json::to_value(PackagerConfig::default()).unwrap_or(Value::Null)
}
