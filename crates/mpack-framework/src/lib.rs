//! Framework profiles and model-file detection.
//!
//! A model file is routed to one of two runtime framework families. The
//! routing decides which dependency manifest gets packaged and which loader
//! the inference entry point uses.

mod detect;
mod profile;

pub use detect::{detect, detect_with_table};
pub use profile::{FrameworkProfile, ProfileTable};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Runtime framework families a model can be packaged for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Framework {
    /// Serialized-tensor formats (`.pth`, `.pt`).
    Pytorch,
    /// Layered-model formats (`.h5`, `.keras`).
    Tensorflow,
}

impl Framework {
    /// All supported frameworks, in table order.
    pub const ALL: [Framework; 2] = [Framework::Pytorch, Framework::Tensorflow];

    /// Stable identifier used in config files and summaries.
    pub fn as_str(&self) -> &'static str {
        match self {
            Framework::Pytorch => "pytorch",
            Framework::Tensorflow => "tensorflow",
        }
    }

    /// Human-readable label.
    pub fn display_name(&self) -> &'static str {
        match self {
            Framework::Pytorch => "PyTorch",
            Framework::Tensorflow => "TensorFlow/Keras",
        }
    }
}

impl fmt::Display for Framework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a framework name is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown framework '{0}' (expected auto, pytorch or tensorflow)")]
pub struct ParseFrameworkError(pub String);

impl FromStr for Framework {
    type Err = ParseFrameworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pytorch" | "torch" => Ok(Framework::Pytorch),
            "tensorflow" | "tf" | "keras" => Ok(Framework::Tensorflow),
            _ => Err(ParseFrameworkError(s.to_string())),
        }
    }
}

/// Framework selection requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameworkChoice {
    /// Detect from the model file extension.
    #[default]
    Auto,
    /// Use the given framework regardless of extension.
    Explicit(Framework),
}

impl FrameworkChoice {
    /// Parse an override string. `auto` and unrecognized values both mean
    /// "detect"; the detector never fails on a bad override.
    pub fn parse_lenient(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("auto") {
            return FrameworkChoice::Auto;
        }
        match s.parse::<Framework>() {
            Ok(fw) => FrameworkChoice::Explicit(fw),
            Err(_) => FrameworkChoice::Auto,
        }
    }
}
