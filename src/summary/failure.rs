//! Outcome taxonomy and stable exit codes

use serde::{Deserialize, Serialize};

/// Which way a packaging run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackagingPath {
    /// Container image built (and verified best-effort)
    Image,
    /// Portable archive produced instead of an image
    Fallback,
    /// Neither path produced an artifact
    Failed,
    /// Build exceeded its deadline
    Timeout,
    /// Interrupted by the user
    Cancelled,
}

impl PackagingPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            PackagingPath::Image => "image",
            PackagingPath::Fallback => "fallback",
            PackagingPath::Failed => "failed",
            PackagingPath::Timeout => "timeout",
            PackagingPath::Cancelled => "cancelled",
        }
    }

    pub fn default_exit_code(&self) -> ExitCode {
        match self {
            PackagingPath::Image | PackagingPath::Fallback => ExitCode::Success,
            PackagingPath::Failed => ExitCode::Failure,
            PackagingPath::Timeout => ExitCode::Timeout,
            PackagingPath::Cancelled => ExitCode::Cancelled,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, PackagingPath::Image | PackagingPath::Fallback)
    }
}

impl std::fmt::Display for PackagingPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Process exit codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[repr(i32)]
pub enum ExitCode {
    /// Image or fallback archive produced
    #[default]
    Success = 0,
    /// Packaging failed
    Failure = 1,
    /// Invalid request or configuration
    Validation = 2,
    /// Build timed out
    Timeout = 124,
    /// Interrupted
    Cancelled = 130,
}

impl ExitCode {
    pub fn as_i32(&self) -> i32 {
        *self as i32
    }

    pub fn from_i32(code: i32) -> Option<Self> {
        match code {
            0 => Some(ExitCode::Success),
            1 => Some(ExitCode::Failure),
            2 => Some(ExitCode::Validation),
            124 => Some(ExitCode::Timeout),
            130 => Some(ExitCode::Cancelled),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExitCode::Success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_serialization() {
        assert_eq!(serde_json::to_string(&PackagingPath::Image).unwrap(), r#""image""#);
        assert_eq!(
            serde_json::to_string(&PackagingPath::Fallback).unwrap(),
            r#""fallback""#
        );
        assert_eq!(
            serde_json::to_string(&PackagingPath::Cancelled).unwrap(),
            r#""cancelled""#
        );
    }

    #[test]
    fn test_exit_code_values() {
        assert_eq!(ExitCode::Success.as_i32(), 0);
        assert_eq!(ExitCode::Failure.as_i32(), 1);
        assert_eq!(ExitCode::Validation.as_i32(), 2);
        assert_eq!(ExitCode::Timeout.as_i32(), 124);
        assert_eq!(ExitCode::Cancelled.as_i32(), 130);
    }

    #[test]
    fn test_exit_code_roundtrip() {
        for code in [0, 1, 2, 124, 130] {
            assert_eq!(ExitCode::from_i32(code).unwrap().as_i32(), code);
        }
        assert_eq!(ExitCode::from_i32(50), None);
    }

    #[test]
    fn test_path_exit_codes() {
        assert!(PackagingPath::Fallback.default_exit_code().is_success());
        assert_eq!(PackagingPath::Timeout.default_exit_code(), ExitCode::Timeout);
        assert_eq!(PackagingPath::Failed.default_exit_code(), ExitCode::Failure);
        assert!(!PackagingPath::Cancelled.is_success());
    }
}
