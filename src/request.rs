//! Packaging request and its validation.
//!
//! A request is validated once, when it is built, and never mutated
//! afterwards. Validation has no side effects on disk.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use regex_lite::Regex;

use crate::config::DEFAULT_BUILD_TIMEOUT_SECS;

/// `[registry[:port]/]name[/name...][:tag]` with lowercase name components.
const IMAGE_REFERENCE_PATTERN: &str = concat!(
    r"^(?:[A-Za-z0-9][A-Za-z0-9.-]*(?::[0-9]+)?/)?",
    r"[a-z0-9]+(?:(?:[._]|__|-+)[a-z0-9]+)*",
    r"(?:/[a-z0-9]+(?:(?:[._]|__|-+)[a-z0-9]+)*)*",
    r"(?::[A-Za-z0-9_][A-Za-z0-9_.-]{0,127})?$",
);

fn image_reference_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(IMAGE_REFERENCE_PATTERN).expect("image reference pattern is valid"))
}

/// Request validation errors
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("model file not found: {0}")]
    ModelNotFound(PathBuf),

    #[error("model path is not a regular file: {0}")]
    ModelNotAFile(PathBuf),

    #[error("model file is not readable: {path}: {source}")]
    ModelUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("artifact identifier must not be empty")]
    EmptyArtifactId,

    #[error("invalid artifact identifier '{0}' (expected [registry/]name[:tag], lowercase name)")]
    InvalidArtifactId(String),

    #[error("build timeout must be greater than zero")]
    ZeroTimeout,
}

/// One packaging invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagingRequest {
    model_path: PathBuf,
    artifact_id: String,
    framework_override: Option<String>,
    build_timeout: Duration,
    verbose: bool,
    disable_build_tool: bool,
    push: bool,
    registry: Option<String>,
}

impl PackagingRequest {
    /// Start building a request for `model_path` tagged `artifact_id`.
    pub fn builder(model_path: impl Into<PathBuf>, artifact_id: impl Into<String>) -> PackagingRequestBuilder {
        PackagingRequestBuilder {
            request: PackagingRequest {
                model_path: model_path.into(),
                artifact_id: artifact_id.into(),
                framework_override: None,
                build_timeout: Duration::from_secs(DEFAULT_BUILD_TIMEOUT_SECS),
                verbose: false,
                disable_build_tool: false,
                push: false,
                registry: None,
            },
        }
    }

    /// Re-check the request. Called by the builder and again at pipeline start.
    pub fn validate(&self) -> Result<(), RequestError> {
        let id = self.artifact_id.trim();
        if id.is_empty() {
            return Err(RequestError::EmptyArtifactId);
        }
        let target = self.target_image();
        if !image_reference_regex().is_match(&target) {
            return Err(RequestError::InvalidArtifactId(target));
        }
        if self.build_timeout.is_zero() {
            return Err(RequestError::ZeroTimeout);
        }

        let path = &self.model_path;
        let meta = match path.metadata() {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RequestError::ModelNotFound(path.clone()));
            }
            Err(source) => {
                return Err(RequestError::ModelUnreadable {
                    path: path.clone(),
                    source,
                })
            }
        };
        if !meta.is_file() {
            return Err(RequestError::ModelNotAFile(path.clone()));
        }
        File::open(path).map_err(|source| RequestError::ModelUnreadable {
            path: path.clone(),
            source,
        })?;

        Ok(())
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    /// The identifier as requested, without registry prefix.
    pub fn artifact_id(&self) -> &str {
        self.artifact_id.trim()
    }

    /// Identifier handed to the build tool: `registry/name:tag` when a
    /// registry prefix is set.
    pub fn target_image(&self) -> String {
        match self.registry.as_deref().map(|r| r.trim().trim_end_matches('/')) {
            Some(prefix) if !prefix.is_empty() => format!("{}/{}", prefix, self.artifact_id()),
            _ => self.artifact_id().to_string(),
        }
    }

    pub fn framework_override(&self) -> Option<&str> {
        self.framework_override.as_deref()
    }

    pub fn build_timeout(&self) -> Duration {
        self.build_timeout
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }

    pub fn disable_build_tool(&self) -> bool {
        self.disable_build_tool
    }

    pub fn push(&self) -> bool {
        self.push
    }

    /// Fallback package base name: the requested identifier with `:` and
    /// `/` replaced by `_`.
    pub fn package_name(&self) -> String {
        crate::fallback::package_name_for(self.artifact_id())
    }
}

/// Builder for [`PackagingRequest`].
#[derive(Debug, Clone)]
pub struct PackagingRequestBuilder {
    request: PackagingRequest,
}

impl PackagingRequestBuilder {
    /// Framework override (`auto`, `pytorch`, `tensorflow`).
    pub fn framework(mut self, framework: impl Into<String>) -> Self {
        self.request.framework_override = Some(framework.into());
        self
    }

    pub fn build_timeout(mut self, timeout: Duration) -> Self {
        self.request.build_timeout = timeout;
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.request.verbose = verbose;
        self
    }

    pub fn disable_build_tool(mut self, disable: bool) -> Self {
        self.request.disable_build_tool = disable;
        self
    }

    pub fn push(mut self, push: bool) -> Self {
        self.request.push = push;
        self
    }

    pub fn registry(mut self, registry: Option<String>) -> Self {
        self.request.registry = registry;
        self
    }

    /// Validate and freeze the request.
    pub fn build(self) -> Result<PackagingRequest, RequestError> {
        self.request.validate()?;
        Ok(self.request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn model(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("resnet18.pth");
        std::fs::write(&path, b"weights").unwrap();
        path
    }

    #[test]
    fn test_valid_request() {
        let dir = TempDir::new().unwrap();
        let req = PackagingRequest::builder(model(&dir), "my_ai_model:1.0")
            .framework("auto")
            .verbose(true)
            .build()
            .unwrap();
        assert_eq!(req.target_image(), "my_ai_model:1.0");
        assert!(req.verbose());
        assert_eq!(req.framework_override(), Some("auto"));
    }

    #[test]
    fn test_missing_model() {
        let err = PackagingRequest::builder("/nonexistent/model.pth", "m:1")
            .build()
            .unwrap_err();
        assert!(matches!(err, RequestError::ModelNotFound(_)));
    }

    #[test]
    fn test_model_is_directory() {
        let dir = TempDir::new().unwrap();
        let err = PackagingRequest::builder(dir.path(), "m:1").build().unwrap_err();
        assert!(matches!(err, RequestError::ModelNotAFile(_)));
    }

    #[test]
    fn test_empty_artifact_id() {
        let dir = TempDir::new().unwrap();
        let err = PackagingRequest::builder(model(&dir), "  ").build().unwrap_err();
        assert!(matches!(err, RequestError::EmptyArtifactId));
    }

    #[test]
    fn test_artifact_id_checked_before_model() {
        let err = PackagingRequest::builder("/nonexistent/model.pth", "")
            .build()
            .unwrap_err();
        assert!(matches!(err, RequestError::EmptyArtifactId));
    }

    #[test]
    fn test_invalid_artifact_ids() {
        let dir = TempDir::new().unwrap();
        let path = model(&dir);
        for bad in ["My_Model:1.0", "model:", "model:1.0:2", "mo del", "model\"x", "-model"] {
            let err = PackagingRequest::builder(&path, bad).build().unwrap_err();
            assert!(
                matches!(err, RequestError::InvalidArtifactId(_)),
                "expected rejection for {bad:?}"
            );
        }
    }

    #[test]
    fn test_valid_artifact_ids() {
        let dir = TempDir::new().unwrap();
        let path = model(&dir);
        for good in ["model", "model:latest", "org/model:v1.2.3", "my-model_x:1.0", "a__b:T_1"] {
            assert!(
                PackagingRequest::builder(&path, good).build().is_ok(),
                "expected {good:?} to be accepted"
            );
        }
    }

    #[test]
    fn test_registry_prefix() {
        let dir = TempDir::new().unwrap();
        let path = model(&dir);

        let req = PackagingRequest::builder(&path, "model:1.0")
            .registry(Some("ghcr.io/acme".to_string()))
            .build()
            .unwrap();
        assert_eq!(req.target_image(), "ghcr.io/acme/model:1.0");
        assert_eq!(req.artifact_id(), "model:1.0");

        let req = PackagingRequest::builder(&path, "model:1.0")
            .registry(Some("localhost:5000/".to_string()))
            .build()
            .unwrap();
        assert_eq!(req.target_image(), "localhost:5000/model:1.0");
    }

    #[test]
    fn test_zero_timeout() {
        let dir = TempDir::new().unwrap();
        let err = PackagingRequest::builder(model(&dir), "m:1")
            .build_timeout(Duration::ZERO)
            .build()
            .unwrap_err();
        assert!(matches!(err, RequestError::ZeroTimeout));
    }

    #[test]
    fn test_package_name() {
        let dir = TempDir::new().unwrap();
        let req = PackagingRequest::builder(model(&dir), "org/my_model:1.0")
            .build()
            .unwrap();
        assert_eq!(req.package_name(), "org_my_model_1.0");
    }
}
