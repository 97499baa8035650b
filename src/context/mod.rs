//! Build context assembly
//!
//! Produces the directory handed to `<tool> build`:
//!
//! ```text
//! build_context/
//!   model.<ext>        copy of the model, canonical name
//!   requirements.txt   framework dependency manifest
//!   Dockerfile         rendered descriptor
//!   .dockerignore      static ignore list
//!   infer.py           inference entry point
//!   sample.jpg         sample input (or generated placeholder)
//! ```
//!
//! The directory is reused if it exists and is never removed afterwards.

mod descriptor;
mod ignore;
mod sample;

pub use descriptor::{
    canonical_model_filename, render as render_descriptor, validate_filename, DescriptorError,
    BASE_IMAGE, DESCRIPTOR_FILE,
};
pub use ignore::IGNORE_FILE;
pub use sample::placeholder_image;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use mpack_framework::{Framework, FrameworkProfile};

use crate::config::PackagerConfig;
use crate::request::PackagingRequest;

pub const REQUIREMENTS_FILE: &str = "requirements.txt";
pub const ENTRY_POINT_FILE: &str = "infer.py";
pub const SAMPLE_FILE: &str = "sample.jpg";

/// Errors for build context assembly
#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("failed to create build context directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to copy {from} to {to}: {source}")]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("inference entry point not found: {0}")]
    EntryPointMissing(PathBuf),

    #[error("invalid build descriptor: {0}")]
    Descriptor(#[from] DescriptorError),
}

/// An assembled build context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildContext {
    pub dir: PathBuf,
    /// Canonical model file name inside `dir`.
    pub model_file: String,
    pub framework: Framework,
    /// Files written, in creation order.
    pub files: Vec<String>,
}

impl BuildContext {
    pub fn descriptor_path(&self) -> PathBuf {
        self.dir.join(DESCRIPTOR_FILE)
    }
}

/// Writes build contexts.
#[derive(Debug, Clone)]
pub struct ContextAssembler {
    dir: PathBuf,
    entry_point: PathBuf,
    sample_input: PathBuf,
}

impl ContextAssembler {
    pub fn new(dir: impl Into<PathBuf>, entry_point: impl Into<PathBuf>, sample_input: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            entry_point: entry_point.into(),
            sample_input: sample_input.into(),
        }
    }

    pub fn from_config(config: &PackagerConfig) -> Self {
        Self::new(
            config.context_path(),
            config.entry_point_path(),
            config.sample_input_path(),
        )
    }

    /// Assemble the context for `request` using `profile`.
    pub fn assemble(
        &self,
        request: &PackagingRequest,
        profile: &FrameworkProfile,
    ) -> Result<BuildContext, ContextError> {
        let model_file = canonical_model_filename(request.model_path());
        validate_filename(&model_file)?;

        let reused = self.dir.is_dir()
            && fs::read_dir(&self.dir)
                .map(|mut entries| entries.next().is_some())
                .unwrap_or(false);
        if reused {
            tracing::warn!(
                dir = %self.dir.display(),
                "reusing existing build context; stale files may be present"
            );
        }

        fs::create_dir_all(&self.dir).map_err(|source| ContextError::CreateDir {
            path: self.dir.clone(),
            source,
        })?;

        self.populate(request, profile, model_file).map_err(|e| {
            tracing::warn!(
                dir = %self.dir.display(),
                error = %e,
                "build context left partially assembled"
            );
            e
        })
    }

    fn populate(
        &self,
        request: &PackagingRequest,
        profile: &FrameworkProfile,
        model_file: String,
    ) -> Result<BuildContext, ContextError> {
        let mut files = Vec::new();

        let model_dest = self.dir.join(&model_file);
        copy_preserving_mtime(request.model_path(), &model_dest)?;
        tracing::debug!(from = %request.model_path().display(), to = %model_dest.display(), "copied model");
        files.push(model_file.clone());

        self.write(REQUIREMENTS_FILE, profile.manifest().as_bytes())?;
        files.push(REQUIREMENTS_FILE.to_string());

        self.write(DESCRIPTOR_FILE, render_descriptor(&model_file)?.as_bytes())?;
        files.push(DESCRIPTOR_FILE.to_string());

        self.write(IGNORE_FILE, ignore::render().as_bytes())?;
        files.push(IGNORE_FILE.to_string());

        if !self.entry_point.is_file() {
            return Err(ContextError::EntryPointMissing(self.entry_point.clone()));
        }
        copy(&self.entry_point, &self.dir.join(ENTRY_POINT_FILE))?;
        files.push(ENTRY_POINT_FILE.to_string());

        if self.sample_input.is_file() {
            copy(&self.sample_input, &self.dir.join(SAMPLE_FILE))?;
        } else {
            tracing::warn!(
                sample = %self.sample_input.display(),
                "sample input not found; writing generated placeholder image"
            );
            self.write(SAMPLE_FILE, &placeholder_image())?;
        }
        files.push(SAMPLE_FILE.to_string());

        Ok(BuildContext {
            dir: self.dir.clone(),
            model_file,
            framework: profile.framework,
            files,
        })
    }

    fn write(&self, name: &str, contents: &[u8]) -> Result<(), ContextError> {
        let path = self.dir.join(name);
        fs::write(&path, contents).map_err(|source| ContextError::Write { path, source })
    }
}

pub(crate) fn copy(from: &Path, to: &Path) -> Result<(), ContextError> {
    fs::copy(from, to)
        .map(|_| ())
        .map_err(|source| ContextError::Copy {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
            source,
        })
}

/// `fs::copy` keeps permissions; the modification time is carried over
/// separately.
pub(crate) fn copy_preserving_mtime(from: &Path, to: &Path) -> Result<(), ContextError> {
    copy(from, to)?;
    let copy_err = |source| ContextError::Copy {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    };
    let mtime = fs::metadata(from).and_then(|m| m.modified()).map_err(copy_err)?;
    fs::OpenOptions::new()
        .write(true)
        .open(to)
        .and_then(|f| f.set_modified(mtime))
        .map_err(copy_err)
}
