//! Portable fallback packaging
//!
//! Used when no image can be built. Produces a directory plus a deflate zip
//! archive that runs the same entry point with a local interpreter:
//!
//! ```text
//! <output>/<name>_package/
//!   model.<ext>  infer.py  model_loader.py  requirements.txt  run.py  run.bat
//! <output>/<name>_package.zip
//! ```

mod launcher;

pub use launcher::{render_run_bat, render_run_py, RUN_BAT, RUN_PY};

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use mpack_framework::FrameworkProfile;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::config::PackagerConfig;
use crate::context::{
    self, canonical_model_filename, validate_filename, ContextError, DescriptorError,
    ENTRY_POINT_FILE, REQUIREMENTS_FILE,
};

pub const LOADER_FILE: &str = "model_loader.py";

/// Errors for fallback packaging
#[derive(Debug, thiserror::Error)]
pub enum FallbackError {
    #[error("model file not found: {0}")]
    ModelNotFound(PathBuf),

    #[error("required script not found: {0}")]
    CompanionMissing(PathBuf),

    #[error("failed to create package directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Stage(#[from] ContextError),

    #[error("invalid model filename: {0}")]
    Filename(#[from] DescriptorError),

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to walk package directory: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("failed to write archive: {0}")]
    Archive(#[from] zip::result::ZipError),
}

/// Package base name for an artifact identifier: `:` and `/` become `_`.
pub fn package_name_for(artifact_id: &str) -> String {
    artifact_id.trim().replace([':', '/'], "_")
}

/// Writes portable packages.
#[derive(Debug, Clone)]
pub struct FallbackPackager {
    output_dir: PathBuf,
    entry_point: PathBuf,
    loader_script: PathBuf,
}

impl FallbackPackager {
    pub fn new(
        output_dir: impl Into<PathBuf>,
        entry_point: impl Into<PathBuf>,
        loader_script: impl Into<PathBuf>,
    ) -> Self {
        Self {
            output_dir: output_dir.into(),
            entry_point: entry_point.into(),
            loader_script: loader_script.into(),
        }
    }

    pub fn from_config(config: &PackagerConfig) -> Self {
        Self::new(
            config.output_path(),
            config.entry_point_path(),
            config.loader_script_path(),
        )
    }

    pub fn package_dir(&self, package_name: &str) -> PathBuf {
        self.output_dir.join(format!("{}_package", package_name))
    }

    pub fn archive_path(&self, package_name: &str) -> PathBuf {
        self.output_dir.join(format!("{}_package.zip", package_name))
    }

    /// Build the package directory and archive. Returns the archive path.
    pub fn package(
        &self,
        model_path: &Path,
        package_name: &str,
        profile: &FrameworkProfile,
    ) -> Result<PathBuf, FallbackError> {
        if !model_path.is_file() {
            return Err(FallbackError::ModelNotFound(model_path.to_path_buf()));
        }
        for companion in [&self.entry_point, &self.loader_script] {
            if !companion.is_file() {
                return Err(FallbackError::CompanionMissing(companion.clone()));
            }
        }

        let model_file = canonical_model_filename(model_path);
        validate_filename(&model_file)?;

        let dir = self.package_dir(package_name);
        if dir.exists() {
            tracing::warn!(dir = %dir.display(), "reusing existing package directory; stale files will be archived");
        }
        fs::create_dir_all(&dir).map_err(|source| FallbackError::CreateDir {
            path: dir.clone(),
            source,
        })?;
        tracing::info!(dir = %dir.display(), framework = %profile.framework, "creating portable package");

        context::copy_preserving_mtime(model_path, &dir.join(&model_file))?;
        context::copy(&self.entry_point, &dir.join(ENTRY_POINT_FILE))?;
        context::copy(&self.loader_script, &dir.join(LOADER_FILE))?;

        write(&dir.join(REQUIREMENTS_FILE), profile.manifest().as_bytes())?;
        let run_py = dir.join(RUN_PY);
        write(&run_py, render_run_py(&model_file).as_bytes())?;
        make_executable(&run_py)?;
        write(&dir.join(RUN_BAT), render_run_bat().as_bytes())?;

        let archive = self.archive_path(package_name);
        let count = write_archive(&dir, &archive)?;
        tracing::info!(archive = %archive.display(), files = count, "package archive written");
        Ok(archive)
    }
}

fn write(path: &Path, contents: &[u8]) -> Result<(), FallbackError> {
    fs::write(path, contents).map_err(|source| FallbackError::Write {
        path: path.to_path_buf(),
        source,
    })
}

fn make_executable(path: &Path) -> Result<(), FallbackError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755)).map_err(|source| {
            FallbackError::Write {
                path: path.to_path_buf(),
                source,
            }
        })?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

/// Zip every regular file under `dir`, sorted, with paths relative to `dir`.
fn write_archive(dir: &Path, archive: &Path) -> Result<usize, FallbackError> {
    let file = File::create(archive).map_err(|source| FallbackError::Write {
        path: archive.to_path_buf(),
        source,
    })?;
    let mut zip = ZipWriter::new(file);
    let base = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut count = 0;
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(dir) else {
            continue;
        };
        let name = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");

        zip.start_file(name, base.unix_permissions(file_mode(entry.path())))?;
        let mut src = File::open(entry.path()).map_err(|source| FallbackError::Write {
            path: entry.path().to_path_buf(),
            source,
        })?;
        io::copy(&mut src, &mut zip).map_err(|source| FallbackError::Write {
            path: archive.to_path_buf(),
            source,
        })?;
        count += 1;
    }

    zip.finish()?;
    Ok(count)
}

fn file_mode(path: &Path) -> u32 {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::metadata(path)
            .map(|m| m.permissions().mode() & 0o777)
            .unwrap_or(0o644)
    }
    #[cfg(not(unix))]
    {
        if path.file_name().and_then(|n| n.to_str()) == Some(RUN_PY) {
            0o755
        } else {
            0o644
        }
    }
}
