//! Framework-specific model loaders.
//!
//! Both loaders hand the forward pass to the entry point script; what they
//! own is the up-front check that the file on disk is in a container format
//! the framework can actually read, so a mismatched file fails fast with a
//! load error instead of after an interpreter start-up.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use mpack_framework::Framework;

use crate::script::{ScriptModel, ScriptRunner};
use crate::{InferenceError, InferenceResult, Model, ModelLoader};

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const PICKLE_PROTO: u8 = 0x80;
const HDF5_MAGIC: &[u8] = b"\x89HDF\r\n\x1a\n";

/// HDF5 superblocks may sit behind a user block at these offsets.
const HDF5_OFFSETS: &[usize] = &[0, 512, 1024, 2048];

/// Loader for serialized PyTorch modules (zip archive or legacy pickle).
#[derive(Debug, Clone, Default)]
pub struct TorchLoader {
    runner: ScriptRunner,
}

impl TorchLoader {
    pub fn new(runner: ScriptRunner) -> Self {
        Self { runner }
    }
}

impl ModelLoader for TorchLoader {
    fn framework(&self) -> Framework {
        Framework::Pytorch
    }

    fn load_model(&self, path: &Path) -> InferenceResult<Box<dyn Model>> {
        let head = read_head(path, 8)?;
        if !(head.starts_with(ZIP_MAGIC) || head.first() == Some(&PICKLE_PROTO)) {
            return Err(InferenceError::Load {
                framework: Framework::Pytorch,
                detail: format!(
                    "{} is neither a torch zip archive nor a pickle stream",
                    path.display()
                ),
            });
        }
        Ok(Box::new(ScriptModel::new(
            Framework::Pytorch,
            path.to_path_buf(),
            self.runner.clone(),
        )))
    }
}

/// Loader for Keras models (HDF5 or the zip-based `.keras` format).
#[derive(Debug, Clone, Default)]
pub struct KerasLoader {
    runner: ScriptRunner,
}

impl KerasLoader {
    pub fn new(runner: ScriptRunner) -> Self {
        Self { runner }
    }
}

impl ModelLoader for KerasLoader {
    fn framework(&self) -> Framework {
        Framework::Tensorflow
    }

    fn load_model(&self, path: &Path) -> InferenceResult<Box<dyn Model>> {
        let head = read_head(path, 2048 + HDF5_MAGIC.len())?;
        let is_hdf5 = HDF5_OFFSETS
            .iter()
            .any(|&off| head.get(off..off + HDF5_MAGIC.len()) == Some(HDF5_MAGIC));
        if !(is_hdf5 || head.starts_with(ZIP_MAGIC)) {
            return Err(InferenceError::Load {
                framework: Framework::Tensorflow,
                detail: format!(
                    "{} is neither an HDF5 file nor a .keras archive",
                    path.display()
                ),
            });
        }
        Ok(Box::new(ScriptModel::new(
            Framework::Tensorflow,
            path.to_path_buf(),
            self.runner.clone(),
        )))
    }
}

/// Select the loader for a detected framework.
pub fn loader_for(framework: Framework, runner: ScriptRunner) -> Box<dyn ModelLoader> {
    match framework {
        Framework::Pytorch => Box::new(TorchLoader::new(runner)),
        Framework::Tensorflow => Box::new(KerasLoader::new(runner)),
    }
}

/// Read up to `limit` leading bytes.
fn read_head(path: &Path, limit: usize) -> InferenceResult<Vec<u8>> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(InferenceError::ModelNotFound(path.display().to_string()));
        }
        Err(e) => return Err(e.into()),
    };
    let mut head = Vec::with_capacity(limit);
    file.take(limit as u64).read_to_end(&mut head)?;
    Ok(head)
}
