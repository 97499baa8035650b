//! Capability interface for the packaged inference entry point.
//!
//! The numerical inference lives in the entry point script shipped inside
//! every artifact. This crate fronts it with two traits so callers pick an
//! implementation by framework instead of branching on file extensions:
//!
//! - [`ModelLoader::load_model`] checks the model file and returns a [`Model`]
//! - [`Model::predict`] runs one forward pass and returns [`Predictions`]
//!
//! [`TorchLoader`] and [`KerasLoader`] are the two concrete loaders;
//! [`loader_for`] selects one from a detected [`Framework`].

mod loader;
mod report;
mod script;

pub use loader::{loader_for, KerasLoader, TorchLoader};
pub use report::{rank, Prediction, Predictions, TOP_K};
pub use script::{ScriptModel, ScriptRunner};

pub use mpack_framework::Framework;

use std::path::Path;

/// Errors surfaced by the inference capability.
#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),

    #[error("inference entry point not found: {0}")]
    EntryPointNotFound(String),

    #[error("failed to load {framework} model: {detail}")]
    Load { framework: Framework, detail: String },

    #[error("failed to preprocess input: {0}")]
    Preprocess(String),

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("failed to start interpreter '{interpreter}': {source}")]
    Spawn {
        interpreter: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for inference operations.
pub type InferenceResult<T> = Result<T, InferenceError>;

/// Loads a model file for one framework.
pub trait ModelLoader {
    /// Framework this loader handles.
    fn framework(&self) -> Framework;

    /// Validate and load the model at `path`.
    fn load_model(&self, path: &Path) -> InferenceResult<Box<dyn Model>>;
}

/// A loaded model.
pub trait Model {
    /// Framework the model was loaded with.
    fn framework(&self) -> Framework;

    /// Run a single forward pass. `None` uses the entry point's synthetic input.
    fn predict(&self, input: Option<&Path>) -> InferenceResult<Predictions>;
}
