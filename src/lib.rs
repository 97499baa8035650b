//! Model packager
//!
//! Packages a trained model file into a container image built by an external
//! tool (`docker` by default) or, when no image can be built, into a portable
//! zip archive that runs the same inference entry point locally.

pub mod config;
pub mod context;
pub mod fallback;
pub mod output;
pub mod pipeline;
pub mod request;
pub mod signal;
pub mod summary;
pub mod timeout;
pub mod tool;

pub use config::{ConfigError, PackagerConfig};
pub use context::{BuildContext, ContextAssembler, ContextError};
pub use fallback::{FallbackError, FallbackPackager};
pub use output::{Output, SharedBuffer};
pub use pipeline::{Pipeline, PipelineError, PipelineOptions};
pub use request::{PackagingRequest, RequestError};
pub use signal::Interrupt;
pub use summary::{ExitCode, PackagingPath, PackagingSummary};
pub use tool::{Availability, BuildExecutor, BuildOutcome, BuildTool, Verification};

pub use mpack_framework::{Framework, FrameworkProfile, ProfileTable};
