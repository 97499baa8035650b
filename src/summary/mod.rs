//! Packaging summary and exit code taxonomy

mod failure;
mod packaging;

pub use failure::{ExitCode, PackagingPath};
pub use packaging::{
    file_sha256, BuildRecord, PackagingSummary, SUMMARY_FILE_NAME, SUMMARY_SCHEMA_ID,
    SUMMARY_SCHEMA_VERSION,
};
