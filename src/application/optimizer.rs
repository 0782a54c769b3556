//! Format optimizer port: turns an original image into an AVIF/WebP variant.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::variants::ImageFormat;

#[derive(Debug, Error)]
pub enum OptimizerError {
    #[error("source `{0}` is not a convertible image")]
    UnsupportedSource(PathBuf),
    #[error("source `{0}` is outside the uploads tree")]
    OutsideUploads(PathBuf),
    #[error("converter unavailable: {0}")]
    NotFound(io::Error),
    #[error("converter invocation failed (exit {exit_code:?}): {stderr}")]
    Cli {
        exit_code: Option<i32>,
        stderr: String,
    },
    #[error("converter reported success but `{0}` was not written")]
    MissingOutput(PathBuf),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Target box for a responsive variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resize {
    pub width: u32,
    pub height: u32,
}

/// Generates variant files. Implementations decide where outputs land but
/// must follow the `<basename>[-<width>w].<format>` naming convention.
#[async_trait]
pub trait FormatOptimizer: Send + Sync {
    /// Encode `source` as `format`, optionally downscaled to `resize`.
    /// Returns the path of the written variant.
    async fn generate(
        &self,
        source: &Path,
        format: ImageFormat,
        resize: Option<Resize>,
    ) -> Result<PathBuf, OptimizerError>;
}
