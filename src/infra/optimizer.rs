//! Format optimizer backed by an external image converter CLI.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use tokio::{fs, process::Command};
use tracing::{info, warn};

use crate::application::optimizer::{FormatOptimizer, OptimizerError, Resize};
use crate::domain::media::is_convertible_path;
use crate::domain::settings::OptimizationSettings;
use crate::domain::variants::{ImageFormat, VariantFileName};

use super::paths::PathMapper;

/// Invokes an ImageMagick-compatible converter
/// (`<cli> <source> [-resize WxH] -quality Q <output>`).
///
/// Outputs mirror the original's directory below the variants root.
#[derive(Debug, Clone)]
pub struct CommandOptimizer {
    cli_path: PathBuf,
    mapper: PathMapper,
    avif_quality: u8,
    webp_quality: u8,
}

impl CommandOptimizer {
    pub fn new(cli_path: PathBuf, mapper: PathMapper, settings: &OptimizationSettings) -> Self {
        Self {
            cli_path,
            mapper,
            avif_quality: settings.avif_quality,
            webp_quality: settings.webp_quality,
        }
    }

    fn quality(&self, format: ImageFormat) -> u8 {
        match format {
            ImageFormat::Avif => self.avif_quality,
            ImageFormat::Webp => self.webp_quality,
        }
    }

    /// Where the variant for `source` would be written.
    pub fn output_path(
        &self,
        source: &Path,
        format: ImageFormat,
        resize: Option<Resize>,
    ) -> Result<PathBuf, OptimizerError> {
        let directory = self
            .mapper
            .variant_dir_for(source)
            .ok_or_else(|| OptimizerError::OutsideUploads(source.to_path_buf()))?;
        let basename = source
            .file_stem()
            .and_then(|stem| stem.to_str())
            .ok_or_else(|| OptimizerError::UnsupportedSource(source.to_path_buf()))?;
        let file_name =
            VariantFileName::render(basename, resize.map(|resize| resize.width), format);
        Ok(directory.join(file_name))
    }
}

#[async_trait]
impl FormatOptimizer for CommandOptimizer {
    async fn generate(
        &self,
        source: &Path,
        format: ImageFormat,
        resize: Option<Resize>,
    ) -> Result<PathBuf, OptimizerError> {
        if !is_convertible_path(source) {
            return Err(OptimizerError::UnsupportedSource(source.to_path_buf()));
        }

        let output_path = self.output_path(source, format, resize)?;
        if let Some(parent) = output_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let started_at = Instant::now();
        let mut command = Command::new(&self.cli_path);
        command.arg(source);
        if let Some(resize) = resize {
            command
                .arg("-resize")
                .arg(format!("{}x{}", resize.width, resize.height));
        }
        command
            .arg("-quality")
            .arg(self.quality(format).to_string())
            .arg(&output_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        let output = command.output().await.map_err(|err| {
            warn!(
                op = "optimizer::generate",
                result = "error",
                error_code = "spawn_cli",
                source_path = %source.display(),
                error = %err,
                "Failed to spawn image converter"
            );
            if err.kind() == ErrorKind::NotFound {
                OptimizerError::NotFound(err)
            } else {
                OptimizerError::Io(err)
            }
        })?;

        if !output.status.success() {
            let exit_code = output.status.code();
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            warn!(
                op = "optimizer::generate",
                result = "error",
                error_code = "converter_cli",
                exit_code = exit_code.map(i64::from).unwrap_or(-1),
                source_path = %source.display(),
                stderr = %stderr,
                "Image converter invocation failed"
            );
            return Err(OptimizerError::Cli { exit_code, stderr });
        }

        if !fs::try_exists(&output_path).await? {
            return Err(OptimizerError::MissingOutput(output_path));
        }

        info!(
            op = "optimizer::generate",
            result = "ok",
            format = %format,
            width = resize.map(|resize| resize.width),
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            output_path = %output_path.display(),
            "Generated image variant"
        );

        Ok(output_path)
    }
}
