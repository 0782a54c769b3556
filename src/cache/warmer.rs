//! Predictive generation of responsive variants.
//!
//! For each image the breakpoint routine walks a fixed ascending list of
//! widths, skips widths at or above the natural width and widths already
//! cached in both formats, and generates the rest through the format
//! optimizer. Re-running it is cheap and safe.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use imagesize::ImageError;
use metrics::{counter, histogram};
use serde::Serialize;
use thiserror::Error;
use tokio::task;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::application::optimizer::{FormatOptimizer, Resize};
use crate::application::repos::{MediaRepo, RepoError};
use crate::domain::media::{Dimensions, ImageAsset};
use crate::domain::variants::ImageFormat;

use super::store::VariantCache;

const METRIC_GENERATED: &str = "varcache_warm_generated_total";
const METRIC_WARM_MS: &str = "varcache_warm_ms";

pub const DEFAULT_BREAKPOINTS: &[u32] = &[400, 600, 800, 1024, 1200, 1600];
const DEFAULT_BATCH_SIZE: u32 = 10;
const DEFAULT_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarmerConfig {
    /// Target widths, ascending.
    pub breakpoints: Vec<u32>,
    /// Images picked by [`Warmer::warm_recent_images`].
    pub batch_size: u32,
    /// Pause between images in a recent-images run.
    pub delay: Duration,
    /// Nothing is generated when format conversion is off.
    pub enable_format_conversion: bool,
}

impl Default for WarmerConfig {
    fn default() -> Self {
        Self {
            breakpoints: DEFAULT_BREAKPOINTS.to_vec(),
            batch_size: DEFAULT_BATCH_SIZE,
            delay: DEFAULT_DELAY,
            enable_format_conversion: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum WarmError {
    #[error("image `{0}` not found")]
    NotFound(Uuid),
    #[error("image `{url}` is not a convertible type ({content_type})")]
    Unsupported { url: String, content_type: String },
    #[error("image `{0}` is outside the uploads tree")]
    OutsideUploads(String),
    #[error("failed to read dimensions of `{path}`: {reason}")]
    Dimensions { path: PathBuf, reason: String },
    #[error("media lookup failed: {0}")]
    Lookup(#[from] RepoError),
}

/// Counts returned by the bulk entry points.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WarmSummary {
    pub total: usize,
    pub warmed: usize,
    pub skipped: usize,
}

/// What the breakpoint routine did for one image.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BreakpointReport {
    pub generated: usize,
    /// Widths already cached in every format.
    pub already_cached: usize,
    /// Widths at or above the natural width.
    pub too_wide: usize,
    /// Formats whose generation or durable registration failed.
    pub failed: usize,
}

pub struct Warmer {
    config: WarmerConfig,
    cache: Arc<VariantCache>,
    media: Arc<dyn MediaRepo>,
    optimizer: Arc<dyn FormatOptimizer>,
}

impl Warmer {
    pub fn new(
        config: WarmerConfig,
        cache: Arc<VariantCache>,
        media: Arc<dyn MediaRepo>,
        optimizer: Arc<dyn FormatOptimizer>,
    ) -> Self {
        Self {
            config,
            cache,
            media,
            optimizer,
        }
    }

    /// Upload-completion hook. Best effort: failures are logged.
    pub async fn warm_new_image(&self, image_id: Uuid) -> Option<BreakpointReport> {
        if !self.config.enable_format_conversion {
            debug!(image_id = %image_id, "Warming skipped: format conversion disabled");
            return None;
        }
        match self.warm_by_id(image_id).await {
            Ok(report) => Some(report),
            Err(err) => {
                warn!(op = "warm_new_image", image_id = %image_id, error = %err, "Warming failed");
                None
            }
        }
    }

    /// Warm the most recently uploaded images, pausing between each.
    pub async fn warm_recent_images(&self) -> WarmSummary {
        if !self.config.enable_format_conversion {
            debug!("Recent-image warming skipped: format conversion disabled");
            return WarmSummary::default();
        }
        let images = match self.media.recent_images(self.config.batch_size).await {
            Ok(images) => images,
            Err(err) => {
                warn!(op = "warm_recent_images", error = %err, "Recent image lookup failed");
                return WarmSummary::default();
            }
        };

        let mut summary = WarmSummary::default();
        for (index, image) in images.iter().enumerate() {
            if index > 0 && !self.config.delay.is_zero() {
                tokio::time::sleep(self.config.delay).await;
            }
            tally(&mut summary, image.id, self.warm_image(image).await);
        }

        info!(
            op = "warm_recent_images",
            total = summary.total,
            warmed = summary.warmed,
            skipped = summary.skipped,
            "Recent images warmed"
        );
        summary
    }

    /// Explicit bulk warming for administrative tooling.
    pub async fn warm_images(&self, image_ids: &[Uuid]) -> WarmSummary {
        if !self.config.enable_format_conversion {
            return WarmSummary {
                total: image_ids.len(),
                warmed: 0,
                skipped: image_ids.len(),
            };
        }
        let mut summary = WarmSummary::default();
        for &image_id in image_ids {
            let result = self.warm_by_id(image_id).await;
            tally(&mut summary, image_id, result);
        }
        info!(
            op = "warm_images",
            total = summary.total,
            warmed = summary.warmed,
            skipped = summary.skipped,
            "Images warmed"
        );
        summary
    }

    async fn warm_by_id(&self, image_id: Uuid) -> Result<BreakpointReport, WarmError> {
        let image = self
            .media
            .find_image(image_id)
            .await?
            .ok_or(WarmError::NotFound(image_id))?;
        self.warm_image(&image).await
    }

    /// Run the breakpoint routine for one image.
    pub async fn warm_image(&self, image: &ImageAsset) -> Result<BreakpointReport, WarmError> {
        if !image.is_convertible() {
            return Err(WarmError::Unsupported {
                url: image.url.clone(),
                content_type: image.content_type.clone(),
            });
        }
        let source = self
            .cache
            .mapper()
            .original_path(&image.url)
            .ok_or_else(|| WarmError::OutsideUploads(image.url.clone()))?;
        let dimensions = read_dimensions(&source).await?;

        let started_at = Instant::now();
        let report = self.warm_breakpoints(&image.url, &source, dimensions).await;
        histogram!(METRIC_WARM_MS).record(started_at.elapsed().as_secs_f64() * 1000.0);
        Ok(report)
    }

    /// Generate and register every missing breakpoint below the natural width.
    pub async fn warm_breakpoints(
        &self,
        original_url: &str,
        source: &Path,
        dimensions: Dimensions,
    ) -> BreakpointReport {
        let mut report = BreakpointReport::default();

        for &width in &self.config.breakpoints {
            if width >= dimensions.width {
                report.too_wide += 1;
                continue;
            }

            let mut missing = Vec::with_capacity(ImageFormat::ALL.len());
            for format in ImageFormat::ALL {
                if self
                    .cache
                    .get_variant(original_url, format, Some(width))
                    .await
                    .is_none()
                {
                    missing.push(format);
                }
            }
            if missing.is_empty() {
                report.already_cached += 1;
                continue;
            }

            let resize = Resize {
                width,
                height: dimensions.proportional_height(width),
            };
            for format in missing {
                if self.generate(original_url, source, format, resize).await {
                    report.generated += 1;
                } else {
                    report.failed += 1;
                }
            }
        }

        debug!(
            url = original_url,
            generated = report.generated,
            already_cached = report.already_cached,
            too_wide = report.too_wide,
            failed = report.failed,
            "Breakpoints warmed"
        );
        report
    }

    async fn generate(
        &self,
        original_url: &str,
        source: &Path,
        format: ImageFormat,
        resize: Resize,
    ) -> bool {
        let output = match self.optimizer.generate(source, format, Some(resize)).await {
            Ok(output) => output,
            Err(err) => {
                warn!(
                    op = "warm_breakpoints",
                    url = original_url,
                    %format,
                    width = resize.width,
                    error = %err,
                    "Variant generation failed"
                );
                return false;
            }
        };

        let Some(variant_url) = self.cache.mapper().variant_url(&output) else {
            warn!(
                op = "warm_breakpoints",
                url = original_url,
                path = %output.display(),
                "Generated variant is outside the variant tree"
            );
            return false;
        };

        // An unpersisted file is picked up by the next consistency sweep.
        let registered = self
            .cache
            .set_variant(original_url, format, &variant_url, Some(resize.width))
            .await
            .is_ok();
        if registered {
            counter!(METRIC_GENERATED).increment(1);
        }
        registered
    }
}

fn tally(
    summary: &mut WarmSummary,
    image_id: Uuid,
    result: Result<BreakpointReport, WarmError>,
) {
    summary.total += 1;
    match result {
        Ok(_) => summary.warmed += 1,
        Err(err) => {
            debug!(image_id = %image_id, error = %err, "Image skipped by warmer");
            summary.skipped += 1;
        }
    }
}

async fn read_dimensions(path: &Path) -> Result<Dimensions, WarmError> {
    let owned = path.to_path_buf();
    let size = task::spawn_blocking(move || imagesize::size(&owned))
        .await
        .map_err(|err| WarmError::Dimensions {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;

    let size = size.map_err(|err| WarmError::Dimensions {
        path: path.to_path_buf(),
        reason: match err {
            ImageError::NotSupported => "unsupported format".to_string(),
            ImageError::CorruptedImage => "corrupted image".to_string(),
            ImageError::IoError(err) => err.to_string(),
        },
    })?;

    let (Ok(width), Ok(height)) = (u32::try_from(size.width), u32::try_from(size.height)) else {
        return Err(WarmError::Dimensions {
            path: path.to_path_buf(),
            reason: "dimensions out of range".to_string(),
        });
    };
    if width == 0 || height == 0 {
        return Err(WarmError::Dimensions {
            path: path.to_path_buf(),
            reason: "zero-sized image".to_string(),
        });
    }
    Ok(Dimensions { width, height })
}
