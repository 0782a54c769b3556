//! Cron job that warms responsive variants of the most recent uploads.

use std::sync::Arc;

use apalis::prelude::*;

use crate::cache::Warmer;

/// Marker struct for the cron-triggered warm job.
/// Must implement `From<chrono::DateTime<chrono::Utc>>` for apalis-cron compatibility.
#[derive(Default, Debug, Clone)]
pub struct WarmRecentImagesJob;

impl From<chrono::DateTime<chrono::Utc>> for WarmRecentImagesJob {
    fn from(_: chrono::DateTime<chrono::Utc>) -> Self {
        Self
    }
}

#[derive(Clone)]
pub struct WarmRecentImagesContext {
    pub warmer: Arc<Warmer>,
}

/// Warming failures are logged per image by the warmer; the job itself never fails.
pub async fn process_warm_recent_images_job(
    _job: WarmRecentImagesJob,
    ctx: Data<WarmRecentImagesContext>,
) -> Result<(), apalis::prelude::Error> {
    let summary = ctx.warmer.warm_recent_images().await;
    if summary.skipped > 0 {
        tracing::warn!(
            total = summary.total,
            skipped = summary.skipped,
            "Scheduled warm skipped some images"
        );
    }
    Ok(())
}
