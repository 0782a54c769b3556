//! Cron job that audits and repairs the variant cache.

use std::sync::Arc;

use apalis::prelude::*;

use crate::cache::ConsistencyChecker;

/// Marker struct for the cron-triggered consistency job.
#[derive(Default, Debug, Clone)]
pub struct ConsistencyCheckJob;

impl From<chrono::DateTime<chrono::Utc>> for ConsistencyCheckJob {
    fn from(_: chrono::DateTime<chrono::Utc>) -> Self {
        Self
    }
}

#[derive(Clone)]
pub struct ConsistencyCheckContext {
    pub checker: Arc<ConsistencyChecker>,
}

/// Scheduled runs always repair.
pub async fn process_consistency_check_job(
    _job: ConsistencyCheckJob,
    ctx: Data<ConsistencyCheckContext>,
) -> Result<(), apalis::prelude::Error> {
    let report = ctx.checker.check_consistency(true).await;
    if !report.is_consistent() {
        tracing::warn!(
            orphaned_cache = report.orphaned_cache,
            orphaned_files = report.orphaned_files,
            repaired = report.repaired,
            errors = report.errors,
            "Variant cache drift detected"
        );
    }
    Ok(())
}
