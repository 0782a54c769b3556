//! Two-directional audit of durable records against variant files on disk.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use metrics::histogram;
use serde::Serialize;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::infra::files::{resolve_original, scan_variant_files};

use super::store::VariantCache;

const METRIC_CHECK_MS: &str = "varcache_consistency_check_ms";

/// Outcome of one [`ConsistencyChecker::check_consistency`] run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConsistencyReport {
    /// Variant URLs referenced by durable records (one per format and width).
    pub total_cache_entries: usize,
    /// Variant files found under the variant tree.
    pub filesystem_variants: usize,
    /// Cache entries whose file exists.
    pub consistent: usize,
    /// Cache entries pointing at a missing file.
    pub orphaned_cache: usize,
    /// Files the cache does not know about.
    pub orphaned_files: usize,
    /// Files whose original could not be found; never repaired.
    pub unresolved_files: usize,
    pub repaired: usize,
    /// Read failures on individual records or files.
    pub errors: usize,
    pub issues: Vec<String>,
    /// Diagnostics dropped once `issues` reached its cap.
    pub issues_truncated: usize,
}

impl ConsistencyReport {
    pub fn is_consistent(&self) -> bool {
        self.orphaned_cache == 0 && self.orphaned_files == 0 && self.errors == 0
    }

    fn note(&mut self, limit: usize, issue: String) {
        if self.issues.len() < limit {
            self.issues.push(issue);
        } else {
            self.issues_truncated += 1;
        }
    }
}

pub struct ConsistencyChecker {
    cache: Arc<VariantCache>,
    max_reported_issues: usize,
}

impl ConsistencyChecker {
    pub fn new(cache: Arc<VariantCache>, max_reported_issues: usize) -> Self {
        Self {
            cache,
            max_reported_issues,
        }
    }

    /// Sweep cache -> filesystem, then filesystem -> cache.
    ///
    /// With `auto_repair`, orphaned cache entries are deleted (the whole
    /// record of their original) and orphaned files are registered. Files are
    /// never deleted and missing files are never invented. A bad record or
    /// file is reported and skipped; the sweep always runs to completion.
    pub async fn check_consistency(&self, auto_repair: bool) -> ConsistencyReport {
        let started_at = Instant::now();
        let mut report = ConsistencyReport::default();

        self.sweep_cache(&mut report, auto_repair).await;
        self.sweep_files(&mut report, auto_repair).await;

        histogram!(METRIC_CHECK_MS).record(started_at.elapsed().as_secs_f64() * 1000.0);
        info!(
            op = "check_consistency",
            auto_repair,
            total_cache_entries = report.total_cache_entries,
            filesystem_variants = report.filesystem_variants,
            consistent = report.consistent,
            orphaned_cache = report.orphaned_cache,
            orphaned_files = report.orphaned_files,
            unresolved_files = report.unresolved_files,
            repaired = report.repaired,
            errors = report.errors,
            "Consistency check finished"
        );
        report
    }

    async fn sweep_cache(&self, report: &mut ConsistencyReport, auto_repair: bool) {
        let limit = self.max_reported_issues;
        let mapper = self.cache.mapper();
        let scan = self.cache.all_records().await;

        for message in scan.errors {
            report.errors += 1;
            report.note(limit, message);
        }

        let mut stale_originals = BTreeSet::new();
        for record in &scan.records {
            for (format, width, variant_url) in record.entries() {
                report.total_cache_entries += 1;

                let Some(path) = mapper.variant_path(variant_url) else {
                    report.errors += 1;
                    report.note(
                        limit,
                        format!(
                            "cache entry `{variant_url}` for `{}` is outside the variant tree",
                            record.original_url
                        ),
                    );
                    continue;
                };

                match fs::try_exists(&path).await {
                    Ok(true) => report.consistent += 1,
                    Ok(false) => {
                        report.orphaned_cache += 1;
                        let label = width.map_or_else(|| "base".to_string(), |w| format!("{w}w"));
                        report.note(
                            limit,
                            format!(
                                "orphaned cache entry: {format} {label} of `{}` points at missing `{}`",
                                record.original_url,
                                path.display()
                            ),
                        );
                        stale_originals.insert(record.original_url.clone());
                    }
                    Err(err) => {
                        report.errors += 1;
                        report.note(limit, format!("failed to stat `{}`: {err}", path.display()));
                    }
                }
            }
        }

        if !auto_repair {
            return;
        }
        for original_url in stale_originals {
            match self.cache.delete_variants(&original_url).await {
                Ok(true) => {
                    report.repaired += 1;
                    debug!(url = %original_url, "Dropped orphaned cache record");
                }
                Ok(false) => {}
                Err(err) => {
                    report.errors += 1;
                    report.note(limit, format!("failed to drop `{original_url}`: {err}"));
                }
            }
        }
    }

    async fn sweep_files(&self, report: &mut ConsistencyReport, auto_repair: bool) {
        let limit = self.max_reported_issues;
        let mapper = self.cache.mapper();
        let root = mapper.variants().dir();

        let scan = match scan_variant_files(root).await {
            Ok(scan) => scan,
            Err(err) => {
                warn!(
                    op = "check_consistency",
                    root = %root.display(),
                    error = %err,
                    "Variant tree scan failed"
                );
                report.errors += 1;
                report.note(limit, format!("failed to scan `{}`: {err}", root.display()));
                return;
            }
        };

        for message in scan.errors {
            report.errors += 1;
            report.note(limit, message);
        }

        for file in &scan.files {
            report.filesystem_variants += 1;

            let original = match resolve_original(mapper, file).await {
                Ok(Some(original)) => original,
                Ok(None) => {
                    report.unresolved_files += 1;
                    report.note(
                        limit,
                        format!("variant `{}` has no original on disk", file.path.display()),
                    );
                    continue;
                }
                Err(err) => {
                    report.errors += 1;
                    report.note(
                        limit,
                        format!("failed to resolve original of `{}`: {err}", file.path.display()),
                    );
                    continue;
                }
            };

            let known = match self
                .cache
                .peek_variant(&original.url, file.name.format, file.name.width)
                .await
            {
                Ok(known) => known,
                Err(err) => {
                    report.errors += 1;
                    report.note(
                        limit,
                        format!("failed to read cache for `{}`: {err}", original.url),
                    );
                    continue;
                }
            };
            if known.is_some() {
                continue;
            }

            report.orphaned_files += 1;
            report.note(
                limit,
                format!(
                    "orphaned file: `{}` is not cached for `{}`",
                    file.path.display(),
                    original.url
                ),
            );

            if !auto_repair {
                continue;
            }
            let Some(variant_url) = mapper.variant_url(&file.path) else {
                report.errors += 1;
                continue;
            };
            match self
                .cache
                .set_variant(&original.url, file.name.format, &variant_url, file.name.width)
                .await
            {
                Ok(()) => report.repaired += 1,
                Err(err) => {
                    report.errors += 1;
                    report.note(limit, format!("failed to register `{variant_url}`: {err}"));
                }
            }
        }
    }
}
