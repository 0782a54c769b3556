//! Variant cache store.
//!
//! Two layers owned here:
//!
//! - **Runtime layer**: in-process LRU map `(image_hash, format, width) -> url`.
//!   Never persisted; rebuilt from the durable layer on demand.
//! - **Durable layer**: chunk records in the option store, key
//!   `variant_cache_{chunk_id}`, value JSON `{ image_hash: VariantRecord }`.
//!
//! The filesystem is never consulted on the lookup path. An absent result
//! means "unknown", and the caller decides whether to generate the variant.
//!
//! Chunk updates are read-modify-write without locking. Two writers touching
//! the same chunk at the same time can lose one update; the consistency
//! checker repairs such drift on its next sweep.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;

use lru::LruCache;
use metrics::{counter, histogram};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::application::repos::OptionStore;
use crate::domain::variants::{ImageFormat, VariantRecord};
use crate::infra::files::{resolve_original, scan_variant_files};
use crate::infra::paths::PathMapper;

use super::config::CacheConfig;
use super::error::CacheError;
use super::keys::{CHUNK_KEY_PREFIX, ImageKey, RuntimeKey};
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::store";

const METRIC_RUNTIME_HIT: &str = "varcache_runtime_hit_total";
const METRIC_PERSISTENT_HIT: &str = "varcache_persistent_hit_total";
const METRIC_MISS: &str = "varcache_miss_total";
const METRIC_WRITE: &str = "varcache_write_total";
const METRIC_REBUILD_MS: &str = "varcache_rebuild_ms";

/// Decoded contents of one durable chunk.
pub type Chunk = BTreeMap<String, VariantRecord>;

#[derive(Debug, Default)]
struct Counters {
    runtime_hits: AtomicU64,
    persistent_hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
}

/// Point-in-time view of cache activity and size.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub runtime_hits: u64,
    pub persistent_hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub runtime_entries: usize,
    pub chunks: usize,
    pub total_entries: usize,
}

impl CacheStats {
    /// Share of lookups answered by either layer, in `0.0..=1.0`.
    pub fn hit_rate(&self) -> f64 {
        let hits = self.runtime_hits + self.persistent_hits;
        let lookups = hits + self.misses;
        if lookups == 0 {
            return 0.0;
        }
        hits as f64 / lookups as f64
    }
}

/// Outcome of [`VariantCache::rebuild_from_filesystem`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RebuildReport {
    /// Variant files found in the variant tree.
    pub scanned: usize,
    /// Files registered in the cache.
    pub cached: usize,
    /// Files whose original could not be found on disk.
    pub unresolved: usize,
    pub errors: usize,
}

/// Every record in the durable layer plus chunks that failed to decode.
#[derive(Debug, Default)]
pub struct RecordScan {
    pub records: Vec<VariantRecord>,
    pub chunks: usize,
    pub errors: Vec<String>,
}

/// The single source of truth for "does a variant exist, and where".
///
/// Construct one per process (or per request) and share it by `Arc`.
pub struct VariantCache {
    store: Arc<dyn OptionStore>,
    mapper: PathMapper,
    runtime: RwLock<LruCache<RuntimeKey, String>>,
    counters: Counters,
}

impl VariantCache {
    pub fn new(config: &CacheConfig, store: Arc<dyn OptionStore>, mapper: PathMapper) -> Self {
        Self {
            store,
            mapper,
            runtime: RwLock::new(LruCache::new(config.runtime_entry_limit_non_zero())),
            counters: Counters::default(),
        }
    }

    pub fn mapper(&self) -> &PathMapper {
        &self.mapper
    }

    pub(crate) fn option_store(&self) -> &Arc<dyn OptionStore> {
        &self.store
    }

    // ========================================================================
    // Lookups
    // ========================================================================

    /// Look up a variant URL. `width = None` addresses the base variant.
    ///
    /// Checks the runtime layer, then the durable chunk; a durable hit is
    /// copied into the runtime layer. Store failures degrade to a miss.
    pub async fn get_variant(
        &self,
        original_url: &str,
        format: ImageFormat,
        width: Option<u32>,
    ) -> Option<String> {
        let image = ImageKey::for_url(original_url);
        let runtime_key = RuntimeKey::new(&image, format, width);

        let cached = rw_write(&self.runtime, SOURCE, "get_variant.runtime")
            .get(&runtime_key)
            .cloned();
        if let Some(url) = cached {
            self.counters.runtime_hits.fetch_add(1, Ordering::Relaxed);
            counter!(METRIC_RUNTIME_HIT).increment(1);
            return Some(url);
        }

        let found = match self.load_chunk(&image).await {
            Ok(chunk) => chunk
                .get(image.hash())
                .and_then(|record| record.get(format, width))
                .map(str::to_string),
            Err(err) => {
                warn!(
                    op = "get_variant",
                    url = original_url,
                    chunk = image.chunk_id(),
                    error = %err,
                    "Variant lookup degraded to miss"
                );
                None
            }
        };

        match found {
            Some(url) => {
                rw_write(&self.runtime, SOURCE, "get_variant.warm").put(runtime_key, url.clone());
                self.counters.persistent_hits.fetch_add(1, Ordering::Relaxed);
                counter!(METRIC_PERSISTENT_HIT).increment(1);
                Some(url)
            }
            None => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                counter!(METRIC_MISS).increment(1);
                debug!(url = original_url, %format, width, "Variant cache miss");
                None
            }
        }
    }

    /// Every responsive variant of one format, read straight from the durable layer.
    pub async fn get_responsive_variants(
        &self,
        original_url: &str,
        format: ImageFormat,
    ) -> BTreeMap<u32, String> {
        self.get_record(original_url)
            .await
            .map(|record| record.responsive.for_format(format).clone())
            .unwrap_or_default()
    }

    /// The full durable record for an original, if any.
    pub async fn get_record(&self, original_url: &str) -> Option<VariantRecord> {
        let image = ImageKey::for_url(original_url);
        match self.load_chunk(&image).await {
            Ok(mut chunk) => chunk.remove(image.hash()),
            Err(err) => {
                warn!(
                    op = "get_record",
                    url = original_url,
                    chunk = image.chunk_id(),
                    error = %err,
                    "Variant record read failed"
                );
                None
            }
        }
    }

    /// Durable-only lookup that leaves counters and the runtime layer untouched.
    pub async fn peek_variant(
        &self,
        original_url: &str,
        format: ImageFormat,
        width: Option<u32>,
    ) -> Result<Option<String>, CacheError> {
        let image = ImageKey::for_url(original_url);
        let chunk = self.load_chunk(&image).await?;
        Ok(chunk
            .get(image.hash())
            .and_then(|record| record.get(format, width))
            .map(str::to_string))
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Register a variant in both layers.
    ///
    /// The runtime layer is updated first, so the value is visible to this
    /// process even when the durable write fails.
    pub async fn set_variant(
        &self,
        original_url: &str,
        format: ImageFormat,
        variant_url: &str,
        width: Option<u32>,
    ) -> Result<(), CacheError> {
        let image = ImageKey::for_url(original_url);
        rw_write(&self.runtime, SOURCE, "set_variant.runtime").put(
            RuntimeKey::new(&image, format, width),
            variant_url.to_string(),
        );

        let result = self
            .update_record(&image, original_url, |record| {
                record.set(format, width, variant_url)
            })
            .await;

        match &result {
            Ok(_) => {
                self.counters.writes.fetch_add(1, Ordering::Relaxed);
                counter!(METRIC_WRITE).increment(1);
            }
            Err(err) => warn!(
                op = "set_variant",
                url = original_url,
                %format,
                width,
                chunk = image.chunk_id(),
                error = %err,
                "Variant not persisted"
            ),
        }

        result
    }

    /// Register several formats at once; each is stored independently.
    ///
    /// Returns how many formats were persisted.
    pub async fn set_variants<I>(&self, original_url: &str, variants: I) -> usize
    where
        I: IntoIterator<Item = (ImageFormat, Option<String>)>,
    {
        let mut stored = 0;
        for (format, variant_url) in variants {
            let Some(variant_url) = variant_url else {
                continue;
            };
            if self
                .set_variant(original_url, format, &variant_url, None)
                .await
                .is_ok()
            {
                stored += 1;
            }
        }
        stored
    }

    /// Drop every variant of every format for an original from both layers.
    ///
    /// Returns whether a durable record existed.
    pub async fn delete_variants(&self, original_url: &str) -> Result<bool, CacheError> {
        let image = ImageKey::for_url(original_url);
        self.evict_runtime(&image);

        let mut chunk = self.load_chunk(&image).await.inspect_err(|err| {
            warn!(
                op = "delete_variants",
                url = original_url,
                chunk = image.chunk_id(),
                error = %err,
                "Variant delete failed"
            );
        })?;

        if chunk.remove(image.hash()).is_none() {
            return Ok(false);
        }

        self.write_chunk(&image.chunk_key(), &chunk)
            .await
            .inspect_err(|err| {
                warn!(
                    op = "delete_variants",
                    url = original_url,
                    chunk = image.chunk_id(),
                    error = %err,
                    "Variant delete not persisted"
                );
            })?;

        debug!(url = original_url, chunk = image.chunk_id(), "Variants deleted");
        Ok(true)
    }

    /// Drop every chunk and the whole runtime layer. Returns the number of
    /// chunks removed.
    pub async fn clear_all(&self) -> Result<u64, CacheError> {
        self.clear_runtime();
        let removed = self
            .store
            .delete_by_prefix(CHUNK_KEY_PREFIX)
            .await
            .inspect_err(|err| {
                warn!(op = "clear_all", error = %err, "Chunk bulk delete failed");
            })?;
        info!(op = "clear_all", chunks_removed = removed, "Variant cache cleared");
        Ok(removed)
    }

    /// Forget the runtime layer only; durable chunks are untouched.
    pub fn clear_runtime(&self) {
        rw_write(&self.runtime, SOURCE, "clear_runtime").clear();
    }

    // ========================================================================
    // Recovery
    // ========================================================================

    /// Rebuild the cache from the variant files on disk.
    ///
    /// Clears everything, walks the variant tree, and registers each variant
    /// whose original can be found (see [`resolve_original`]).
    pub async fn rebuild_from_filesystem(&self) -> RebuildReport {
        let started_at = Instant::now();
        let mut report = RebuildReport::default();

        if self.clear_all().await.is_err() {
            report.errors += 1;
        }

        let root = self.mapper.variants().dir();
        let scan = match scan_variant_files(root).await {
            Ok(scan) => scan,
            Err(err) => {
                warn!(
                    op = "rebuild_from_filesystem",
                    root = %root.display(),
                    error = %err,
                    "Variant tree scan failed"
                );
                report.errors += 1;
                return report;
            }
        };

        for message in &scan.errors {
            warn!(op = "rebuild_from_filesystem", detail = %message, "Variant tree entry skipped");
        }
        report.errors += scan.errors.len();

        for file in &scan.files {
            report.scanned += 1;

            let original = match resolve_original(&self.mapper, file).await {
                Ok(Some(original)) => original,
                Ok(None) => {
                    debug!(path = %file.path.display(), "No original found for variant");
                    report.unresolved += 1;
                    continue;
                }
                Err(err) => {
                    warn!(
                        op = "rebuild_from_filesystem",
                        path = %file.path.display(),
                        error = %err,
                        "Original probe failed"
                    );
                    report.errors += 1;
                    continue;
                }
            };

            let Some(variant_url) = self.mapper.variant_url(&file.path) else {
                report.errors += 1;
                continue;
            };

            match self
                .set_variant(&original.url, file.name.format, &variant_url, file.name.width)
                .await
            {
                Ok(()) => report.cached += 1,
                Err(_) => report.errors += 1,
            }
        }

        histogram!(METRIC_REBUILD_MS).record(started_at.elapsed().as_secs_f64() * 1000.0);
        info!(
            op = "rebuild_from_filesystem",
            scanned = report.scanned,
            cached = report.cached,
            unresolved = report.unresolved,
            errors = report.errors,
            "Variant cache rebuilt from filesystem"
        );
        report
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    pub async fn get_stats(&self) -> CacheStats {
        let scan = self.all_records().await;
        CacheStats {
            runtime_hits: self.counters.runtime_hits.load(Ordering::Relaxed),
            persistent_hits: self.counters.persistent_hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            writes: self.counters.writes.load(Ordering::Relaxed),
            runtime_entries: self.runtime_len(),
            chunks: scan.chunks,
            total_entries: scan.records.len(),
        }
    }

    /// Number of variant records across all chunks.
    pub async fn get_total_entries(&self) -> usize {
        self.all_records().await.records.len()
    }

    pub fn runtime_len(&self) -> usize {
        rw_read(&self.runtime, SOURCE, "runtime_len").len()
    }

    /// Load and decode every chunk. Undecodable chunks are reported, not fatal.
    pub async fn all_records(&self) -> RecordScan {
        let mut scan = RecordScan::default();
        let chunks = match self.store.list_by_prefix(CHUNK_KEY_PREFIX).await {
            Ok(chunks) => chunks,
            Err(err) => {
                warn!(op = "all_records", error = %err, "Chunk listing failed");
                scan.errors.push(format!("failed to list chunks: {err}"));
                return scan;
            }
        };

        scan.chunks = chunks.len();
        for (key, value) in chunks {
            match serde_json::from_str::<Chunk>(&value) {
                Ok(chunk) => scan.records.extend(chunk.into_values()),
                Err(err) => scan.errors.push(format!("chunk `{key}` is corrupt: {err}")),
            }
        }
        scan
    }

    // ========================================================================
    // Chunk plumbing
    // ========================================================================

    async fn load_chunk(&self, image: &ImageKey) -> Result<Chunk, CacheError> {
        let key = image.chunk_key();
        let Some(raw) = self.store.get(&key).await? else {
            return Ok(Chunk::new());
        };
        match serde_json::from_str(&raw) {
            Ok(chunk) => Ok(chunk),
            Err(err) => {
                warn!(
                    op = "load_chunk",
                    chunk = image.chunk_id(),
                    error = %err,
                    "Corrupt chunk treated as empty"
                );
                Ok(Chunk::new())
            }
        }
    }

    /// Persist a chunk; an empty chunk removes its key instead.
    async fn write_chunk(&self, key: &str, chunk: &Chunk) -> Result<(), CacheError> {
        if chunk.is_empty() {
            self.store.delete(key).await?;
            return Ok(());
        }
        let raw = serde_json::to_string(chunk).map_err(|source| CacheError::Codec {
            key: key.to_string(),
            source,
        })?;
        self.store.set(key, &raw).await?;
        Ok(())
    }

    /// Read-modify-write of one record. `mutate` returns whether it changed
    /// anything; unchanged records are not rewritten. Empty records are removed.
    async fn update_record<F>(
        &self,
        image: &ImageKey,
        original_url: &str,
        mutate: F,
    ) -> Result<(), CacheError>
    where
        F: FnOnce(&mut VariantRecord) -> bool,
    {
        let mut chunk = self.load_chunk(image).await?;
        let record = chunk
            .entry(image.hash().to_string())
            .or_insert_with(|| VariantRecord::new(original_url));
        if !mutate(record) {
            return Ok(());
        }
        if record.is_empty() {
            chunk.remove(image.hash());
        }
        self.write_chunk(&image.chunk_key(), &chunk).await
    }

    fn evict_runtime(&self, image: &ImageKey) {
        let mut runtime = rw_write(&self.runtime, SOURCE, "evict_runtime");
        let stale: Vec<RuntimeKey> = runtime
            .iter()
            .filter(|(key, _)| key.image_hash == image.hash())
            .map(|(key, _)| key.clone())
            .collect();
        for key in stale {
            runtime.pop(&key);
        }
    }
}
