//! Invalidator: turns external state changes into targeted or full cache drops.

use std::sync::{Arc, Mutex};

use metrics::counter;
use serde::Serialize;
use time::OffsetDateTime;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::application::repos::MediaRepo;
use crate::domain::settings::OptimizationSettings;

use super::config::CacheConfig;
use super::events::{InvalidationEvent, InvalidationScope};
use super::keys::{LAST_INVALIDATION_KEY, SETTINGS_SNAPSHOT_KEY};
use super::lock::mutex_lock;
use super::store::VariantCache;

const SOURCE: &str = "cache::invalidator";

const METRIC_INVALIDATION: &str = "varcache_invalidation_total";

/// What [`Invalidator::handle`] did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum InvalidationOutcome {
    /// Invalidation is switched off in config.
    Disabled,
    /// The event does not affect cached variants.
    Unaffected,
    Image { url: String, removed: bool },
    ImageNotFound { image_id: Uuid },
    Full { chunks_removed: u64 },
    Failed { reason: String },
}

pub struct Invalidator {
    enabled: bool,
    cache: Arc<VariantCache>,
    media: Arc<dyn MediaRepo>,
    last_full: Mutex<Option<OffsetDateTime>>,
}

impl Invalidator {
    pub fn new(config: &CacheConfig, cache: Arc<VariantCache>, media: Arc<dyn MediaRepo>) -> Self {
        Self {
            enabled: config.enabled,
            cache,
            media,
            last_full: Mutex::new(None),
        }
    }

    pub async fn handle(&self, event: InvalidationEvent) -> InvalidationOutcome {
        if !self.enabled {
            debug!(event = event.name(), "Invalidation skipped: cache disabled");
            return InvalidationOutcome::Disabled;
        }

        let scope = event.scope();
        let outcome = match scope {
            InvalidationScope::Nothing => InvalidationOutcome::Unaffected,
            InvalidationScope::Image(image_id) => self.invalidate_image(image_id).await,
            InvalidationScope::Full => self.invalidate_all().await,
        };

        if !matches!(outcome, InvalidationOutcome::Unaffected) {
            counter!(METRIC_INVALIDATION, "scope" => scope.as_str()).increment(1);
        }
        info!(
            op = "invalidate",
            event = event.name(),
            scope = scope.as_str(),
            outcome = ?outcome,
            "Invalidation handled"
        );
        outcome
    }

    pub async fn settings_changed(
        &self,
        old: &OptimizationSettings,
        new: &OptimizationSettings,
    ) -> InvalidationOutcome {
        self.handle(InvalidationEvent::SettingsChanged {
            old: old.clone(),
            new: new.clone(),
        })
        .await
    }

    pub async fn image_edited(&self, image_id: Uuid) -> InvalidationOutcome {
        self.handle(InvalidationEvent::ImageEdited { image_id }).await
    }

    pub async fn image_deleted(&self, image_id: Uuid) -> InvalidationOutcome {
        self.handle(InvalidationEvent::ImageDeleted { image_id }).await
    }

    pub async fn theme_switched(&self) -> InvalidationOutcome {
        self.handle(InvalidationEvent::ThemeSwitched).await
    }

    pub async fn plugin_toggled(&self, plugin: &str, activated: bool) -> InvalidationOutcome {
        self.handle(InvalidationEvent::PluginToggled {
            plugin: plugin.to_string(),
            activated,
        })
        .await
    }

    /// Compare `current` with the snapshot persisted by the previous run and
    /// fire the settings trigger when they differ. The snapshot is then
    /// replaced with `current`, unless invalidation is disabled or failed:
    /// the pending change must still be seen by a later run.
    ///
    /// Without a readable snapshot there is nothing to compare against; the
    /// snapshot is written and nothing is invalidated.
    pub async fn reconcile_settings(&self, current: &OptimizationSettings) -> InvalidationOutcome {
        let store = self.cache.option_store();
        let previous = match store.get(SETTINGS_SNAPSHOT_KEY).await {
            Ok(raw) => raw.and_then(|raw| {
                serde_json::from_str::<OptimizationSettings>(&raw)
                    .inspect_err(|err| {
                        warn!(
                            op = "reconcile_settings",
                            error = %err,
                            "Settings snapshot unreadable, replacing it"
                        );
                    })
                    .ok()
            }),
            Err(err) => {
                warn!(op = "reconcile_settings", error = %err, "Settings snapshot read failed");
                return InvalidationOutcome::Failed {
                    reason: err.to_string(),
                };
            }
        };

        let outcome = match &previous {
            Some(previous) => self.settings_changed(previous, current).await,
            None => InvalidationOutcome::Unaffected,
        };

        let applied = !matches!(
            outcome,
            InvalidationOutcome::Disabled | InvalidationOutcome::Failed { .. }
        );
        if applied && previous.as_ref() != Some(current) {
            match serde_json::to_string(current) {
                Ok(raw) => {
                    if let Err(err) = store.set(SETTINGS_SNAPSHOT_KEY, &raw).await {
                        warn!(
                            op = "reconcile_settings",
                            error = %err,
                            "Settings snapshot not persisted"
                        );
                    }
                }
                Err(err) => warn!(
                    op = "reconcile_settings",
                    error = %err,
                    "Settings snapshot not serialisable"
                ),
            }
        }

        outcome
    }

    /// Wall-clock time of the most recent full invalidation, from this
    /// process or, failing that, from the durable store.
    pub async fn last_full_invalidation(&self) -> Option<OffsetDateTime> {
        let local = *mutex_lock(&self.last_full, SOURCE, "last_full_invalidation");
        if local.is_some() {
            return local;
        }

        let raw = match self.cache.option_store().get(LAST_INVALIDATION_KEY).await {
            Ok(raw) => raw?,
            Err(err) => {
                warn!(op = "last_full_invalidation", error = %err, "Timestamp read failed");
                return None;
            }
        };
        let seconds: i64 = raw.trim().parse().ok()?;
        OffsetDateTime::from_unix_timestamp(seconds).ok()
    }

    async fn invalidate_image(&self, image_id: Uuid) -> InvalidationOutcome {
        let image = match self.media.find_image(image_id).await {
            Ok(Some(image)) => image,
            Ok(None) => {
                warn!(op = "invalidate_image", image_id = %image_id, "Image not found");
                return InvalidationOutcome::ImageNotFound { image_id };
            }
            Err(err) => {
                warn!(op = "invalidate_image", image_id = %image_id, error = %err, "Image lookup failed");
                return InvalidationOutcome::Failed {
                    reason: err.to_string(),
                };
            }
        };

        match self.cache.delete_variants(&image.url).await {
            Ok(removed) => InvalidationOutcome::Image {
                url: image.url,
                removed,
            },
            Err(err) => InvalidationOutcome::Failed {
                reason: err.to_string(),
            },
        }
    }

    async fn invalidate_all(&self) -> InvalidationOutcome {
        let chunks_removed = match self.cache.clear_all().await {
            Ok(removed) => removed,
            Err(err) => {
                return InvalidationOutcome::Failed {
                    reason: err.to_string(),
                };
            }
        };

        let now = OffsetDateTime::now_utc();
        *mutex_lock(&self.last_full, SOURCE, "invalidate_all") = Some(now);
        if let Err(err) = self
            .cache
            .option_store()
            .set(LAST_INVALIDATION_KEY, &now.unix_timestamp().to_string())
            .await
        {
            warn!(op = "invalidate_all", error = %err, "Invalidation timestamp not persisted");
        }

        InvalidationOutcome::Full { chunks_removed }
    }
}
