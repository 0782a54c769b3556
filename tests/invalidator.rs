mod support;

use std::sync::Arc;

use varcache::application::repos::OptionStore;
use varcache::cache::keys::SETTINGS_SNAPSHOT_KEY;
use varcache::cache::{CacheConfig, InvalidationEvent, InvalidationOutcome, Invalidator};
use varcache::domain::settings::OptimizationSettings;
use varcache::domain::variants::ImageFormat;
use varcache::infra::memory::MemoryMediaRepo;

use support::{Fixture, image};

async fn populate(fixture: &Fixture, count: usize) {
    for index in 0..count {
        fixture
            .cache
            .set_variant(
                &format!("/uploads/{index}.jpg"),
                ImageFormat::Webp,
                &format!("/variants/{index}.webp"),
                None,
            )
            .await
            .expect("seed variant");
    }
}

fn invalidator(fixture: &Fixture, media: Arc<MemoryMediaRepo>) -> Invalidator {
    Invalidator::new(&CacheConfig::default(), fixture.cache.clone(), media)
}

#[tokio::test]
async fn only_watched_setting_changes_clear_the_cache() {
    let fixture = Fixture::new();
    populate(&fixture, 8).await;
    let chunks = fixture.chunk_count();
    assert!(chunks > 0);
    let invalidator = invalidator(&fixture, Arc::new(MemoryMediaRepo::new()));

    let old = OptimizationSettings::default();
    let cosmetic = OptimizationSettings {
        lazy_load: !old.lazy_load,
        defer_scripts: !old.defer_scripts,
        ..old.clone()
    };
    assert_eq!(
        invalidator.settings_changed(&old, &cosmetic).await,
        InvalidationOutcome::Unaffected
    );
    assert_eq!(fixture.chunk_count(), chunks);
    assert!(invalidator.last_full_invalidation().await.is_none());

    let requality = OptimizationSettings {
        avif_quality: old.avif_quality + 5,
        ..old.clone()
    };
    assert_eq!(
        invalidator.settings_changed(&old, &requality).await,
        InvalidationOutcome::Full {
            chunks_removed: chunks as u64
        }
    );
    assert_eq!(fixture.chunk_count(), 0);
    assert_eq!(fixture.cache.runtime_len(), 0);
    assert!(invalidator.last_full_invalidation().await.is_some());
}

#[tokio::test]
async fn image_events_touch_only_that_image() {
    let fixture = Fixture::new();
    let media = Arc::new(MemoryMediaRepo::new());
    let edited = image("/uploads/edited.jpg", "image/jpeg");
    let edited_id = edited.id;
    media.insert(edited);
    for url in ["/uploads/edited.jpg", "/uploads/kept.jpg"] {
        fixture
            .cache
            .set_variant(url, ImageFormat::Avif, "/variants/x.avif", Some(400))
            .await
            .expect("seed variant");
    }
    let invalidator = invalidator(&fixture, media);

    assert_eq!(
        invalidator.image_edited(edited_id).await,
        InvalidationOutcome::Image {
            url: "/uploads/edited.jpg".to_string(),
            removed: true,
        }
    );

    let cache = &fixture.cache;
    assert!(
        cache
            .get_variant("/uploads/edited.jpg", ImageFormat::Avif, Some(400))
            .await
            .is_none()
    );
    assert!(
        cache
            .get_variant("/uploads/kept.jpg", ImageFormat::Avif, Some(400))
            .await
            .is_some()
    );

    assert_eq!(
        invalidator.image_deleted(edited_id).await,
        InvalidationOutcome::Image {
            url: "/uploads/edited.jpg".to_string(),
            removed: false,
        }
    );
}

#[tokio::test]
async fn unknown_image_is_reported() {
    let fixture = Fixture::new();
    populate(&fixture, 3).await;
    let invalidator = invalidator(&fixture, Arc::new(MemoryMediaRepo::new()));
    let id = uuid::Uuid::new_v4();

    assert_eq!(
        invalidator.image_deleted(id).await,
        InvalidationOutcome::ImageNotFound { image_id: id }
    );
    assert_eq!(fixture.cache.get_total_entries().await, 3);
}

#[tokio::test]
async fn theme_and_plugin_changes_clear_everything() {
    let fixture = Fixture::new();
    let invalidator = invalidator(&fixture, Arc::new(MemoryMediaRepo::new()));

    populate(&fixture, 4).await;
    assert!(matches!(
        invalidator.theme_switched().await,
        InvalidationOutcome::Full { .. }
    ));
    assert_eq!(fixture.chunk_count(), 0);

    populate(&fixture, 4).await;
    assert!(matches!(
        invalidator
            .handle(InvalidationEvent::PluginToggled {
                plugin: "gallery".to_string(),
                activated: false,
            })
            .await,
        InvalidationOutcome::Full { .. }
    ));
    assert_eq!(fixture.chunk_count(), 0);
}

#[tokio::test]
async fn changes_made_while_disabled_apply_once_reenabled() {
    let fixture = Fixture::new();
    let settings = OptimizationSettings::default();
    let media = Arc::new(MemoryMediaRepo::new());
    assert_eq!(
        invalidator(&fixture, media.clone())
            .reconcile_settings(&settings)
            .await,
        InvalidationOutcome::Unaffected
    );
    populate(&fixture, 4).await;

    let disabled = Invalidator::new(
        &CacheConfig {
            enabled: false,
            ..CacheConfig::default()
        },
        fixture.cache.clone(),
        media.clone(),
    );
    let changed = OptimizationSettings {
        avif_quality: settings.avif_quality - 10,
        ..settings.clone()
    };
    assert_eq!(
        disabled.theme_switched().await,
        InvalidationOutcome::Disabled
    );
    assert_eq!(
        disabled.reconcile_settings(&changed).await,
        InvalidationOutcome::Disabled
    );
    assert_eq!(fixture.cache.get_total_entries().await, 4);

    let enabled = invalidator(&fixture, media);
    assert!(matches!(
        enabled.reconcile_settings(&changed).await,
        InvalidationOutcome::Full { .. }
    ));
    assert_eq!(fixture.cache.get_total_entries().await, 0);
    assert_eq!(
        enabled.reconcile_settings(&changed).await,
        InvalidationOutcome::Unaffected
    );
}

#[tokio::test]
async fn settings_snapshot_drives_startup_reconciliation() {
    let fixture = Fixture::new();
    populate(&fixture, 4).await;
    let invalidator = invalidator(&fixture, Arc::new(MemoryMediaRepo::new()));
    let settings = OptimizationSettings::default();

    assert_eq!(
        invalidator.reconcile_settings(&settings).await,
        InvalidationOutcome::Unaffected
    );
    assert!(
        fixture
            .store
            .get(SETTINGS_SNAPSHOT_KEY)
            .await
            .expect("read snapshot")
            .is_some()
    );
    assert_eq!(fixture.cache.get_total_entries().await, 4);

    assert_eq!(
        invalidator.reconcile_settings(&settings).await,
        InvalidationOutcome::Unaffected
    );

    let changed = OptimizationSettings {
        webp_quality: settings.webp_quality - 10,
        ..settings.clone()
    };
    assert!(matches!(
        invalidator.reconcile_settings(&changed).await,
        InvalidationOutcome::Full { .. }
    ));
    assert_eq!(fixture.cache.get_total_entries().await, 0);
    assert!(
        fixture
            .store
            .get(SETTINGS_SNAPSHOT_KEY)
            .await
            .expect("read snapshot")
            .is_some(),
        "snapshot must survive a full clear"
    );
}
