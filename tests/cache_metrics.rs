mod support;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use metrics_util::debugging::DebuggingRecorder;
use varcache::cache::{CacheConfig, ConsistencyChecker, Invalidator, Warmer, WarmerConfig};
use varcache::domain::variants::ImageFormat;
use varcache::infra::memory::MemoryMediaRepo;

use support::{Fixture, RecordingOptimizer, image, png_header};

#[tokio::test]
async fn cache_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    let fixture = Fixture::new();
    let cache = &fixture.cache;
    let photo = "/uploads/photo.png";

    // write, durable hit, runtime hit, miss
    cache
        .set_variant(photo, ImageFormat::Avif, "/variants/photo.avif", None)
        .await
        .expect("set variant");
    cache.clear_runtime();
    assert!(cache.get_variant(photo, ImageFormat::Avif, None).await.is_some());
    assert!(cache.get_variant(photo, ImageFormat::Avif, None).await.is_some());
    assert!(cache.get_variant(photo, ImageFormat::Webp, None).await.is_none());

    // warming
    fixture.write_original("photo.png", &png_header(900, 600));
    let media = Arc::new(MemoryMediaRepo::new());
    let asset = image(photo, "image/png");
    let id = asset.id;
    media.insert(asset);
    let warmer = Warmer::new(
        WarmerConfig {
            breakpoints: vec![400],
            batch_size: 1,
            delay: Duration::ZERO,
            enable_format_conversion: true,
        },
        cache.clone(),
        media.clone(),
        Arc::new(RecordingOptimizer::new(fixture.mapper())),
    );
    assert!(warmer.warm_new_image(id).await.is_some());

    // consistency, rebuild, invalidation
    ConsistencyChecker::new(cache.clone(), 10)
        .check_consistency(false)
        .await;
    cache.rebuild_from_filesystem().await;
    Invalidator::new(&CacheConfig::default(), cache.clone(), media)
        .theme_switched()
        .await;

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        "varcache_runtime_hit_total",
        "varcache_persistent_hit_total",
        "varcache_miss_total",
        "varcache_write_total",
        "varcache_rebuild_ms",
        "varcache_consistency_check_ms",
        "varcache_invalidation_total",
        "varcache_warm_generated_total",
        "varcache_warm_ms",
    ];

    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}
