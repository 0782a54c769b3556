mod support;

use std::collections::HashMap;

use varcache::application::repos::OptionStore;
use varcache::cache::{Chunk, ImageKey};
use varcache::domain::variants::ImageFormat;

use support::Fixture;

const PHOTO: &str = "/uploads/2024/05/photo.jpg";

#[tokio::test]
async fn stored_variants_read_back_through_a_fresh_runtime_layer() {
    let fixture = Fixture::new();
    let cache = &fixture.cache;

    cache
        .set_variant(PHOTO, ImageFormat::Avif, "/variants/2024/05/photo.avif", None)
        .await
        .expect("set base");
    cache
        .set_variant(
            PHOTO,
            ImageFormat::Webp,
            "/variants/2024/05/photo-800w.webp",
            Some(800),
        )
        .await
        .expect("set responsive");

    cache.clear_runtime();
    assert_eq!(cache.runtime_len(), 0);

    assert_eq!(
        cache.get_variant(PHOTO, ImageFormat::Avif, None).await.as_deref(),
        Some("/variants/2024/05/photo.avif")
    );
    assert_eq!(
        cache
            .get_variant(PHOTO, ImageFormat::Webp, Some(800))
            .await
            .as_deref(),
        Some("/variants/2024/05/photo-800w.webp")
    );
    assert!(cache.get_variant(PHOTO, ImageFormat::Webp, None).await.is_none());
    assert!(cache.get_variant(PHOTO, ImageFormat::Avif, Some(800)).await.is_none());

    let stats = cache.get_stats().await;
    assert_eq!(stats.persistent_hits, 2);
    assert_eq!(stats.misses, 2);
    assert_eq!(stats.writes, 2);
    assert_eq!(stats.total_entries, 1);
}

#[tokio::test]
async fn delete_removes_every_format_and_width() {
    let fixture = Fixture::new();
    let cache = &fixture.cache;

    for format in ImageFormat::ALL {
        for width in [None, Some(400), Some(800)] {
            let url = format!("/variants/photo-{width:?}.{}", format.extension());
            cache
                .set_variant(PHOTO, format, &url, width)
                .await
                .expect("set variant");
        }
    }

    assert!(cache.delete_variants(PHOTO).await.expect("delete"));

    for format in ImageFormat::ALL {
        for width in [None, Some(400), Some(800)] {
            assert!(
                cache.get_variant(PHOTO, format, width).await.is_none(),
                "{format} {width:?} survived deletion"
            );
        }
    }
    assert!(cache.get_record(PHOTO).await.is_none());
    assert_eq!(cache.get_total_entries().await, 0);
    assert_eq!(fixture.chunk_count(), 0, "empty chunk left behind");

    assert!(!cache.delete_variants(PHOTO).await.expect("second delete"));
}

#[tokio::test]
async fn repeated_writes_leave_one_entry() {
    let fixture = Fixture::new();
    let cache = &fixture.cache;

    for _ in 0..3 {
        cache
            .set_variant(PHOTO, ImageFormat::Webp, "/variants/photo.webp", None)
            .await
            .expect("set variant");
    }

    let record = cache.get_record(PHOTO).await.expect("record");
    assert_eq!(record.entries().len(), 1);
    assert_eq!(cache.get_total_entries().await, 1);
}

#[tokio::test]
async fn later_write_replaces_the_earlier_url() {
    let fixture = Fixture::new();
    let cache = &fixture.cache;

    cache
        .set_variant(PHOTO, ImageFormat::Webp, "/variants/old.webp", Some(400))
        .await
        .expect("first write");
    cache
        .set_variant(PHOTO, ImageFormat::Webp, "/variants/new.webp", Some(400))
        .await
        .expect("second write");
    cache.clear_runtime();

    assert_eq!(
        cache
            .get_variant(PHOTO, ImageFormat::Webp, Some(400))
            .await
            .as_deref(),
        Some("/variants/new.webp")
    );
}

#[tokio::test]
async fn record_lands_in_the_chunk_derived_from_its_url() {
    let fixture = Fixture::new();
    fixture
        .cache
        .set_variant(PHOTO, ImageFormat::Avif, "/variants/photo.avif", None)
        .await
        .expect("set variant");

    let key = ImageKey::for_url(PHOTO);
    assert_eq!(key, ImageKey::for_url(PHOTO));
    assert_eq!(fixture.store.keys(), vec![key.chunk_key()]);

    let raw = fixture
        .store
        .get(&key.chunk_key())
        .await
        .expect("store read")
        .expect("chunk present");
    let chunk: Chunk = serde_json::from_str(&raw).expect("chunk decodes");
    assert_eq!(chunk[key.hash()].original_url, PHOTO);
}

#[tokio::test]
async fn images_sharing_a_chunk_keep_separate_records() {
    let mut seen: HashMap<u16, String> = HashMap::new();
    let (first, second) = (0..100_000)
        .map(|index| format!("/uploads/{index}.jpg"))
        .find_map(|url| {
            let chunk = ImageKey::for_url(&url).chunk_id();
            seen.insert(chunk, url.clone()).map(|previous| (previous, url))
        })
        .expect("two urls sharing a chunk");

    let fixture = Fixture::new();
    let cache = &fixture.cache;
    cache
        .set_variant(&first, ImageFormat::Avif, "/variants/first.avif", None)
        .await
        .expect("first");
    cache
        .set_variant(&second, ImageFormat::Avif, "/variants/second.avif", None)
        .await
        .expect("second");
    assert_eq!(fixture.chunk_count(), 1);

    assert!(cache.delete_variants(&first).await.expect("delete first"));
    cache.clear_runtime();

    assert!(cache.get_variant(&first, ImageFormat::Avif, None).await.is_none());
    assert_eq!(
        cache.get_variant(&second, ImageFormat::Avif, None).await.as_deref(),
        Some("/variants/second.avif")
    );
    assert_eq!(fixture.chunk_count(), 1);
}

#[tokio::test]
async fn clear_all_drops_every_chunk_but_unrelated_keys() {
    let fixture = Fixture::new();
    fixture
        .store
        .set("unrelated_option", "1")
        .await
        .expect("seed option");
    for index in 0..5 {
        fixture
            .cache
            .set_variant(
                &format!("/uploads/{index}.png"),
                ImageFormat::Webp,
                &format!("/variants/{index}.webp"),
                None,
            )
            .await
            .expect("set variant");
    }
    let chunks = fixture.chunk_count() as u64;

    assert_eq!(fixture.cache.clear_all().await.expect("clear"), chunks);
    assert_eq!(fixture.cache.runtime_len(), 0);
    assert_eq!(fixture.store.keys(), vec!["unrelated_option".to_string()]);
}
