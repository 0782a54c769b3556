mod support;

use varcache::cache::ConsistencyChecker;
use varcache::domain::variants::ImageFormat;

use support::Fixture;

const PHOTO: &str = "/uploads/photo.jpg";

fn checker(fixture: &Fixture) -> ConsistencyChecker {
    ConsistencyChecker::new(fixture.cache.clone(), 10)
}

#[tokio::test]
async fn cache_entry_without_file_is_reported_and_removed() {
    let fixture = Fixture::new();
    fixture.write_original("photo.jpg", b"original");
    fixture
        .cache
        .set_variant(PHOTO, ImageFormat::Webp, "/variants/ghost.webp", None)
        .await
        .expect("seed stale entry");

    let report = checker(&fixture).check_consistency(true).await;

    assert_eq!(report.total_cache_entries, 1);
    assert_eq!(report.orphaned_cache, 1);
    assert_eq!(report.consistent, 0);
    assert!(report.repaired >= 1);
    assert!(!report.is_consistent());
    assert!(report.issues.iter().any(|issue| issue.contains("ghost.webp")));

    assert!(
        fixture
            .cache
            .get_variant(PHOTO, ImageFormat::Webp, None)
            .await
            .is_none()
    );
}

#[tokio::test]
async fn file_without_cache_entry_is_registered() {
    let fixture = Fixture::new();
    fixture.write_original("photo.jpg", b"original");
    fixture.write_variant("photo-400w.avif");

    let report = checker(&fixture).check_consistency(true).await;

    assert_eq!(report.filesystem_variants, 1);
    assert_eq!(report.orphaned_files, 1);
    assert_eq!(report.repaired, 1);

    assert_eq!(
        fixture
            .cache
            .get_variant(PHOTO, ImageFormat::Avif, Some(400))
            .await
            .as_deref(),
        Some("/variants/photo-400w.avif")
    );

    let second = checker(&fixture).check_consistency(true).await;
    assert!(second.is_consistent(), "{second:?}");
    assert_eq!(second.consistent, 1);
    assert_eq!(second.repaired, 0);
}

#[tokio::test]
async fn report_only_run_changes_nothing() {
    let fixture = Fixture::new();
    fixture.write_original("photo.jpg", b"original");
    fixture.write_variant("photo-800w.webp");
    fixture
        .cache
        .set_variant(PHOTO, ImageFormat::Avif, "/variants/missing.avif", None)
        .await
        .expect("seed stale entry");

    let report = checker(&fixture).check_consistency(false).await;

    assert_eq!(report.orphaned_cache, 1);
    assert_eq!(report.orphaned_files, 1);
    assert_eq!(report.repaired, 0);

    fixture.cache.clear_runtime();
    assert_eq!(
        fixture
            .cache
            .get_variant(PHOTO, ImageFormat::Avif, None)
            .await
            .as_deref(),
        Some("/variants/missing.avif")
    );
    assert!(
        fixture
            .cache
            .get_variant(PHOTO, ImageFormat::Webp, Some(800))
            .await
            .is_none()
    );
}

#[tokio::test]
async fn variant_without_original_is_left_alone() {
    let fixture = Fixture::new();
    fixture.write_variant("stray-400w.webp");

    let report = checker(&fixture).check_consistency(true).await;

    assert_eq!(report.filesystem_variants, 1);
    assert_eq!(report.unresolved_files, 1);
    assert_eq!(report.orphaned_files, 0);
    assert_eq!(report.repaired, 0);
    assert_eq!(fixture.cache.get_total_entries().await, 0);
}

#[tokio::test]
async fn issue_list_is_capped() {
    let fixture = Fixture::new();
    for index in 0..15 {
        fixture
            .cache
            .set_variant(
                &format!("/uploads/{index}.jpg"),
                ImageFormat::Webp,
                &format!("/variants/{index}.webp"),
                None,
            )
            .await
            .expect("seed stale entry");
    }

    let report = checker(&fixture).check_consistency(false).await;

    assert_eq!(report.orphaned_cache, 15);
    assert_eq!(report.issues.len(), 10);
    assert_eq!(report.issues_truncated, 5);
}

#[tokio::test]
async fn empty_trees_are_consistent() {
    let fixture = Fixture::new();

    let report = checker(&fixture).check_consistency(true).await;

    assert!(report.is_consistent(), "{report:?}");
    assert_eq!(report.total_cache_entries, 0);
    assert_eq!(report.filesystem_variants, 0);
}
