//! Process-local adapters for the option store and media repository.
//!
//! Nothing here is durable; the test suite runs against these.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use uuid::Uuid;

use crate::application::repos::{MediaRepo, OptionStore, RepoError};
use crate::cache::lock::{rw_read, rw_write};
use crate::domain::media::ImageAsset;

const SOURCE: &str = "infra::memory";

#[derive(Debug, Default)]
pub struct MemoryOptionStore {
    options: RwLock<BTreeMap<String, String>>,
}

impl MemoryOptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        rw_read(&self.options, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keys(&self) -> Vec<String> {
        rw_read(&self.options, SOURCE, "keys")
            .keys()
            .cloned()
            .collect()
    }
}

#[async_trait]
impl OptionStore for MemoryOptionStore {
    async fn get(&self, key: &str) -> Result<Option<String>, RepoError> {
        Ok(rw_read(&self.options, SOURCE, "get").get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), RepoError> {
        rw_write(&self.options, SOURCE, "set").insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, RepoError> {
        Ok(rw_write(&self.options, SOURCE, "delete")
            .remove(key)
            .is_some())
    }

    async fn delete_by_prefix(&self, prefix: &str) -> Result<u64, RepoError> {
        let mut options = rw_write(&self.options, SOURCE, "delete_by_prefix");
        let before = options.len();
        options.retain(|key, _| !key.starts_with(prefix));
        Ok((before - options.len()) as u64)
    }

    async fn list_by_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>, RepoError> {
        Ok(rw_read(&self.options, SOURCE, "list_by_prefix")
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }
}

#[derive(Debug, Default)]
pub struct MemoryMediaRepo {
    images: RwLock<Vec<ImageAsset>>,
}

impl MemoryMediaRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, image: ImageAsset) {
        let mut images = rw_write(&self.images, SOURCE, "insert");
        images.retain(|existing| existing.id != image.id);
        images.push(image);
    }

    pub fn remove(&self, id: Uuid) {
        rw_write(&self.images, SOURCE, "remove").retain(|image| image.id != id);
    }
}

#[async_trait]
impl MediaRepo for MemoryMediaRepo {
    async fn find_image(&self, id: Uuid) -> Result<Option<ImageAsset>, RepoError> {
        Ok(rw_read(&self.images, SOURCE, "find_image")
            .iter()
            .find(|image| image.id == id)
            .cloned())
    }

    /// Newest convertible images first, like the Postgres adapter.
    async fn recent_images(&self, limit: u32) -> Result<Vec<ImageAsset>, RepoError> {
        let mut images: Vec<ImageAsset> = rw_read(&self.images, SOURCE, "recent_images")
            .iter()
            .filter(|image| image.is_convertible())
            .cloned()
            .collect();
        images.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        images.truncate(limit as usize);
        Ok(images)
    }
}

#[cfg(test)]
mod tests {
    use time::{Duration, OffsetDateTime};

    use super::*;

    #[tokio::test]
    async fn prefix_operations_only_touch_matching_keys() {
        let store = MemoryOptionStore::new();
        store.set("variant_cache_1", "{}").await.unwrap();
        store.set("variant_cache_20", "{}").await.unwrap();
        store.set("variant_cachex", "{}").await.unwrap();
        store.set("other", "1").await.unwrap();

        let listed = store.list_by_prefix("variant_cache_").await.unwrap();
        let keys: Vec<_> = listed.iter().map(|(key, _)| key.as_str()).collect();
        assert_eq!(keys, vec!["variant_cache_1", "variant_cache_20"]);

        assert_eq!(store.delete_by_prefix("variant_cache_").await.unwrap(), 2);
        assert_eq!(store.keys(), vec!["other", "variant_cachex"]);
    }

    #[tokio::test]
    async fn delete_reports_presence() {
        let store = MemoryOptionStore::new();
        store.set("a", "1").await.unwrap();
        assert!(store.delete("a").await.unwrap());
        assert!(!store.delete("a").await.unwrap());
        assert!(store.get("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn recent_images_are_newest_first() {
        let repo = MemoryMediaRepo::new();
        let now = OffsetDateTime::now_utc();
        for offset in 0..3 {
            repo.insert(ImageAsset {
                id: Uuid::new_v4(),
                url: format!("/uploads/{offset}.jpg"),
                content_type: "image/jpeg".to_string(),
                created_at: now - Duration::hours(offset),
            });
        }

        let recent = repo.recent_images(2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].url, "/uploads/0.jpg");
        assert_eq!(recent[1].url, "/uploads/1.jpg");
    }

    #[tokio::test]
    async fn recent_images_skip_unconvertible_types() {
        let repo = MemoryMediaRepo::new();
        let now = OffsetDateTime::now_utc();
        for (offset, (url, content_type)) in [
            ("/uploads/anim.gif", "image/gif"),
            ("/uploads/photo.png", "image/png"),
            ("/uploads/doc.pdf", "application/pdf"),
            ("/uploads/photo.jpg", "image/jpeg"),
        ]
        .into_iter()
        .enumerate()
        {
            repo.insert(ImageAsset {
                id: Uuid::new_v4(),
                url: url.to_string(),
                content_type: content_type.to_string(),
                created_at: now - Duration::minutes(offset as i64),
            });
        }

        let recent = repo.recent_images(10).await.unwrap();
        let urls: Vec<_> = recent.iter().map(|image| image.url.as_str()).collect();
        assert_eq!(urls, vec!["/uploads/photo.png", "/uploads/photo.jpg"]);
    }
}
