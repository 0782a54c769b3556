//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::media::ImageAsset;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Durable string key/value store (an "options table").
///
/// Only single-key writes are atomic; there are no transactions across keys.
#[async_trait]
pub trait OptionStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, RepoError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), RepoError>;

    /// Remove one key. Returns whether it existed.
    async fn delete(&self, key: &str) -> Result<bool, RepoError>;

    /// Remove every key starting with `prefix`. Returns the number removed.
    async fn delete_by_prefix(&self, prefix: &str) -> Result<u64, RepoError>;

    /// Every `(key, value)` pair whose key starts with `prefix`, ordered by key.
    async fn list_by_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>, RepoError>;
}

/// Read access to uploaded original images.
#[async_trait]
pub trait MediaRepo: Send + Sync {
    async fn find_image(&self, id: Uuid) -> Result<Option<ImageAsset>, RepoError>;

    /// Most recently uploaded images first.
    async fn recent_images(&self, limit: u32) -> Result<Vec<ImageAsset>, RepoError>;
}
