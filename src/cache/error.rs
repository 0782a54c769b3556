use thiserror::Error;

use crate::application::repos::RepoError;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("durable store error: {0}")]
    Store(#[from] RepoError),
    #[error("chunk `{key}` could not be encoded: {source}")]
    Codec {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

