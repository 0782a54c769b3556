//! Key codec: stable image identifiers, chunk buckets, and store keys.

use sha2::{Digest, Sha256};

use crate::domain::variants::ImageFormat;

/// Number of durable chunks records are spread across.
pub const CHUNK_COUNT: u64 = 10_000;

/// Prefix shared by every chunk key; `clear_all` deletes by this prefix.
pub const CHUNK_KEY_PREFIX: &str = "variant_cache_";

/// Unix timestamp of the most recent full invalidation.
pub const LAST_INVALIDATION_KEY: &str = "image_variants_last_invalidation";

/// JSON snapshot of the optimization settings seen on the previous run.
pub const SETTINGS_SNAPSHOT_KEY: &str = "image_variants_settings_snapshot";

/// Identity of one original image inside the cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageKey {
    hash: String,
    chunk_id: u16,
}

impl ImageKey {
    /// Derive the key for an original URL. Pure: the same URL always maps
    /// to the same hash and chunk, across processes and restarts.
    pub fn for_url(original_url: &str) -> Self {
        let digest = Sha256::digest(original_url.as_bytes());
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        let chunk_id = (u64::from_be_bytes(prefix) % CHUNK_COUNT) as u16;
        Self {
            hash: hex::encode(&digest[..16]),
            chunk_id,
        }
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn chunk_id(&self) -> u16 {
        self.chunk_id
    }

    pub fn chunk_key(&self) -> String {
        chunk_key(self.chunk_id)
    }
}

pub fn chunk_key(chunk_id: u16) -> String {
    format!("{CHUNK_KEY_PREFIX}{chunk_id}")
}

/// Runtime-layer key for one variant lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RuntimeKey {
    pub image_hash: String,
    pub format: ImageFormat,
    pub width: Option<u32>,
}

impl RuntimeKey {
    pub fn new(image: &ImageKey, format: ImageFormat, width: Option<u32>) -> Self {
        Self {
            image_hash: image.hash.clone(),
            format,
            width,
        }
    }
}
