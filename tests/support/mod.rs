#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;
use time::OffsetDateTime;
use uuid::Uuid;
use varcache::application::optimizer::{FormatOptimizer, OptimizerError, Resize};
use varcache::cache::keys::CHUNK_KEY_PREFIX;
use varcache::cache::{CacheConfig, VariantCache};
use varcache::domain::media::ImageAsset;
use varcache::domain::settings::OptimizationSettings;
use varcache::domain::variants::ImageFormat;
use varcache::infra::memory::MemoryOptionStore;
use varcache::infra::optimizer::CommandOptimizer;
use varcache::infra::paths::{Mount, PathMapper};

/// Temp uploads and variants trees served under `/uploads` and `/variants`.
pub struct Fixture {
    pub tmp: TempDir,
    pub store: Arc<MemoryOptionStore>,
    pub cache: Arc<VariantCache>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(CacheConfig::default())
    }

    pub fn with_config(config: CacheConfig) -> Self {
        let tmp = TempDir::new().expect("tempdir");
        let store = Arc::new(MemoryOptionStore::new());
        let mapper = mapper_for(tmp.path());
        let cache = Arc::new(VariantCache::new(&config, store.clone(), mapper));
        Self { tmp, store, cache }
    }

    pub fn mapper(&self) -> PathMapper {
        self.cache.mapper().clone()
    }

    pub fn uploads(&self) -> PathBuf {
        self.tmp.path().join("uploads")
    }

    pub fn variants(&self) -> PathBuf {
        self.tmp.path().join("variants")
    }

    /// Create `relative` below the uploads tree.
    pub fn write_original(&self, relative: &str, bytes: &[u8]) -> PathBuf {
        write_file(&self.uploads().join(relative), bytes)
    }

    /// Create `relative` below the variants tree.
    pub fn write_variant(&self, relative: &str) -> PathBuf {
        write_file(&self.variants().join(relative), b"variant")
    }

    pub fn chunk_count(&self) -> usize {
        self.store
            .keys()
            .iter()
            .filter(|key| key.starts_with(CHUNK_KEY_PREFIX))
            .count()
    }
}

pub fn mapper_for(root: &Path) -> PathMapper {
    PathMapper::new(
        Mount::new(root.join("uploads"), "/uploads"),
        Mount::new(root.join("variants"), "/variants"),
    )
}

pub fn write_file(path: &Path, bytes: &[u8]) -> PathBuf {
    fs::create_dir_all(path.parent().expect("parent dir")).expect("create dirs");
    fs::write(path, bytes).expect("write file");
    path.to_path_buf()
}

/// Smallest byte sequence from which PNG dimensions can be read.
pub fn png_header(width: u32, height: u32) -> Vec<u8> {
    let mut bytes = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    bytes.extend_from_slice(&13u32.to_be_bytes());
    bytes.extend_from_slice(b"IHDR");
    bytes.extend_from_slice(&width.to_be_bytes());
    bytes.extend_from_slice(&height.to_be_bytes());
    bytes.extend_from_slice(&[8, 6, 0, 0, 0]);
    bytes.extend_from_slice(&[0, 0, 0, 0]);
    bytes
}

pub fn image(url: &str, content_type: &str) -> ImageAsset {
    ImageAsset {
        id: Uuid::new_v4(),
        url: url.to_string(),
        content_type: content_type.to_string(),
        created_at: OffsetDateTime::now_utc(),
    }
}

/// Writes placeholder variant files where the real converter would, and
/// remembers every call.
pub struct RecordingOptimizer {
    naming: CommandOptimizer,
    calls: Mutex<Vec<(ImageFormat, Option<Resize>)>>,
}

impl RecordingOptimizer {
    pub fn new(mapper: PathMapper) -> Self {
        Self {
            naming: CommandOptimizer::new(
                PathBuf::from("unused"),
                mapper,
                &OptimizationSettings::default(),
            ),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(ImageFormat, Option<Resize>)> {
        self.calls.lock().expect("calls lock").clone()
    }
}

#[async_trait]
impl FormatOptimizer for RecordingOptimizer {
    async fn generate(
        &self,
        source: &Path,
        format: ImageFormat,
        resize: Option<Resize>,
    ) -> Result<PathBuf, OptimizerError> {
        self.calls
            .lock()
            .expect("calls lock")
            .push((format, resize));
        let output = self.naming.output_path(source, format, resize)?;
        Ok(write_file(&output, b"variant"))
    }
}
