//! Variant tree scanning and original-file reconstruction.

use std::io;
use std::path::{Path, PathBuf};

use tokio::{fs, task};
use walkdir::WalkDir;

use crate::domain::variants::{ORIGINAL_EXTENSIONS, VariantFileName};

use super::paths::PathMapper;

/// A recognised variant file on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantFile {
    pub path: PathBuf,
    pub name: VariantFileName,
}

/// Result of walking the variant tree. Unreadable entries are reported, not fatal.
#[derive(Debug, Default)]
pub struct VariantScan {
    pub files: Vec<VariantFile>,
    pub errors: Vec<String>,
}

/// Walk `root` recursively and collect every AVIF/WebP variant.
///
/// A missing root yields an empty scan. Runs on the blocking pool.
pub async fn scan_variant_files(root: &Path) -> io::Result<VariantScan> {
    let root = root.to_path_buf();
    task::spawn_blocking(move || walk_variant_tree(&root))
        .await
        .map_err(io::Error::other)
}

fn walk_variant_tree(root: &Path) -> VariantScan {
    let mut scan = VariantScan::default();
    if !root.exists() {
        return scan;
    }

    for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                scan.errors.push(format!("failed to read variant tree entry: {err}"));
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(file_name) = entry.file_name().to_str() else {
            scan.errors.push(format!(
                "skipping non UTF-8 file name `{}`",
                entry.path().display()
            ));
            continue;
        };
        if let Some(name) = VariantFileName::parse(file_name) {
            scan.files.push(VariantFile {
                path: entry.path().to_path_buf(),
                name,
            });
        }
    }

    scan
}

/// The original image a variant file was generated from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedOriginal {
    pub path: PathBuf,
    pub url: String,
}

/// Reconstruct the original behind a variant file.
///
/// Strips the width suffix, then probes each original extension in
/// [`ORIGINAL_EXTENSIONS`] order; the first file that exists wins.
pub async fn resolve_original(
    mapper: &PathMapper,
    variant: &VariantFile,
) -> io::Result<Option<ResolvedOriginal>> {
    let Some(directory) = mapper.original_dir_for(&variant.path) else {
        return Ok(None);
    };

    for extension in ORIGINAL_EXTENSIONS {
        let candidate = directory.join(format!("{}.{extension}", variant.name.basename));
        if fs::try_exists(&candidate).await? {
            let Some(url) = mapper.original_url(&candidate) else {
                return Ok(None);
            };
            return Ok(Some(ResolvedOriginal {
                path: candidate,
                url,
            }));
        }
    }

    Ok(None)
}
