//! URL <-> filesystem translation for originals and variants.

use std::path::{Component, Path, PathBuf};

/// One base URL mounted onto one base directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    dir: PathBuf,
    url: String,
}

impl Mount {
    pub fn new(dir: impl Into<PathBuf>, url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            dir: dir.into(),
            url: url.trim_end_matches('/').to_string(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Relative path (`/`-separated) of a URL below this mount.
    pub fn relative_from_url<'a>(&self, url: &'a str) -> Option<&'a str> {
        let url = strip_query(url);
        let rest = url.strip_prefix(self.url.as_str())?;
        let relative = rest.strip_prefix('/')?;
        if relative.is_empty() || !is_safe_relative(Path::new(relative)) {
            return None;
        }
        Some(relative)
    }

    pub fn url_to_path(&self, url: &str) -> Option<PathBuf> {
        self.relative_from_url(url)
            .map(|relative| self.dir.join(relative))
    }

    pub fn path_to_url(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.dir).ok()?;
        self.relative_to_url(relative)
    }

    pub fn relative_to_url(&self, relative: &Path) -> Option<String> {
        if !is_safe_relative(relative) {
            return None;
        }
        let mut joined = String::new();
        for component in relative.components() {
            let Component::Normal(part) = component else {
                continue;
            };
            joined.push('/');
            joined.push_str(part.to_str()?);
        }
        if joined.is_empty() {
            return None;
        }
        Some(format!("{}{joined}", self.url))
    }
}

/// Pure translator between public URLs and files on disk.
///
/// Originals live under the uploads mount, generated variants under the
/// variants mount; the two may share a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathMapper {
    uploads: Mount,
    variants: Mount,
}

impl PathMapper {
    pub fn new(uploads: Mount, variants: Mount) -> Self {
        Self { uploads, variants }
    }

    pub fn variants(&self) -> &Mount {
        &self.variants
    }

    pub fn original_path(&self, original_url: &str) -> Option<PathBuf> {
        self.uploads.url_to_path(original_url)
    }

    pub fn original_url(&self, path: &Path) -> Option<String> {
        self.uploads.path_to_url(path)
    }

    pub fn variant_path(&self, variant_url: &str) -> Option<PathBuf> {
        self.variants.url_to_path(variant_url)
    }

    pub fn variant_url(&self, path: &Path) -> Option<String> {
        self.variants.path_to_url(path)
    }

    /// Directory below the variants root that mirrors an original's directory.
    pub fn variant_dir_for(&self, original: &Path) -> Option<PathBuf> {
        let relative = original.strip_prefix(self.uploads.dir()).ok()?;
        if !is_safe_relative(relative) {
            return None;
        }
        let parent = relative.parent().unwrap_or_else(|| Path::new(""));
        Some(self.variants.dir().join(parent))
    }

    /// Original-tree counterpart of a variant's directory.
    pub fn original_dir_for(&self, variant: &Path) -> Option<PathBuf> {
        let relative = variant.strip_prefix(self.variants.dir()).ok()?;
        if !is_safe_relative(relative) {
            return None;
        }
        let parent = relative.parent().unwrap_or_else(|| Path::new(""));
        Some(self.uploads.dir().join(parent))
    }
}

fn strip_query(url: &str) -> &str {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    &url[..end]
}

fn is_safe_relative(path: &Path) -> bool {
    !path.is_absolute()
        && path
            .components()
            .all(|component| matches!(component, Component::Normal(_) | Component::CurDir))
}
