//! Variant formats, per-image variant records, and the variant filename convention.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::DomainError;

/// Extensions an original raster image may carry, in the order they are
/// probed when reconstructing an original from a variant filename.
pub const ORIGINAL_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "JPG", "JPEG", "PNG"];

/// Modern encodings generated for an original image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Avif,
    Webp,
}

impl ImageFormat {
    pub const ALL: [ImageFormat; 2] = [ImageFormat::Avif, ImageFormat::Webp];

    pub fn as_str(self) -> &'static str {
        match self {
            ImageFormat::Avif => "avif",
            ImageFormat::Webp => "webp",
        }
    }

    pub fn extension(self) -> &'static str {
        self.as_str()
    }

    /// Match a file extension case-insensitively.
    pub fn from_extension(extension: &str) -> Option<Self> {
        if extension.eq_ignore_ascii_case("avif") {
            Some(ImageFormat::Avif)
        } else if extension.eq_ignore_ascii_case("webp") {
            Some(ImageFormat::Webp)
        } else {
            None
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImageFormat {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::from_extension(value.trim())
            .ok_or_else(|| DomainError::validation(format!("unsupported image format `{value}`")))
    }
}

/// Everything known about the variants of one original image.
///
/// Stored inside a chunk under the image's hash. A record with no base
/// variants and no responsive widths is empty and must not be persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantRecord {
    pub original_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avif_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webp_url: Option<String>,
    #[serde(default, skip_serializing_if = "ResponsiveVariants::is_empty")]
    pub responsive: ResponsiveVariants,
}

/// Responsive variants keyed by pixel width, one map per format.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponsiveVariants {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub avif: BTreeMap<u32, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub webp: BTreeMap<u32, String>,
}

impl ResponsiveVariants {
    pub fn is_empty(&self) -> bool {
        self.avif.is_empty() && self.webp.is_empty()
    }

    pub fn for_format(&self, format: ImageFormat) -> &BTreeMap<u32, String> {
        match format {
            ImageFormat::Avif => &self.avif,
            ImageFormat::Webp => &self.webp,
        }
    }

    pub fn for_format_mut(&mut self, format: ImageFormat) -> &mut BTreeMap<u32, String> {
        match format {
            ImageFormat::Avif => &mut self.avif,
            ImageFormat::Webp => &mut self.webp,
        }
    }
}

impl VariantRecord {
    pub fn new(original_url: impl Into<String>) -> Self {
        Self {
            original_url: original_url.into(),
            ..Default::default()
        }
    }

    pub fn base(&self, format: ImageFormat) -> Option<&str> {
        match format {
            ImageFormat::Avif => self.avif_url.as_deref(),
            ImageFormat::Webp => self.webp_url.as_deref(),
        }
    }

    fn base_mut(&mut self, format: ImageFormat) -> &mut Option<String> {
        match format {
            ImageFormat::Avif => &mut self.avif_url,
            ImageFormat::Webp => &mut self.webp_url,
        }
    }

    /// Look up a variant; `None` width addresses the base variant.
    pub fn get(&self, format: ImageFormat, width: Option<u32>) -> Option<&str> {
        match width {
            None => self.base(format),
            Some(width) => self
                .responsive
                .for_format(format)
                .get(&width)
                .map(String::as_str),
        }
    }

    /// Record a variant. Returns true when the stored value changed.
    pub fn set(&mut self, format: ImageFormat, width: Option<u32>, variant_url: &str) -> bool {
        let previous = match width {
            None => self.base_mut(format).replace(variant_url.to_string()),
            Some(width) => self
                .responsive
                .for_format_mut(format)
                .insert(width, variant_url.to_string()),
        };
        previous.as_deref() != Some(variant_url)
    }

    pub fn is_empty(&self) -> bool {
        self.avif_url.is_none() && self.webp_url.is_none() && self.responsive.is_empty()
    }

    /// Every `(format, width, url)` entry held by this record.
    pub fn entries(&self) -> Vec<(ImageFormat, Option<u32>, &str)> {
        let mut entries = Vec::new();
        for format in ImageFormat::ALL {
            if let Some(url) = self.base(format) {
                entries.push((format, None, url));
            }
            for (width, url) in self.responsive.for_format(format) {
                entries.push((format, Some(*width), url.as_str()));
            }
        }
        entries
    }
}

/// A parsed variant filename of the form `<basename>[-<width>w].<format>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantFileName {
    pub basename: String,
    pub width: Option<u32>,
    pub format: ImageFormat,
}

impl VariantFileName {
    /// Parse a bare filename (no directories).
    ///
    /// Returns `None` for files that are not AVIF/WebP variants.
    pub fn parse(file_name: &str) -> Option<Self> {
        let (stem, extension) = file_name.rsplit_once('.')?;
        let format = ImageFormat::from_extension(extension)?;
        if stem.is_empty() {
            return None;
        }

        let (basename, width) = split_width_suffix(stem);
        if basename.is_empty() {
            return None;
        }

        Some(Self {
            basename: basename.to_string(),
            width,
            format,
        })
    }

    pub fn render(basename: &str, width: Option<u32>, format: ImageFormat) -> String {
        match width {
            Some(width) => format!("{basename}-{width}w.{}", format.extension()),
            None => format!("{basename}.{}", format.extension()),
        }
    }
}

fn split_width_suffix(stem: &str) -> (&str, Option<u32>) {
    let Some((basename, suffix)) = stem.rsplit_once('-') else {
        return (stem, None);
    };
    let Some(digits) = suffix.strip_suffix('w') else {
        return (stem, None);
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return (stem, None);
    }
    match digits.parse::<u32>() {
        Ok(width) if width > 0 => (basename, Some(width)),
        _ => (stem, None),
    }
}
