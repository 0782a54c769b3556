//! Uploaded media as seen by the variant subsystem.

use std::path::Path;

use time::OffsetDateTime;
use uuid::Uuid;

/// An uploaded original image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAsset {
    pub id: Uuid,
    /// Canonical public URL of the original file.
    pub url: String,
    pub content_type: String,
    pub created_at: OffsetDateTime,
}

impl ImageAsset {
    /// Whether variants can be generated from this asset (JPEG or PNG).
    pub fn is_convertible(&self) -> bool {
        is_convertible_type(&self.content_type)
    }
}

/// Natural pixel dimensions of an original image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    /// Height that keeps the aspect ratio at `width`, rounded to the nearest pixel.
    pub fn proportional_height(&self, width: u32) -> u32 {
        if self.width == 0 {
            return 0;
        }
        let height = f64::from(width) * f64::from(self.height) / f64::from(self.width);
        height.round() as u32
    }
}

pub fn is_convertible_type(content_type: &str) -> bool {
    matches!(
        content_type.trim().to_ascii_lowercase().as_str(),
        "image/jpeg" | "image/jpg" | "image/pjpeg" | "image/png"
    )
}

/// Guess whether a path names a convertible original from its extension.
pub fn is_convertible_path(path: &Path) -> bool {
    mime_guess::from_path(path)
        .first()
        .is_some_and(|mime| is_convertible_type(mime.essence_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proportional_height_rounds() {
        let dims = Dimensions {
            width: 1000,
            height: 667,
        };
        assert_eq!(dims.proportional_height(400), 267);
        assert_eq!(dims.proportional_height(1000), 667);
    }

    #[test]
    fn proportional_height_of_degenerate_image_is_zero() {
        let dims = Dimensions {
            width: 0,
            height: 10,
        };
        assert_eq!(dims.proportional_height(400), 0);
    }

    #[test]
    fn convertible_types() {
        assert!(is_convertible_type("image/jpeg"));
        assert!(is_convertible_type("IMAGE/PNG"));
        assert!(!is_convertible_type("image/gif"));
        assert!(!is_convertible_type("image/webp"));
        assert!(is_convertible_path(Path::new("a/b/photo.JPG")));
        assert!(!is_convertible_path(Path::new("a/b/photo.webp")));
    }
}
