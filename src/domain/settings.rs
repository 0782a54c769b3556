//! Optimization settings snapshot and the subset that affects stored variants.

use serde::{Deserialize, Serialize};

/// Settings keys whose change makes every stored variant stale.
pub const WATCHED_SETTINGS: &[&str] = &[
    "avif_quality",
    "webp_quality",
    "enable_format_conversion",
    "enable_responsive_resize",
];

/// Image optimization settings as saved by the administrator.
///
/// Only the fields listed in [`WATCHED_SETTINGS`] influence the bytes of
/// generated variants; the rest only change how pages are rewritten.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizationSettings {
    pub avif_quality: u8,
    pub webp_quality: u8,
    pub enable_format_conversion: bool,
    pub enable_responsive_resize: bool,
    pub lazy_load: bool,
    pub defer_scripts: bool,
    pub defer_styles: bool,
}

impl Default for OptimizationSettings {
    fn default() -> Self {
        Self {
            avif_quality: 60,
            webp_quality: 80,
            enable_format_conversion: true,
            enable_responsive_resize: true,
            lazy_load: true,
            defer_scripts: false,
            defer_styles: false,
        }
    }
}

impl OptimizationSettings {
    /// Watched keys whose values differ between `self` and `other`.
    pub fn watched_changes(&self, other: &Self) -> Vec<&'static str> {
        WATCHED_SETTINGS
            .iter()
            .copied()
            .filter(|key| self.watched_value(key) != other.watched_value(key))
            .collect()
    }

    fn watched_value(&self, key: &str) -> Option<u16> {
        match key {
            "avif_quality" => Some(u16::from(self.avif_quality)),
            "webp_quality" => Some(u16::from(self.webp_quality)),
            "enable_format_conversion" => Some(u16::from(self.enable_format_conversion)),
            "enable_responsive_resize" => Some(u16::from(self.enable_responsive_resize)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unwatched_changes_are_ignored() {
        let old = OptimizationSettings::default();
        let new = OptimizationSettings {
            lazy_load: false,
            defer_scripts: true,
            defer_styles: true,
            ..old.clone()
        };
        assert!(old.watched_changes(&new).is_empty());
    }

    #[test]
    fn watched_changes_are_reported_in_watch_list_order() {
        let old = OptimizationSettings::default();
        let new = OptimizationSettings {
            enable_responsive_resize: false,
            avif_quality: 45,
            ..old.clone()
        };
        assert_eq!(
            old.watched_changes(&new),
            vec!["avif_quality", "enable_responsive_resize"]
        );
    }

    #[test]
    fn partial_snapshot_fills_defaults() {
        let parsed: OptimizationSettings =
            serde_json::from_str(r#"{"webp_quality": 70}"#).expect("parse snapshot");
        assert_eq!(parsed.webp_quality, 70);
        assert_eq!(parsed.avif_quality, 60);
        assert!(parsed.enable_format_conversion);
    }
}
