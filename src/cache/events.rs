//! Invalidation events and the scope each one implies.

use uuid::Uuid;

use crate::domain::settings::OptimizationSettings;

/// External state change that may make cached variants stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidationEvent {
    /// Optimization settings were saved.
    SettingsChanged {
        old: OptimizationSettings,
        new: OptimizationSettings,
    },
    /// An image's metadata was regenerated.
    ImageEdited { image_id: Uuid },
    /// An image is being deleted. Fire before the media record is removed,
    /// the image URL is resolved through it.
    ImageDeleted { image_id: Uuid },
    ThemeSwitched,
    PluginToggled { plugin: String, activated: bool },
}

/// How much of the cache an event invalidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidationScope {
    Nothing,
    Image(Uuid),
    Full,
}

impl InvalidationScope {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Nothing => "none",
            Self::Image(_) => "image",
            Self::Full => "full",
        }
    }
}

impl InvalidationEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SettingsChanged { .. } => "settings_changed",
            Self::ImageEdited { .. } => "image_edited",
            Self::ImageDeleted { .. } => "image_deleted",
            Self::ThemeSwitched => "theme_switched",
            Self::PluginToggled { .. } => "plugin_toggled",
        }
    }

    /// Settings saves only invalidate when a watched key changed; theme and
    /// plugin changes can alter rendering of any image, so they clear everything.
    pub fn scope(&self) -> InvalidationScope {
        match self {
            Self::SettingsChanged { old, new } => {
                if old.watched_changes(new).is_empty() {
                    InvalidationScope::Nothing
                } else {
                    InvalidationScope::Full
                }
            }
            Self::ImageEdited { image_id } | Self::ImageDeleted { image_id } => {
                InvalidationScope::Image(*image_id)
            }
            Self::ThemeSwitched | Self::PluginToggled { .. } => InvalidationScope::Full,
        }
    }
}
