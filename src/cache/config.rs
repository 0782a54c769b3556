//! Cache configuration.
//!
//! Controls the runtime layer and diagnostics of the variant cache via the
//! `[cache]` section of `varcache.toml`.

use std::num::NonZeroUsize;

use serde::Deserialize;

const DEFAULT_RUNTIME_ENTRY_LIMIT: usize = 4096;
const DEFAULT_MAX_REPORTED_ISSUES: usize = 100;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// When false, invalidation triggers are ignored.
    pub enabled: bool,
    /// Maximum runtime-layer entries held in memory (LRU beyond that).
    pub runtime_entry_limit: usize,
    /// Maximum diagnostic lines kept in a consistency report.
    pub max_reported_issues: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            runtime_entry_limit: DEFAULT_RUNTIME_ENTRY_LIMIT,
            max_reported_issues: DEFAULT_MAX_REPORTED_ISSUES,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            runtime_entry_limit: settings.runtime_entry_limit.get(),
            max_reported_issues: settings.max_reported_issues,
        }
    }
}

impl CacheConfig {
    /// Returns the runtime entry limit as NonZeroUsize, clamping to 1 if zero.
    pub fn runtime_entry_limit_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.runtime_entry_limit).unwrap_or(NonZeroUsize::MIN)
    }
}
