//! Image variant cache.
//!
//! Tracks which optimized variants (AVIF/WebP, optionally at a responsive
//! width) exist for every original image URL, so rendering never has to
//! stat the filesystem:
//!
//! - **Runtime layer**: bounded in-process map, rebuilt on demand.
//! - **Durable layer**: records bucketed into 10 000 chunks in the option store.
//!
//! Around the store sit the [`ConsistencyChecker`] (drift detection and
//! repair), the [`Invalidator`] (drops stale entries on external changes)
//! and the [`Warmer`] (pre-generates responsive breakpoints).
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! enabled = true
//! runtime_entry_limit = 4096
//! max_reported_issues = 100
//! ```

mod config;
mod consistency;
mod error;
mod events;
mod invalidator;
pub mod keys;
pub(crate) mod lock;
mod store;
mod warmer;

pub use config::CacheConfig;
pub use consistency::{ConsistencyChecker, ConsistencyReport};
pub use error::CacheError;
pub use events::{InvalidationEvent, InvalidationScope};
pub use invalidator::{InvalidationOutcome, Invalidator};
pub use keys::{ImageKey, RuntimeKey};
pub use store::{CacheStats, Chunk, RebuildReport, RecordScan, VariantCache};
pub use warmer::{
    BreakpointReport, DEFAULT_BREAKPOINTS, WarmError, WarmSummary, Warmer, WarmerConfig,
};
