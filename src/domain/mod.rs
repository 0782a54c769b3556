//! Domain types shared across the variant cache.

pub mod error;
pub mod media;
pub mod settings;
pub mod variants;
