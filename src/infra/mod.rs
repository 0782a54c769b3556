//! Infrastructure adapters and runtime bootstrap.

pub mod db;
pub mod error;
pub mod files;
pub mod memory;
pub mod optimizer;
pub mod paths;
pub mod telemetry;
