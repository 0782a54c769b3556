//! Application layer: ports implemented by infrastructure, and scheduled jobs.

pub mod error;
pub mod jobs;
pub mod optimizer;
pub mod repos;
