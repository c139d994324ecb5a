//! tally-core — attempt deduplication, canonical selection and scoring.
//!
//! This crate defines the data model, the pure dedup and scoring logic, the
//! per-test ingestion pipeline and the async engine that drives it against
//! the storage traits.

pub mod cluster;
pub mod engine;
pub mod error;
pub mod event;
pub mod identity;
pub mod leaderboard;
pub mod model;
pub mod parser;
pub mod pipeline;
pub mod report;
pub mod scoring;
pub mod selector;
pub mod similarity;
pub mod traits;
