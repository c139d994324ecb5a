//! tally-store — storage and configuration for tally.
//!
//! Implements the `AttemptStore` and `SchemeSource` traits over an in-memory
//! state that is persisted as a JSON snapshot between runs, and loads the
//! `tally.toml` configuration.

pub mod config;
pub mod error;
pub mod listing;
pub mod memory;

pub use config::{load_config, load_config_from, TallyConfig};
pub use error::StoreError;
pub use listing::{AttemptFilter, AttemptPage, AttemptRow};
pub use memory::{DuplicateThread, Flag, InMemoryStore, ThreadEntry};
