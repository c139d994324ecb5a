pub mod flag;
pub mod ingest;
pub mod init;
pub mod leaderboard;
pub mod list;
pub mod recompute;
pub mod show;
pub mod validate;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};

use tally_core::parser;
use tally_store::{load_config_from, InMemoryStore, TallyConfig};

/// Configuration plus the store opened from its snapshot, with the catalog
/// (if any) registered.
pub(crate) struct Workspace {
    pub config: TallyConfig,
    pub store: Arc<InMemoryStore>,
}

impl Workspace {
    pub async fn open(config_path: Option<PathBuf>) -> Result<Self> {
        let config = load_config_from(config_path.as_deref())?;
        let store = InMemoryStore::open(
            &config.state_path,
            config.default_marking,
            config.default_max_marks,
        )
        .context("failed to open tally state")?;

        if let Some(catalog_path) = &config.catalog_path {
            let catalog = parser::parse_catalog(catalog_path)?;
            for w in parser::validate_catalog(&catalog) {
                tracing::warn!(
                    test_id = w.test_id.as_deref().unwrap_or("-"),
                    "catalog: {}",
                    w.message
                );
            }
            store.register_catalog(&catalog).await;
        }

        Ok(Self {
            config,
            store: Arc::new(store),
        })
    }

    /// Persist the store back to its snapshot.
    pub async fn save(&self) -> Result<()> {
        self.store
            .save(&self.config.state_path)
            .await
            .context("failed to save tally state")
    }
}
