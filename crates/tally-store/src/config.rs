//! Configuration loading.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use tally_core::cluster::DedupConfig;
use tally_core::engine::IngestEngineConfig;
use tally_core::model::{default_max_marks, MarkingScheme};

/// Top-level tally configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TallyConfig {
    /// Maximum start-time gap between duplicates, in seconds.
    #[serde(default = "default_time_window")]
    pub time_window_secs: u64,
    /// Minimum answer similarity for duplicates, in (0, 1].
    #[serde(default = "default_threshold")]
    pub similarity_threshold: f64,
    /// Max tests ingested concurrently.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    /// JSON snapshot holding attempts, scores and flags.
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,
    /// Test catalog with marking schemes and answer keys.
    #[serde(default)]
    pub catalog_path: Option<PathBuf>,
    /// Scheme for tests missing from the catalog.
    #[serde(default)]
    pub default_marking: MarkingScheme,
    #[serde(default = "default_max_marks")]
    pub default_max_marks: u32,
}

fn default_time_window() -> u64 {
    420
}
fn default_threshold() -> f64 {
    0.92
}
fn default_parallelism() -> usize {
    4
}
fn default_state_path() -> PathBuf {
    PathBuf::from("./tally-state.json")
}

impl Default for TallyConfig {
    fn default() -> Self {
        Self {
            time_window_secs: default_time_window(),
            similarity_threshold: default_threshold(),
            parallelism: default_parallelism(),
            state_path: default_state_path(),
            catalog_path: None,
            default_marking: MarkingScheme::default(),
            default_max_marks: default_max_marks(),
        }
    }
}

impl TallyConfig {
    /// Reject values the engine cannot work with.
    pub fn validate(&self) -> Result<()> {
        if !(self.similarity_threshold > 0.0 && self.similarity_threshold <= 1.0) {
            anyhow::bail!(
                "similarity_threshold must be in (0, 1], got {}",
                self.similarity_threshold
            );
        }
        if self.parallelism == 0 {
            anyhow::bail!("parallelism must be at least 1");
        }
        self.default_marking
            .validate("<default>")
            .context("invalid default_marking")?;
        Ok(())
    }

    pub fn dedup(&self) -> DedupConfig {
        DedupConfig {
            time_window: chrono::Duration::from_std(Duration::from_secs(self.time_window_secs))
                .unwrap_or(chrono::Duration::MAX),
            similarity_threshold: self.similarity_threshold,
        }
    }

    pub fn engine(&self) -> IngestEngineConfig {
        IngestEngineConfig {
            parallelism: self.parallelism,
            dedup: self.dedup(),
        }
    }
}

/// Expand `${VAR}` references. Substituted values are not expanded again.
fn resolve_env_vars(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("${") {
        let Some(end) = rest[start..].find('}') else {
            break;
        };
        result.push_str(&rest[..start]);
        let var_name = &rest[start + 2..start + end];
        result.push_str(&std::env::var(var_name).unwrap_or_default());
        rest = &rest[start + end + 1..];
    }
    result.push_str(rest);
    result
}

fn resolve_path(path: &Path) -> PathBuf {
    PathBuf::from(resolve_env_vars(&path.to_string_lossy()))
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `tally.toml` in the current directory
/// 2. `~/.config/tally/config.toml`
///
/// Environment variable overrides: `TALLY_STATE_PATH`,
/// `TALLY_SIMILARITY_THRESHOLD`, `TALLY_TIME_WINDOW_SECS`.
pub fn load_config() -> Result<TallyConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<TallyConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("tally.toml");
        if local.exists() {
            Some(local)
        } else {
            dirs_path()
                .map(|home| home.join("config.toml"))
                .filter(|global| global.exists())
        }
    };

    let mut config = match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            parse_config_str(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => TallyConfig::default(),
    };

    apply_env_overrides(&mut config)?;
    config.state_path = resolve_path(&config.state_path);
    config.catalog_path = config.catalog_path.as_deref().map(resolve_path);
    config.validate()?;

    Ok(config)
}

/// Parse a config from a TOML string.
pub fn parse_config_str(content: &str) -> Result<TallyConfig> {
    Ok(toml::from_str::<TallyConfig>(content)?)
}

fn apply_env_overrides(config: &mut TallyConfig) -> Result<()> {
    if let Ok(path) = std::env::var("TALLY_STATE_PATH") {
        config.state_path = PathBuf::from(path);
    }
    if let Ok(value) = std::env::var("TALLY_SIMILARITY_THRESHOLD") {
        config.similarity_threshold = value
            .trim()
            .parse()
            .with_context(|| format!("invalid TALLY_SIMILARITY_THRESHOLD: {value}"))?;
    }
    if let Ok(value) = std::env::var("TALLY_TIME_WINDOW_SECS") {
        config.time_window_secs = value
            .trim()
            .parse()
            .with_context(|| format!("invalid TALLY_TIME_WINDOW_SECS: {value}"))?;
    }
    Ok(())
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("tally"))
}
