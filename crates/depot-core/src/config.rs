use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use depot_util::errors::DepotError;

/// Resolver configuration loaded from `depot.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResolverConfig {
    #[serde(default)]
    pub resolver: SearchConfig,

    #[serde(default)]
    pub policy: PolicyConfig,
}

/// Search loop settings from `[resolver]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct SearchConfig {
    /// Iterations between progress log lines.
    #[serde(default = "default_progress_rate")]
    pub progress_rate: u64,

    /// Hard ceiling on search iterations; unlimited when unset.
    #[serde(default)]
    pub max_iterations: Option<u64>,

    /// Names whose absence from the universe is tolerated.
    #[serde(default)]
    pub allow_missing: Vec<String>,

    /// Parallel metadata fetches while warming the index.
    #[serde(default = "default_prefetch_concurrency")]
    pub prefetch_concurrency: usize,

    /// Remember exhausted branches so they are not explored twice.
    #[serde(default = "default_true")]
    pub learn_conflicts: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            progress_rate: default_progress_rate(),
            max_iterations: None,
            allow_missing: Vec::new(),
            prefetch_concurrency: default_prefetch_concurrency(),
            learn_conflicts: true,
        }
    }
}

fn default_progress_rate() -> u64 {
    1000
}

fn default_prefetch_concurrency() -> usize {
    8
}

fn default_true() -> bool {
    true
}

/// How far a re-resolution may move an unlocked package from its lock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateLevel {
    #[default]
    Major,
    Minor,
    Patch,
}

/// Candidate ordering settings from `[policy]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct PolicyConfig {
    #[serde(default)]
    pub level: UpdateLevel,

    /// Rank everything outside `level` by distance from the lock.
    #[serde(default)]
    pub strict: bool,

    /// Prefer the smallest move away from the lock over the newest release.
    #[serde(default)]
    pub conservative: bool,

    /// Names whose pre-releases are not ranked behind releases.
    #[serde(default)]
    pub prerelease: Vec<String>,
}

impl ResolverConfig {
    /// Parse configuration from TOML text.
    pub fn parse_toml(content: &str) -> miette::Result<Self> {
        toml::from_str(content).map_err(|e| {
            DepotError::Config {
                message: format!("Failed to parse resolver config: {e}"),
            }
            .into()
        })
    }

    /// Load configuration from an explicit path.
    pub fn from_path(path: &Path) -> miette::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| DepotError::Config {
            message: format!("Failed to read {}: {e}", path.display()),
        })?;
        Self::parse_toml(&content)
    }

    /// Load `depot.toml` from `dir`, or return defaults if it doesn't exist.
    pub fn load_or_default(dir: &Path) -> miette::Result<Self> {
        let path = Self::default_path(dir);
        if path.is_file() {
            Self::from_path(&path)
        } else {
            tracing::debug!("No {} found, using default resolver config", path.display());
            Ok(Self::default())
        }
    }

    /// Returns the path of the config file inside `dir`.
    pub fn default_path(dir: &Path) -> PathBuf {
        dir.join("depot.toml")
    }
}
