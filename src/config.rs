use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::budget::{TokenBudget, MAX_RESPONSE_TOKENS};
use crate::graph::paths::{DEFAULT_MAX_DEPTH, DEFAULT_MAX_PATHS};
use crate::graph::subgraph::{DEFAULT_MAX_HOP, DEFAULT_PAIRWISE_MAX_PATHS};
use crate::graph::traverse::DEFAULT_DEPTH;
use crate::graph::MissingIdPolicy;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "GRAPHNAV_CONFIG";
/// Overrides `graphnav.db_path` when set (typically from `.env`).
pub const DB_PATH_ENV: &str = "GRAPHNAV_DB_PATH";

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub graphnav: GraphnavConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub subgraph: SubgraphConfig,
    #[serde(default)]
    pub budget: BudgetConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GraphnavConfig {
    pub db_path: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Tool-layer defaults and hard caps for the bounded operations
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub default_max_depth: usize,
    pub default_max_paths: usize,
    pub default_max_hop: usize,
    pub default_traverse_depth: usize,
    pub max_path_depth: usize,
    pub max_hop: usize,
    pub max_traverse_depth: usize,
    pub pairwise_max_paths: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            default_max_depth: DEFAULT_MAX_DEPTH,
            default_max_paths: DEFAULT_MAX_PATHS,
            default_max_hop: DEFAULT_MAX_HOP,
            default_traverse_depth: DEFAULT_DEPTH,
            max_path_depth: 10,
            max_hop: 5,
            max_traverse_depth: 5,
            pairwise_max_paths: DEFAULT_PAIRWISE_MAX_PATHS,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SubgraphConfig {
    pub missing_ids: MissingIdPolicy,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    pub max_response_tokens: usize,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_response_tokens: MAX_RESPONSE_TOKENS,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            graphnav: GraphnavConfig {
                db_path: PathBuf::from("graphnav.db"),
                log_level: default_log_level(),
            },
            limits: LimitsConfig::default(),
            subgraph: SubgraphConfig::default(),
            budget: BudgetConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file
    ///
    /// Reads `.env` first (optional), then the file named by `GRAPHNAV_CONFIG`,
    /// falling back to `./config.toml`. `GRAPHNAV_DB_PATH` overrides the
    /// database location.
    pub fn load() -> Result<Self> {
        let _ = dotenv::dotenv();

        let config_path = std::env::var(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.toml"));

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config = Self::from_toml_str(&config_str)
            .with_context(|| format!("Invalid config file: {}", config_path.display()))?;

        if let Ok(db_path) = std::env::var(DB_PATH_ENV) {
            log::debug!("{} overrides db_path with {}", DB_PATH_ENV, db_path);
            config.graphnav.db_path = PathBuf::from(db_path);
        }

        Ok(config)
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s).context("Failed to parse config TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        const LEVELS: [&str; 6] = ["off", "error", "warn", "info", "debug", "trace"];
        if !LEVELS.contains(&self.graphnav.log_level.to_lowercase().as_str()) {
            anyhow::bail!(
                "graphnav.log_level must be one of {}, got {:?}",
                LEVELS.join(", "),
                self.graphnav.log_level
            );
        }

        let l = &self.limits;
        if l.max_path_depth == 0 {
            anyhow::bail!("limits.max_path_depth must be greater than 0");
        }
        if l.default_max_depth == 0 || l.default_max_depth > l.max_path_depth {
            anyhow::bail!(
                "limits.default_max_depth must be between 1 and max_path_depth ({})",
                l.max_path_depth
            );
        }
        if l.default_max_paths == 0 {
            anyhow::bail!("limits.default_max_paths must be greater than 0");
        }
        if l.pairwise_max_paths == 0 {
            anyhow::bail!("limits.pairwise_max_paths must be greater than 0");
        }
        if l.default_max_hop > l.max_hop {
            anyhow::bail!("limits.default_max_hop must not exceed max_hop ({})", l.max_hop);
        }
        if l.default_traverse_depth > l.max_traverse_depth {
            anyhow::bail!(
                "limits.default_traverse_depth must not exceed max_traverse_depth ({})",
                l.max_traverse_depth
            );
        }

        if self.budget.max_response_tokens == 0 {
            anyhow::bail!("budget.max_response_tokens must be greater than 0");
        }

        Ok(())
    }

    pub fn db_path(&self) -> &Path {
        &self.graphnav.db_path
    }

    pub fn token_budget(&self) -> TokenBudget {
        TokenBudget::new(self.budget.max_response_tokens)
    }
}
