//! Run configuration: budgets, concurrency, and oracle patience.
//!
//! Values come from explicit construction or from the environment, where the
//! environment is itself layered by the `config` crate (process env over `.env`
//! over the XDG config file). Unparseable values fall back to defaults; only
//! logically impossible budgets are rejected, by [`RunConfig::validate`].

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

const ENV_MAX_DEPTH: &str = "DELVE_MAX_DEPTH";
const ENV_MAX_NODES: &str = "DELVE_MAX_NODES";
const ENV_MAX_SUBTASKS: &str = "DELVE_MAX_SUBTASKS";
const ENV_MAX_REFINEMENTS: &str = "DELVE_MAX_REFINEMENTS";
const ENV_CONCURRENCY: &str = "DELVE_CONCURRENCY";
const ENV_ORACLE_TIMEOUT_SECS: &str = "DELVE_ORACLE_TIMEOUT_SECS";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid run config: {0}")]
    Invalid(String),
    #[error("failed to load config files: {0}")]
    Load(#[from] env_config::LoadError),
}

/// Budgets and knobs for one run. All budgets are hard caps, not goals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Maximum node depth; the root is at depth 0.
    pub max_depth: u32,
    /// Maximum total nodes in the graph, root included.
    pub max_nodes: usize,
    /// Maximum children admitted per decomposition.
    pub max_subtasks: usize,
    /// Maximum refinement iterations after the first full computation.
    pub max_refinements: u32,
    /// Maximum nodes computed concurrently within a layer.
    pub concurrency: usize,
    /// Per-call deadline for oracle calls. `None` waits indefinitely.
    #[serde(default)]
    pub oracle_timeout: Option<Duration>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_depth: 2,
            max_nodes: 10,
            max_subtasks: 3,
            max_refinements: 1,
            concurrency: 4,
            oracle_timeout: None,
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|raw| raw.trim().parse().ok())
}

impl RunConfig {
    /// Reads `DELVE_*` variables from the process environment, keeping the
    /// default for anything absent or unparseable. `DELVE_ORACLE_TIMEOUT_SECS=0`
    /// means no timeout.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let timeout_secs: Option<u64> = env_parse(ENV_ORACLE_TIMEOUT_SECS);
        Self {
            max_depth: env_parse(ENV_MAX_DEPTH).unwrap_or(defaults.max_depth),
            max_nodes: env_parse(ENV_MAX_NODES).unwrap_or(defaults.max_nodes),
            max_subtasks: env_parse(ENV_MAX_SUBTASKS).unwrap_or(defaults.max_subtasks),
            max_refinements: env_parse(ENV_MAX_REFINEMENTS).unwrap_or(defaults.max_refinements),
            concurrency: env_parse(ENV_CONCURRENCY).unwrap_or(defaults.concurrency),
            oracle_timeout: match timeout_secs {
                Some(0) => None,
                Some(secs) => Some(Duration::from_secs(secs)),
                None => defaults.oracle_timeout,
            },
        }
    }

    /// Layers `.env` and the XDG config file into the environment, then reads it.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Like [`RunConfig::load`] with an explicit directory for the `.env` file,
    /// used by tests and tools that run outside the project directory.
    pub fn load_from(env_dir: Option<&Path>) -> Result<Self, ConfigError> {
        env_config::load_and_apply("delve", env_dir)?;
        Ok(Self::from_env())
    }

    /// Rejects budgets under which no run can make progress.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_nodes < 1 {
            return Err(ConfigError::Invalid("max_nodes must be at least 1".into()));
        }
        if self.max_subtasks < 1 {
            return Err(ConfigError::Invalid(
                "max_subtasks must be at least 1".into(),
            ));
        }
        if self.concurrency < 1 {
            return Err(ConfigError::Invalid("concurrency must be at least 1".into()));
        }
        Ok(())
    }
}
