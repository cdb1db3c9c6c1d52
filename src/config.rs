//! Configuration loaded from `advisers.toml`.
//!
//! [`AdvisersConfig`] holds every tunable of plan compilation. Keys missing
//! from the file fall back to defaults. `ADVISERS_INTERVAL_POLICY` takes
//! precedence over the file.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::plan::IntervalPolicy;
use crate::rollback::COMBINED_ROLLBACK_ID_SUFFIX;

pub const CONFIG_FILE: &str = "advisers.toml";
pub const INTERVAL_POLICY_ENV: &str = "ADVISERS_INTERVAL_POLICY";

/// Top-level configuration loaded from `advisers.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AdvisersConfig {
    /// Plan-node timeout for steps that declare none.
    #[serde(default = "default_timeout", with = "crate::duration::text")]
    pub default_timeout: Duration,

    /// Wait used once a retry runs past its configured intervals.
    #[serde(default)]
    pub interval_policy: IntervalPolicy,

    /// Appended to a stage id to form its combined rollback id.
    #[serde(default = "default_combined_rollback_suffix")]
    pub combined_rollback_suffix: String,

    /// Reject stages whose policy has no entry made of `AnyOther` alone.
    #[serde(default)]
    pub require_stage_catch_all: bool,
}

// Ten days, the engine's own ceiling for a step.
fn default_timeout() -> Duration {
    Duration::from_secs(10 * 24 * 60 * 60)
}

fn default_combined_rollback_suffix() -> String {
    COMBINED_ROLLBACK_ID_SUFFIX.to_string()
}

impl Default for AdvisersConfig {
    fn default() -> Self {
        Self {
            default_timeout: default_timeout(),
            interval_policy: IntervalPolicy::default(),
            combined_rollback_suffix: default_combined_rollback_suffix(),
            require_stage_catch_all: false,
        }
    }
}

impl AdvisersConfig {
    /// Loads `advisers.toml` from the working directory, or defaults if the
    /// file does not exist.
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new(CONFIG_FILE))
    }

    /// Loads from `path`, falling back to defaults when it does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            toml::from_str::<AdvisersConfig>(&contents)
                .with_context(|| format!("parsing {}", path.display()))?
        } else {
            Self::default()
        };

        config.with_env_override(std::env::var(INTERVAL_POLICY_ENV).ok())
    }

    /// Applies the value of `ADVISERS_INTERVAL_POLICY`. Unset or empty keeps
    /// the configured policy.
    pub fn with_env_override(mut self, interval_policy: Option<String>) -> Result<Self> {
        if let Some(value) = interval_policy
            && !value.is_empty()
        {
            self.interval_policy = value
                .parse()
                .map_err(anyhow::Error::msg)
                .with_context(|| format!("invalid {INTERVAL_POLICY_ENV}"))?;
        }
        Ok(self)
    }
}
