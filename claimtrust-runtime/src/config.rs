//! Engine configuration
//!
//! Loaded from TOML; every section and field has a default, so an empty
//! file is a valid configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use claimtrust_core::{domain_weight, BadgePolicy};
use claimtrust_crosscheck::citation::DEFAULT_MAX_CITATIONS;
use claimtrust_crosscheck::{RunnerConfig, TimeoutPolicy};
use claimtrust_net::HttpConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// `[http]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    pub user_agent: String,
    /// Falls back to `$GITHUB_TOKEN`
    pub github_token: Option<String>,
}

impl Default for HttpSettings {
    fn default() -> Self {
        let defaults = HttpConfig::default();
        Self {
            timeout_secs: defaults.timeout_secs,
            user_agent: defaults.user_agent,
            github_token: None,
        }
    }
}

impl HttpSettings {
    pub fn to_http_config(&self) -> HttpConfig {
        let defaults = HttpConfig::default();
        HttpConfig {
            timeout_secs: self.timeout_secs,
            user_agent: self.user_agent.clone(),
            github_token: self.github_token.clone().or(defaults.github_token),
        }
    }
}

/// `[cross_cutting]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrossCuttingSettings {
    /// Run the cross-cutting checks at all
    pub enabled: bool,
    /// Global deadline for the whole batch
    pub timeout_secs: u64,
    pub timeout_policy: TimeoutPolicy,
    pub max_citations: usize,
}

impl Default for CrossCuttingSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_secs: 120,
            timeout_policy: TimeoutPolicy::DiscardAll,
            max_citations: DEFAULT_MAX_CITATIONS,
        }
    }
}

impl CrossCuttingSettings {
    pub fn to_runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            timeout: Duration::from_secs(self.timeout_secs),
            policy: self.timeout_policy,
        }
    }
}

/// Complete engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub http: HttpSettings,
    pub cross_cutting: CrossCuttingSettings,
    pub badges: BadgePolicy,
    /// Per-domain overrides of the domain trust weight
    pub domain_weights: BTreeMap<String, f64>,
}

impl EngineConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    /// Trust weight of the domain score in the final merge
    pub fn domain_weight(&self, domain: &str) -> f64 {
        self.domain_weights
            .get(domain)
            .copied()
            .unwrap_or_else(|| domain_weight(domain))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (domain, weight) in &self.domain_weights {
            if !(0.0..=1.0).contains(weight) {
                return Err(ConfigError::Invalid(format!(
                    "domain weight for {} must be in [0, 1], got {}",
                    domain, weight
                )));
            }
        }
        let badges = &self.badges;
        if !(0.0..=1.0).contains(&badges.green) || !(0.0..=1.0).contains(&badges.amber) {
            return Err(ConfigError::Invalid("badge thresholds must be in [0, 1]".to_string()));
        }
        if badges.amber > badges.green {
            return Err(ConfigError::Invalid(format!(
                "amber threshold {} exceeds green threshold {}",
                badges.amber, badges.green
            )));
        }
        if self.cross_cutting.timeout_secs == 0 {
            return Err(ConfigError::Invalid("cross_cutting.timeout_secs must be positive".to_string()));
        }
        if self.http.timeout_secs == 0 {
            return Err(ConfigError::Invalid("http.timeout_secs must be positive".to_string()));
        }
        Ok(())
    }
}
