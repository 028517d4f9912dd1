//! Deployment configuration.
//!
//! `LimitforgeConfig` can be deserialized from any serde format or read from
//! `LIMITFORGE_*` environment variables:
//!
//! | Variable | Field | Default |
//! |---|---|---|
//! | `LIMITFORGE_BASE_URL` | `base_url` | required |
//! | `LIMITFORGE_API_KEY` | `api_key` | required |
//! | `LIMITFORGE_TIMEOUT_MS` | `timeout_ms` | `1000` |
//! | `LIMITFORGE_COST` | `cost` | `1` |
//! | `LIMITFORGE_DENY_ON_FAILURE` | `deny_on_failure` | `true` |

use crate::client::DecisionClient;
use crate::error::ConfigError;
use crate::middleware::EnforcementLayer;
use crate::policy::FailurePolicy;
use serde::Deserialize;
use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;
use std::time::Duration;

pub const ENV_BASE_URL: &str = "LIMITFORGE_BASE_URL";
pub const ENV_API_KEY: &str = "LIMITFORGE_API_KEY";
pub const ENV_TIMEOUT_MS: &str = "LIMITFORGE_TIMEOUT_MS";
pub const ENV_COST: &str = "LIMITFORGE_COST";
pub const ENV_DENY_ON_FAILURE: &str = "LIMITFORGE_DENY_ON_FAILURE";

fn default_timeout_ms() -> u64 {
    1_000
}

fn default_cost() -> u32 {
    1
}

fn default_deny_on_failure() -> bool {
    true
}

#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LimitforgeConfig {
    pub base_url: String,
    pub api_key: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_cost")]
    pub cost: u32,
    #[serde(default = "default_deny_on_failure")]
    pub deny_on_failure: bool,
}

impl fmt::Debug for LimitforgeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LimitforgeConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("timeout_ms", &self.timeout_ms)
            .field("cost", &self.cost)
            .field("deny_on_failure", &self.deny_on_failure)
            .finish()
    }
}

impl LimitforgeConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            timeout_ms: default_timeout_ms(),
            cost: default_cost(),
            deny_on_failure: default_deny_on_failure(),
        }
    }

    /// Read from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = lookup(ENV_BASE_URL).ok_or(ConfigError::Missing(ENV_BASE_URL))?;
        let api_key = lookup(ENV_API_KEY).ok_or(ConfigError::Missing(ENV_API_KEY))?;
        let mut config = Self::new(base_url, api_key);
        if let Some(raw) = lookup(ENV_TIMEOUT_MS) {
            config.timeout_ms = parse(ENV_TIMEOUT_MS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_COST) {
            config.cost = parse(ENV_COST, &raw)?;
        }
        if let Some(raw) = lookup(ENV_DENY_ON_FAILURE) {
            config.deny_on_failure = parse_bool(ENV_DENY_ON_FAILURE, &raw)?;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_ms == 0 {
            return Err(ConfigError::Invalid { key: "timeout_ms", reason: "must be > 0".into() });
        }
        if self.cost == 0 {
            return Err(ConfigError::Invalid { key: "cost", reason: "must be >= 1".into() });
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        FailurePolicy::from_deny_on_failure(self.deny_on_failure)
    }

    /// Build the decision client.
    pub fn client(&self) -> Result<DecisionClient, ConfigError> {
        self.validate()?;
        DecisionClient::builder()
            .base_url(self.base_url.clone())
            .api_key(self.api_key.clone())
            .timeout(self.timeout())
            .build()
    }

    /// Build the enforcement layer with the default header mapper.
    pub fn layer(&self) -> Result<EnforcementLayer<DecisionClient>, ConfigError> {
        let client = self.client()?;
        let cost = NonZeroU32::new(self.cost)
            .ok_or(ConfigError::Invalid { key: "cost", reason: "must be >= 1".into() })?;
        Ok(EnforcementLayer::new(client).with_cost(cost).with_failure_policy(self.failure_policy()))
    }
}

fn parse<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid { key, reason: e.to_string() })
}

fn parse_bool(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::Invalid { key, reason: format!("expected a boolean, got `{other}`") }),
    }
}
