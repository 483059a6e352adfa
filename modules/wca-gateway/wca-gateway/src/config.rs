//! Configuration for the WCA gateway.
//!
//! Layered: built-in defaults, then an optional YAML file, then `WCA_*` environment
//! variables (`__` separates nested keys, e.g. `WCA_RETRY__MAX_ATTEMPTS=5`).

use std::path::Path;
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use humantime_serde::re::humantime::format_duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use wca_gateway_sdk::ResourceClass;

/// Prefix of environment variables read by [`GatewayConfig::load`].
pub const ENV_PREFIX: &str = "WCA_";

/// Longest accepted time-to-live; cache entries never outlive it.
pub const MAX_TTL: Duration = Duration::from_secs(365 * 24 * 3600);

/// Public static mirror of the WCA results export.
pub const DEFAULT_BASE_URL: &str =
    "https://raw.githubusercontent.com/robiningelbrecht/wca-rest-api/master/api";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(Box<figment::Error>),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl From<figment::Error> for ConfigError {
    fn from(e: figment::Error) -> Self {
        Self::Load(Box::new(e))
    }
}

/// Gateway configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GatewayConfig {
    /// Upstream base location; resource paths are appended to it.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Timeout of a single upstream attempt.
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Permit `http://` base URLs. Only meant for local test servers.
    pub allow_insecure_http: bool,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Upstream bodies larger than this are rejected.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    pub retry: RetryConfig,
    pub cache: CacheConfig,
    pub ttl: TtlConfig,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_owned()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_user_agent() -> String {
    format!("wca-gateway/{}", env!("CARGO_PKG_VERSION"))
}

fn default_max_body_bytes() -> usize {
    64 * 1024 * 1024
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout: default_request_timeout(),
            allow_insecure_http: false,
            user_agent: default_user_agent(),
            max_body_bytes: default_max_body_bytes(),
            retry: RetryConfig::default(),
            cache: CacheConfig::default(),
            ttl: TtlConfig::default(),
        }
    }
}

/// Retry and backoff settings of the fetch client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    /// Total attempts, including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry; doubled on every further retry.
    #[serde(default = "default_base_delay", with = "humantime_serde")]
    pub base_delay: Duration,

    #[serde(default = "default_max_delay", with = "humantime_serde")]
    pub max_delay: Duration,

    /// Symmetric jitter fraction applied to every delay (`0.2` = +/-20%).
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_jitter() -> f64 {
    0.2
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay: default_base_delay(),
            max_delay: default_max_delay(),
            jitter: default_jitter(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// Maximum number of shaped entries kept; least recently used go first.
    #[serde(default = "default_capacity")]
    pub capacity: u64,

    /// When set, `NotFound` and `UpstreamUnavailable` outcomes are remembered this long.
    #[serde(
        default,
        with = "humantime_serde::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub negative_ttl: Option<Duration>,
}

fn default_capacity() -> u64 {
    1000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            negative_ttl: None,
        }
    }
}

/// Time-to-live per resource class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TtlConfig {
    #[serde(default = "default_reference_ttl", with = "humantime_serde")]
    pub reference: Duration,
    #[serde(default = "default_hourly_ttl", with = "humantime_serde")]
    pub competition_detail: Duration,
    #[serde(default = "default_hourly_ttl", with = "humantime_serde")]
    pub competition_results: Duration,
    #[serde(default = "default_hourly_ttl", with = "humantime_serde")]
    pub person_profile: Duration,
    #[serde(default = "default_hourly_ttl", with = "humantime_serde")]
    pub ranking: Duration,
    #[serde(default = "default_championship_ttl", with = "humantime_serde")]
    pub championship: Duration,
}

fn default_reference_ttl() -> Duration {
    Duration::from_secs(24 * 3600)
}

fn default_hourly_ttl() -> Duration {
    Duration::from_secs(3600)
}

fn default_championship_ttl() -> Duration {
    Duration::from_secs(6 * 3600)
}

impl Default for TtlConfig {
    fn default() -> Self {
        Self {
            reference: default_reference_ttl(),
            competition_detail: default_hourly_ttl(),
            competition_results: default_hourly_ttl(),
            person_profile: default_hourly_ttl(),
            ranking: default_hourly_ttl(),
            championship: default_championship_ttl(),
        }
    }
}

impl TtlConfig {
    /// Every TTL with its config key.
    #[must_use]
    pub fn named(&self) -> [(&'static str, Duration); 6] {
        [
            ("reference", self.reference),
            ("competition_detail", self.competition_detail),
            ("competition_results", self.competition_results),
            ("person_profile", self.person_profile),
            ("ranking", self.ranking),
            ("championship", self.championship),
        ]
    }

    #[must_use]
    pub fn for_class(&self, class: ResourceClass) -> Duration {
        match class {
            ResourceClass::Reference => self.reference,
            ResourceClass::CompetitionDetail => self.competition_detail,
            ResourceClass::CompetitionResults => self.competition_results,
            ResourceClass::PersonProfile => self.person_profile,
            ResourceClass::Ranking => self.ranking,
            ResourceClass::Championship => self.championship,
        }
    }
}

impl GatewayConfig {
    /// Load defaults, then `path` (YAML) when given, then `WCA_*` environment variables.
    ///
    /// # Errors
    /// Returns [`ConfigError`] if a source cannot be parsed or the result is invalid.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        let config: Self = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] describing the first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let uri: http::Uri = self
            .base_url
            .parse()
            .map_err(|e| ConfigError::Invalid(format!("base_url '{}': {e}", self.base_url)))?;
        match uri.scheme_str() {
            Some("https") => {}
            Some("http") if self.allow_insecure_http => {}
            Some("http") => {
                return Err(ConfigError::Invalid(
                    "base_url uses http:// but allow_insecure_http is false".to_owned(),
                ));
            }
            _ => {
                return Err(ConfigError::Invalid(format!(
                    "base_url '{}' must be an absolute https:// URL",
                    self.base_url
                )));
            }
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "request_timeout must be positive".to_owned(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_attempts must be at least 1".to_owned(),
            ));
        }
        if !(0.0..1.0).contains(&self.retry.jitter) {
            return Err(ConfigError::Invalid(format!(
                "retry.jitter must be within [0, 1), got {}",
                self.retry.jitter
            )));
        }
        if self.cache.capacity == 0 {
            return Err(ConfigError::Invalid(
                "cache.capacity must be at least 1".to_owned(),
            ));
        }
        for (key, ttl) in self.ttl.named() {
            check_ttl("ttl.", key, ttl)?;
        }
        if let Some(ttl) = self.cache.negative_ttl {
            check_ttl("cache.", "negative_ttl", ttl)?;
        }
        Ok(())
    }
}

fn check_ttl(section: &str, key: &str, ttl: Duration) -> Result<(), ConfigError> {
    if ttl > MAX_TTL {
        return Err(ConfigError::Invalid(format!(
            "{section}{key} must not exceed {}, got {}",
            format_duration(MAX_TTL),
            format_duration(ttl)
        )));
    }
    Ok(())
}
