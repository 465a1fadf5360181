//! Engine configuration, loaded from environment variables.
//!
//! Every option has an explicit default; only the `real` venue
//! implementation makes two of them (gateway URL and signing key)
//! mandatory.

use std::time::Duration;

use rust_decimal::Decimal;
use thiserror::Error;

use crate::executor::ExecutorSettings;
use crate::resilience::{CircuitBreakerConfig, RetryPolicy};

/// Deployment environment tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    /// Local development.
    #[default]
    Development,
    /// Production deployment.
    Production,
}

impl Environment {
    /// Parse an environment tag, defaulting to development.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            _ => Self::Development,
        }
    }

    /// The environment name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
        }
    }
}

/// Which venue adapters to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VenueImplementation {
    /// Deterministic in-process mocks.
    #[default]
    Mock,
    /// HTTP gateway adapters.
    Real,
}

impl VenueImplementation {
    /// Parse an implementation tag, defaulting to mock.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "real" => Self::Real,
            _ => Self::Mock,
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Listen port.
    pub port: u16,
    /// Listen host.
    pub host: String,
    /// Deployment environment.
    pub env: Environment,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: 8080,
            host: "0.0.0.0".to_string(),
            env: Environment::Development,
        }
    }
}

/// Work queue settings.
#[derive(Debug, Clone)]
pub struct QueueSettings {
    /// Jobs processed concurrently per worker process.
    pub concurrency: usize,
    /// Attempts per retryable phase (and per job at the queue level).
    pub max_retries: u32,
    /// Base backoff delay.
    pub backoff_delay: Duration,
    /// Backoff growth factor.
    pub backoff_multiplier: f64,
    /// Backoff ceiling.
    pub backoff_max: Duration,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            concurrency: 10,
            max_retries: 3,
            backoff_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            backoff_max: Duration::from_secs(4),
        }
    }
}

impl QueueSettings {
    /// The retry policy these settings describe.
    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retries,
            base_delay: self.backoff_delay,
            multiplier: self.backoff_multiplier,
            max_delay: self.backoff_max,
        }
    }
}

/// Router settings.
#[derive(Debug, Clone)]
pub struct RouterSettings {
    /// Per-venue quote timeout.
    pub quote_timeout: Duration,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            quote_timeout: Duration::from_secs(5),
        }
    }
}

/// Order cache settings.
#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// Default entry time-to-live.
    pub ttl: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
        }
    }
}

/// Venue selection settings.
#[derive(Clone, Default)]
pub struct VenueSettings {
    /// Which adapters to construct.
    pub implementation: VenueImplementation,
    /// Gateway base URL (required when `implementation` is `Real`).
    pub rpc_url: Option<String>,
    /// Gateway signing key (required when `implementation` is `Real`).
    pub signing_key: Option<String>,
}

impl std::fmt::Debug for VenueSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VenueSettings")
            .field("implementation", &self.implementation)
            .field("rpc_url", &self.rpc_url)
            .field("signing_key", &self.signing_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// HTTP server settings.
    pub server: ServerSettings,
    /// Work queue settings.
    pub queue: QueueSettings,
    /// Router settings.
    pub router: RouterSettings,
    /// Slippage bounds.
    pub executor: ExecutorSettings,
    /// Order cache settings.
    pub cache: CacheSettings,
    /// Venue selection.
    pub venue: VenueSettings,
    /// Circuit breaker parameters (shared by both venue breakers).
    pub breaker: CircuitBreakerConfig,
}

impl EngineConfig {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when the `real` venue implementation is
    /// selected without a gateway URL and signing key, or when a numeric
    /// override fails to parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let server = ServerSettings {
            port: parse_env("SWAP_ENGINE_PORT", defaults.server.port)?,
            host: std::env::var("SWAP_ENGINE_HOST").unwrap_or(defaults.server.host),
            env: std::env::var("SWAP_ENGINE_ENV")
                .map(|s| Environment::from_str_case_insensitive(&s))
                .unwrap_or_default(),
        };

        let queue = QueueSettings {
            concurrency: parse_env("SWAP_ENGINE_QUEUE_CONCURRENCY", defaults.queue.concurrency)?,
            max_retries: parse_env("SWAP_ENGINE_MAX_RETRIES", defaults.queue.max_retries)?,
            backoff_delay: parse_env_duration_millis(
                "SWAP_ENGINE_BACKOFF_DELAY_MS",
                defaults.queue.backoff_delay,
            )?,
            backoff_multiplier: parse_env(
                "SWAP_ENGINE_BACKOFF_MULTIPLIER",
                defaults.queue.backoff_multiplier,
            )?,
            backoff_max: parse_env_duration_millis(
                "SWAP_ENGINE_BACKOFF_MAX_MS",
                defaults.queue.backoff_max,
            )?,
        };

        let router = RouterSettings {
            quote_timeout: parse_env_duration_millis(
                "SWAP_ENGINE_QUOTE_TIMEOUT_MS",
                defaults.router.quote_timeout,
            )?,
        };

        let executor = ExecutorSettings {
            default_slippage: parse_env_decimal(
                "SWAP_ENGINE_DEFAULT_SLIPPAGE",
                defaults.executor.default_slippage,
            )?,
            max_slippage: parse_env_decimal(
                "SWAP_ENGINE_MAX_SLIPPAGE",
                defaults.executor.max_slippage,
            )?,
        };

        let cache = CacheSettings {
            ttl: parse_env_duration_secs("SWAP_ENGINE_CACHE_TTL_SECS", defaults.cache.ttl)?,
        };

        let implementation = std::env::var("SWAP_ENGINE_VENUE_IMPLEMENTATION")
            .map(|s| VenueImplementation::from_str_case_insensitive(&s))
            .unwrap_or_default();

        let venue = VenueSettings {
            implementation,
            rpc_url: std::env::var("SWAP_ENGINE_VENUE_RPC_URL").ok(),
            signing_key: std::env::var("SWAP_ENGINE_VENUE_SIGNING_KEY").ok(),
        };

        if implementation == VenueImplementation::Real {
            if venue.rpc_url.as_deref().is_none_or(str::is_empty) {
                return Err(ConfigError::MissingEnvVar(
                    "SWAP_ENGINE_VENUE_RPC_URL".to_string(),
                ));
            }
            if venue.signing_key.as_deref().is_none_or(str::is_empty) {
                return Err(ConfigError::MissingEnvVar(
                    "SWAP_ENGINE_VENUE_SIGNING_KEY".to_string(),
                ));
            }
        }

        let breaker = CircuitBreakerConfig {
            failure_threshold: parse_env(
                "SWAP_ENGINE_BREAKER_FAILURE_THRESHOLD",
                defaults.breaker.failure_threshold,
            )?,
            reset_timeout: parse_env_duration_secs(
                "SWAP_ENGINE_BREAKER_RESET_TIMEOUT_SECS",
                defaults.breaker.reset_timeout,
            )?,
            monitoring_period: parse_env_duration_secs(
                "SWAP_ENGINE_BREAKER_MONITORING_PERIOD_SECS",
                defaults.breaker.monitoring_period,
            )?,
        };

        Ok(Self {
            server,
            queue,
            router,
            executor,
            cache,
            venue,
            breaker,
        })
    }
}

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is missing or empty.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// An override could not be parsed.
    #[error("environment variable {0} has an invalid value: {1}")]
    InvalidValue(String, String),
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Err(_) => Ok(default),
        Ok(raw) => raw
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string(), raw)),
    }
}

fn parse_env_decimal(key: &str, default: Decimal) -> Result<Decimal, ConfigError> {
    parse_env(key, default)
}

#[allow(clippy::cast_possible_truncation)]
fn parse_env_duration_millis(key: &str, default: Duration) -> Result<Duration, ConfigError> {
    parse_env(key, default.as_millis() as u64).map(Duration::from_millis)
}

fn parse_env_duration_secs(key: &str, default: Duration) -> Result<Duration, ConfigError> {
    parse_env(key, default.as_secs()).map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn defaults_match_the_documented_surface() {
        let config = EngineConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.env, Environment::Development);
        assert_eq!(config.queue.concurrency, 10);
        assert_eq!(config.queue.max_retries, 3);
        assert_eq!(config.queue.backoff_delay, Duration::from_secs(1));
        assert_eq!(config.queue.backoff_max, Duration::from_secs(4));
        assert_eq!(config.router.quote_timeout, Duration::from_secs(5));
        assert_eq!(config.executor.default_slippage, dec!(0.005));
        assert_eq!(config.executor.max_slippage, dec!(0.05));
        assert_eq!(config.cache.ttl, Duration::from_secs(300));
        assert_eq!(config.venue.implementation, VenueImplementation::Mock);
        assert_eq!(config.breaker.failure_threshold, 5);
    }

    #[test]
    fn retry_policy_mirrors_queue_settings() {
        let settings = QueueSettings::default();
        let policy = settings.retry_policy();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay, Duration::from_secs(1));
        assert_eq!(policy.max_delay, Duration::from_secs(4));
    }

    #[test]
    fn environment_parsing() {
        assert_eq!(
            Environment::from_str_case_insensitive("PRODUCTION"),
            Environment::Production
        );
        assert_eq!(
            Environment::from_str_case_insensitive("prod"),
            Environment::Production
        );
        assert_eq!(
            Environment::from_str_case_insensitive("anything"),
            Environment::Development
        );
    }

    #[test]
    fn venue_implementation_parsing() {
        assert_eq!(
            VenueImplementation::from_str_case_insensitive("real"),
            VenueImplementation::Real
        );
        assert_eq!(
            VenueImplementation::from_str_case_insensitive("mock"),
            VenueImplementation::Mock
        );
        assert_eq!(
            VenueImplementation::from_str_case_insensitive(""),
            VenueImplementation::Mock
        );
    }

    #[test]
    fn signing_key_is_redacted_in_debug_output() {
        let settings = VenueSettings {
            implementation: VenueImplementation::Real,
            rpc_url: Some("http://localhost:9000".to_string()),
            signing_key: Some("super-secret".to_string()),
        };

        let debug = format!("{settings:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
