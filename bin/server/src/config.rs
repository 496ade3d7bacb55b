//! Centralized server configuration.
//!
//! Loaded via the `config` crate from environment variables, with `__`
//! separating nested keys (`LLM__MODEL` sets `llm.model`). `main` loads an
//! optional `.env` file into the environment first.

use derek_ai::gemini::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use derek_ai::{GeminiConfig, LlmCallConfig, RetryPolicy};
use derek_conversation::SessionStoreConfig;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

/// Server configuration composed from library configs.
#[derive(Clone, Deserialize)]
pub struct ServerConfig {
    /// API key for the Generative Language API.
    pub google_api_key: String,

    /// Socket address the HTTP server binds to.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Model and call settings.
    #[serde(default)]
    pub llm: LlmSettings,

    /// Retry settings for transient provider failures.
    #[serde(default)]
    pub retry: RetrySettings,

    /// Session lifecycle settings.
    #[serde(default)]
    pub session: SessionSettings,

    /// CORS settings.
    #[serde(default)]
    pub cors: CorsSettings,
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("google_api_key", &"<redacted>")
            .field("bind_address", &self.bind_address)
            .field("llm", &self.llm)
            .field("retry", &self.retry)
            .field("session", &self.session)
            .field("cors", &self.cors)
            .finish()
    }
}

/// LLM-related configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSettings {
    /// Model identifier.
    #[serde(default = "default_model")]
    pub model: String,

    /// Base URL of the Generative Language API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Upper bound on a single provider attempt, in seconds.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Sampling temperature; the provider default when unset.
    #[serde(default)]
    pub temperature: Option<f32>,

    /// Output token cap; the provider default when unset.
    #[serde(default)]
    pub max_output_tokens: Option<u32>,

    /// Log every rendered prompt and reply at `info`.
    #[serde(default)]
    pub verbose: bool,
}

fn default_bind_address() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_timeout_seconds() -> u64 {
    60
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            model: default_model(),
            base_url: default_base_url(),
            timeout_seconds: default_timeout_seconds(),
            temperature: None,
            max_output_tokens: None,
            verbose: false,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySettings {
    /// Attempts per call, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry, in milliseconds.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Cap on any single retry delay, in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Fraction of each delay that is randomized.
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    8_000
}

fn default_jitter_factor() -> f64 {
    0.5
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter_factor: default_jitter_factor(),
        }
    }
}

/// Session-related configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionSettings {
    /// Idle time after which a session expires, in minutes.
    #[serde(default = "default_idle_ttl_minutes")]
    pub idle_ttl_minutes: u64,

    /// Sessions kept before the least recently active one is evicted.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// Interval between session cleanup runs, in seconds.
    #[serde(default = "default_cleanup_interval_seconds")]
    pub cleanup_interval_seconds: u64,
}

fn default_idle_ttl_minutes() -> u64 {
    60
}

fn default_max_sessions() -> usize {
    1000
}

fn default_cleanup_interval_seconds() -> u64 {
    300
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            idle_ttl_minutes: default_idle_ttl_minutes(),
            max_sessions: default_max_sessions(),
            cleanup_interval_seconds: default_cleanup_interval_seconds(),
        }
    }
}

/// CORS configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CorsSettings {
    /// Origins allowed to call the API. Empty allows any origin.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Self::from_environment(environment())
    }

    fn from_environment(source: config::Environment) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(source)
            .build()?
            .try_deserialize()
    }

    /// Retry policy for provider calls.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            initial_delay: Duration::from_millis(self.retry.initial_delay_ms),
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
            jitter_factor: self.retry.jitter_factor,
        }
    }

    /// Settings for each LLM call.
    #[must_use]
    pub fn llm_call_config(&self) -> LlmCallConfig {
        LlmCallConfig {
            temperature: self.llm.temperature,
            max_tokens: self.llm.max_output_tokens,
            timeout: Duration::from_secs(self.llm.timeout_seconds),
            retry: self.retry_policy(),
        }
    }

    /// Connection settings for the Gemini backend.
    #[must_use]
    pub fn gemini_config(&self) -> GeminiConfig {
        GeminiConfig::new(self.google_api_key.clone(), self.llm.model.clone())
            .with_base_url(self.llm.base_url.clone())
    }

    /// Limits for the session store.
    #[must_use]
    pub fn session_store_config(&self) -> SessionStoreConfig {
        SessionStoreConfig {
            idle_ttl: Duration::from_secs(self.session.idle_ttl_minutes.saturating_mul(60)),
            max_sessions: self.session.max_sessions,
        }
    }

    /// Period of the expired-session sweep; never zero.
    #[must_use]
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.session.cleanup_interval_seconds.max(1))
    }
}

fn environment() -> config::Environment {
    config::Environment::default()
        .separator("__")
        .list_separator(",")
        .with_list_parse_key("cors.allowed_origins")
        .ignore_empty(true)
        .try_parsing(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<ServerConfig, config::ConfigError> {
        let vars = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        ServerConfig::from_environment(environment().source(Some(vars)))
    }

    #[test]
    fn defaults_apply_with_only_api_key() {
        let config = load(&[("GOOGLE_API_KEY", "test-key")]).expect("config loads");

        assert_eq!(config.google_api_key, "test-key");
        assert_eq!(config.bind_address, "0.0.0.0:8000");
        assert_eq!(config.llm.model, "gemini-1.5-pro-latest");
        assert_eq!(config.llm.timeout_seconds, 60);
        assert!(!config.llm.verbose);
        assert_eq!(config.retry_policy(), RetryPolicy::default());
        assert_eq!(config.session.max_sessions, 1000);
        assert_eq!(config.cleanup_interval(), Duration::from_secs(300));
        assert!(config.cors.allowed_origins.is_empty());
    }

    #[test]
    fn api_key_is_required() {
        assert!(load(&[("LLM__MODEL", "gemini-2.0-flash")]).is_err());
    }

    #[test]
    fn nested_keys_override_defaults() {
        let config = load(&[
            ("GOOGLE_API_KEY", "test-key"),
            ("BIND_ADDRESS", "127.0.0.1:9000"),
            ("LLM__MODEL", "gemini-2.0-flash"),
            ("LLM__TIMEOUT_SECONDS", "5"),
            ("LLM__TEMPERATURE", "0.2"),
            ("LLM__VERBOSE", "true"),
            ("RETRY__MAX_ATTEMPTS", "5"),
            ("SESSION__IDLE_TTL_MINUTES", "15"),
        ])
        .expect("config loads");

        assert_eq!(config.bind_address, "127.0.0.1:9000");
        assert_eq!(config.llm.model, "gemini-2.0-flash");
        assert_eq!(config.llm.temperature, Some(0.2));
        assert!(config.llm.verbose);

        let call = config.llm_call_config();
        assert_eq!(call.timeout, Duration::from_secs(5));
        assert_eq!(call.retry.max_attempts, 5);
        assert_eq!(
            config.session_store_config().idle_ttl,
            Duration::from_secs(15 * 60)
        );
    }

    #[test]
    fn allowed_origins_are_comma_separated() {
        let config = load(&[
            ("GOOGLE_API_KEY", "test-key"),
            ("CORS__ALLOWED_ORIGINS", "http://localhost:3000,https://chat.example"),
        ])
        .expect("config loads");

        assert_eq!(
            config.cors.allowed_origins,
            vec!["http://localhost:3000", "https://chat.example"]
        );
    }

    #[test]
    fn debug_output_hides_api_key() {
        let config = load(&[("GOOGLE_API_KEY", "super-secret")]).expect("config loads");
        assert!(!format!("{config:?}").contains("super-secret"));
    }

    #[test]
    fn zero_cleanup_interval_is_clamped() {
        let config = load(&[
            ("GOOGLE_API_KEY", "test-key"),
            ("SESSION__CLEANUP_INTERVAL_SECONDS", "0"),
        ])
        .expect("config loads");
        assert_eq!(config.cleanup_interval(), Duration::from_secs(1));
    }
}
