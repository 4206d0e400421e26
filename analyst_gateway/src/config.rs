//! Gateway configuration
//!
//! All thresholds are read from the environment (after `.env` is loaded by the
//! binaries) and fall back to conservative defaults.

use crate::error::GatewayError;
use crate::Result;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Security and session settings consumed by the orchestrator
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Reject SUSPICIOUS input instead of warning
    pub strict_mode: bool,
    /// Warnings after which a session is blocked
    pub max_warnings: u32,
    pub rate_limit: RateLimitConfig,
    /// Soft limit on input length; four times this is treated as malicious
    pub max_input_chars: usize,
    /// Bound on every collaborator call
    pub upstream_timeout: Duration,
    /// Idle sessions older than this are evicted. `None` keeps them forever.
    pub session_idle_ttl: Option<Duration>,
    /// Turns kept per session for display and LLM context
    pub transcript_limit: usize,
    pub extra_blocked_phrases: Vec<String>,
    pub extra_suspicious_phrases: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub window: Duration,
    pub max_requests: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(60),
            max_requests: 10,
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            strict_mode: false,
            max_warnings: 3,
            rate_limit: RateLimitConfig::default(),
            max_input_chars: 2000,
            upstream_timeout: Duration::from_secs(30),
            session_idle_ttl: None,
            transcript_limit: 20,
            extra_blocked_phrases: Vec::new(),
            extra_suspicious_phrases: Vec::new(),
        }
    }
}

impl GatewayConfig {
    /// Build the configuration from `GATEWAY_*` environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let config = Self {
            strict_mode: parse_var("GATEWAY_STRICT_MODE", defaults.strict_mode)?,
            max_warnings: parse_var("GATEWAY_MAX_WARNINGS", defaults.max_warnings)?,
            rate_limit: RateLimitConfig {
                window: Duration::from_secs(parse_var(
                    "GATEWAY_RATE_LIMIT_WINDOW_SECS",
                    defaults.rate_limit.window.as_secs(),
                )?),
                max_requests: parse_var(
                    "GATEWAY_RATE_LIMIT_MAX_REQUESTS",
                    defaults.rate_limit.max_requests,
                )?,
            },
            max_input_chars: parse_var("GATEWAY_MAX_INPUT_CHARS", defaults.max_input_chars)?,
            upstream_timeout: Duration::from_secs(parse_var(
                "GATEWAY_UPSTREAM_TIMEOUT_SECS",
                defaults.upstream_timeout.as_secs(),
            )?),
            session_idle_ttl: parse_optional_var::<u64>("GATEWAY_SESSION_IDLE_TTL_SECS")?
                .map(Duration::from_secs),
            transcript_limit: parse_var("GATEWAY_TRANSCRIPT_LIMIT", defaults.transcript_limit)?,
            extra_blocked_phrases: list_var("GATEWAY_EXTRA_BLOCKED_PHRASES"),
            extra_suspicious_phrases: list_var("GATEWAY_EXTRA_SUSPICIOUS_PHRASES"),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_warnings == 0 {
            return Err(GatewayError::Config(
                "GATEWAY_MAX_WARNINGS must be at least 1".to_string(),
            ));
        }
        if self.rate_limit.max_requests == 0 {
            return Err(GatewayError::Config(
                "GATEWAY_RATE_LIMIT_MAX_REQUESTS must be at least 1".to_string(),
            ));
        }
        if self.rate_limit.window.is_zero() {
            return Err(GatewayError::Config(
                "GATEWAY_RATE_LIMIT_WINDOW_SECS must be at least 1".to_string(),
            ));
        }
        if self.upstream_timeout.is_zero() {
            return Err(GatewayError::Config(
                "GATEWAY_UPSTREAM_TIMEOUT_SECS must be at least 1".to_string(),
            ));
        }
        if self.max_input_chars == 0 {
            return Err(GatewayError::Config(
                "GATEWAY_MAX_INPUT_CHARS must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Settings for the collaborators wired up by the binaries
#[derive(Debug, Clone, Default)]
pub struct ServiceConfig {
    pub port: u16,
    pub gemini_api_key: Option<String>,
    pub finnhub_api_key: Option<String>,
    pub database_url: Option<String>,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self> {
        let port = match env::var("PORT").or_else(|_| env::var("API_PORT")) {
            Ok(raw) => raw
                .trim()
                .parse()
                .map_err(|e| GatewayError::Config(format!("PORT={}: {}", raw, e)))?,
            Err(_) => 8080,
        };

        Ok(Self {
            port,
            gemini_api_key: secret_var("GEMINI_API_KEY"),
            finnhub_api_key: secret_var("FINNHUB_API_KEY"),
            database_url: env::var("DATABASE_URL")
                .or_else(|_| env::var("POSTGRES_URL"))
                .ok()
                .filter(|v| !v.trim().is_empty()),
        })
    }
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    Ok(parse_optional_var(name)?.unwrap_or(default))
}

fn parse_optional_var<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| GatewayError::Config(format!("{}={}: {}", name, raw, e))),
        _ => Ok(None),
    }
}

fn list_var(name: &str) -> Vec<String> {
    env::var(name)
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Treats placeholder values copied from `.env.example` as unset.
fn secret_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && !v.starts_with("your_"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = GatewayConfig::default();
        assert!(config.validate().is_ok());
        assert!(!config.strict_mode);
        assert_eq!(config.rate_limit.max_requests, 10);
        assert!(config.session_idle_ttl.is_none());
    }

    #[test]
    fn test_zero_thresholds_rejected() {
        let mut config = GatewayConfig::default();
        config.max_warnings = 0;
        assert!(config.validate().is_err());

        let mut config = GatewayConfig::default();
        config.rate_limit.window = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = GatewayConfig::default();
        config.rate_limit.max_requests = 0;
        assert!(matches!(config.validate(), Err(GatewayError::Config(_))));

        let mut config = GatewayConfig::default();
        config.upstream_timeout = Duration::ZERO;
        assert!(matches!(config.validate(), Err(GatewayError::Config(_))));
    }

    #[test]
    fn test_env_overrides_and_lists() {
        env::set_var("GATEWAY_TEST_LIST", " foo , ,bar baz,");
        assert_eq!(list_var("GATEWAY_TEST_LIST"), vec!["foo", "bar baz"]);

        env::set_var("GATEWAY_TEST_NUMBER", "42");
        assert_eq!(parse_var::<u32>("GATEWAY_TEST_NUMBER", 7).unwrap(), 42);
        assert_eq!(parse_var::<u32>("GATEWAY_TEST_MISSING", 7).unwrap(), 7);

        env::set_var("GATEWAY_TEST_BAD", "many");
        assert!(parse_var::<u32>("GATEWAY_TEST_BAD", 7).is_err());
    }

    #[test]
    fn test_placeholder_secret_ignored() {
        env::set_var("GATEWAY_TEST_SECRET", "your_gemini_api_key_here");
        assert!(secret_var("GATEWAY_TEST_SECRET").is_none());
        env::set_var("GATEWAY_TEST_SECRET", "abc");
        assert_eq!(secret_var("GATEWAY_TEST_SECRET").as_deref(), Some("abc"));
    }
}
