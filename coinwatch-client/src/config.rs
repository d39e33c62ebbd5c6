//! Client configuration.
//!
//! The backend origin comes from [`BASE_URL_ENV`] or from a YAML document.
//! Everything else has defaults matching the production backend.
//!
//! ```yaml
//! base_url: https://api.coinwatch.app
//! timeout: 10s
//! breaker:
//!   max_consecutive_failures: 3
//!   reset_after: 30s
//! endpoints:
//!   refresh: /api/users/refresh/
//! ```

use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Environment variable selecting the backend origin.
pub const BASE_URL_ENV: &str = "NEXT_PUBLIC_API_BASE_URL";

const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Top-level client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Backend origin, e.g. `https://api.coinwatch.app`.
    pub base_url: String,
    /// Per-request timeout. No timeout when unset.
    #[serde(with = "humantime_serde")]
    pub timeout: Option<Duration>,
    /// Circuit breaker thresholds.
    pub breaker: BreakerConfig,
    /// Upstream paths, relative to `base_url`.
    pub endpoints: Endpoints,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            base_url: DEFAULT_BASE_URL.to_owned(),
            timeout: None,
            breaker: BreakerConfig::default(),
            endpoints: Endpoints::default(),
        }
    }
}

impl ClientConfig {
    /// Default configuration pointed at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        ClientConfig {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Reads the backend origin from [`BASE_URL_ENV`].
    pub fn from_env() -> Result<Self, ConfigError> {
        let base_url = std::env::var(BASE_URL_ENV)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .ok_or(ConfigError::MissingEnv(BASE_URL_ENV))?;
        let config = Self::new(base_url.trim());
        config.validate()?;
        Ok(config)
    }

    /// Parses a YAML document. Missing fields take their defaults.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: ClientConfig =
            serde_saphyr::from_str(yaml).map_err(|error| ConfigError::Parse(error.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Resolves `path` against the base URL.
    ///
    /// Paths are appended to the base as-is, so a base with a path prefix
    /// (`https://host/backend`) keeps it.
    pub fn url(&self, path: &str) -> Result<Url, ConfigError> {
        let raw = format!("{}{}", self.base_url.trim_end_matches('/'), path);
        Url::parse(&raw).map_err(|error| ConfigError::InvalidUrl {
            url: raw,
            reason: error.to_string(),
        })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.breaker.max_consecutive_failures == 0 {
            return Err(ConfigError::Invalid(
                "breaker.max_consecutive_failures must be at least 1".to_owned(),
            ));
        }
        self.url("/").map(drop)
    }
}

/// Circuit breaker thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Failures in a row after which requests short-circuit.
    pub max_consecutive_failures: u32,
    /// Quiet period after the last failure before the counter resets.
    #[serde(with = "humantime_serde")]
    pub reset_after: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        BreakerConfig {
            max_consecutive_failures: 3,
            reset_after: Duration::from_secs(30),
        }
    }
}

/// Upstream API paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub login: String,
    pub register: String,
    pub verify_email: String,
    /// Token refresh. Some deployments expose it as `/api/users/refresh/`.
    pub refresh: String,
    pub logout: String,
    pub profile: String,
    pub csrf: String,
    pub premium_upgrade: String,
    pub latest_prices: String,
    pub price_history: String,
    pub ai_ask: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Endpoints {
            login: "/api/users/login/".to_owned(),
            register: "/api/users/register/".to_owned(),
            verify_email: "/api/users/auth/verify-email/".to_owned(),
            refresh: "/api/users/token/refresh/".to_owned(),
            logout: "/api/users/logout/".to_owned(),
            profile: "/api/users/profile/".to_owned(),
            csrf: "/api/users/csrf/".to_owned(),
            premium_upgrade: "/api/users/premium/upgrade/".to_owned(),
            latest_prices: "/api/crypto/prices/latest/".to_owned(),
            price_history: "/api/crypto/prices/history/".to_owned(),
            ai_ask: "/api/crypto/ai/ask/".to_owned(),
        }
    }
}

/// [`Endpoints`] resolved against the base URL once, at client build time.
#[derive(Debug, Clone)]
pub(crate) struct Routes {
    pub login: Url,
    pub register: Url,
    pub verify_email: Url,
    pub refresh: Url,
    pub logout: Url,
    pub profile: Url,
    pub csrf: Url,
    pub premium_upgrade: Url,
    pub latest_prices: Url,
    pub price_history: Url,
    pub ai_ask: Url,
}

impl Routes {
    pub(crate) fn resolve(config: &ClientConfig) -> Result<Self, ConfigError> {
        let e = &config.endpoints;
        Ok(Routes {
            login: config.url(&e.login)?,
            register: config.url(&e.register)?,
            verify_email: config.url(&e.verify_email)?,
            refresh: config.url(&e.refresh)?,
            logout: config.url(&e.logout)?,
            profile: config.url(&e.profile)?,
            csrf: config.url(&e.csrf)?,
            premium_upgrade: config.url(&e.premium_upgrade)?,
            latest_prices: config.url(&e.latest_prices)?,
            price_history: config.url(&e.price_history)?,
            ai_ask: config.url(&e.ai_ask)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaml_overrides_and_defaults() {
        let yaml = r#"
base_url: https://api.example.com/
timeout: 5s
breaker:
  reset_after: 1m
endpoints:
  refresh: /api/users/refresh/
"#;
        let config = ClientConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.timeout, Some(Duration::from_secs(5)));
        assert_eq!(config.breaker.max_consecutive_failures, 3);
        assert_eq!(config.breaker.reset_after, Duration::from_secs(60));
        assert_eq!(config.endpoints.refresh, "/api/users/refresh/");
        assert_eq!(config.endpoints.login, "/api/users/login/");
        assert_eq!(
            config.url("/api/users/profile/").unwrap().as_str(),
            "https://api.example.com/api/users/profile/"
        );
    }

    #[test]
    fn base_path_prefix_is_kept() {
        let config = ClientConfig::new("https://host.example/backend");
        assert_eq!(
            config.url("/api/users/csrf/").unwrap().path(),
            "/backend/api/users/csrf/"
        );
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let error = ClientConfig::from_yaml("base_url: not a url").unwrap_err();
        assert!(matches!(error, ConfigError::InvalidUrl { .. }));
    }

    #[test]
    fn zero_failure_threshold_is_rejected() {
        let yaml = "breaker:\n  max_consecutive_failures: 0\n";
        assert!(matches!(
            ClientConfig::from_yaml(yaml),
            Err(ConfigError::Invalid(_))
        ));
    }
}
