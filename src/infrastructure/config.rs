//! Configuration infrastructure
//!
//! All runtime knobs live in one immutable `AppConfig` value that is loaded
//! once at startup and injected into each component's constructor. Loading
//! layers an optional config file and `FOURPAWS_*` environment variables on
//! top of the compiled-in defaults.

use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, USER_AGENT};
use serde::{Deserialize, Serialize};

use crate::infrastructure::signing;

/// Compiled-in default values, kept together so the retry/batching policy
/// is visible in one place.
pub mod defaults {
    pub const API_BASE_URL: &str = "https://4lapy.ru/api";
    pub const USERNAME: &str = "4lapymobile";
    pub const PASSWORD: &str = "xJ9w1Q3(r";
    pub const SIGN_SALT: &str = "ABCDEF00G";

    pub const RETRIES: u32 = 3;
    pub const RETRY_DELAY_SECS: u64 = 2;
    pub const REQUEST_TIMEOUT_SECS: u64 = 30;

    pub const BATCH_SIZE: usize = 200;
    pub const MAX_CONCURRENT_REQUESTS: usize = 5;
    pub const CHAIN_TIMEOUT_SECS: u64 = 300;
    pub const WORKERS_PER_STAGE: usize = 2;
    pub const QUEUE_CAPACITY: usize = 1024;

    pub const LOG_LEVEL: &str = "info";
}

/// Complete application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub http: HttpConfig,
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig,
}

/// Remote API endpoint, credentials and signing salt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub username: String,
    pub password: String,
    pub sign_salt: String,
}

/// HTTP adapter behavior.
///
/// The retry delay is a fixed interval between attempts, not an exponential
/// backoff - the remote API tolerates quick re-tries and the original
/// operational policy is kept as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Attempt count for transport-level failures. Application-level error
    /// statuses are never retried.
    pub retries: u32,
    pub retry_delay_secs: u64,
    pub request_timeout_secs: u64,
}

/// Pipeline sizing and timeouts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Number of product ids priced in a single outbound request.
    pub batch_size: usize,
    /// Bound on simultaneous in-flight price batch requests.
    pub max_concurrent_requests: usize,
    /// Bounded wait for the whole fetch -> price -> combine chain, and
    /// separately for persistence.
    pub chain_timeout_secs: u64,
    pub workers_per_stage: usize,
    pub queue_capacity: usize,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::API_BASE_URL.to_string(),
            username: defaults::USERNAME.to_string(),
            password: defaults::PASSWORD.to_string(),
            sign_salt: defaults::SIGN_SALT.to_string(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            retries: defaults::RETRIES,
            retry_delay_secs: defaults::RETRY_DELAY_SECS,
            request_timeout_secs: defaults::REQUEST_TIMEOUT_SECS,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: defaults::BATCH_SIZE,
            max_concurrent_requests: defaults::MAX_CONCURRENT_REQUESTS,
            chain_timeout_secs: defaults::CHAIN_TIMEOUT_SECS,
            workers_per_stage: defaults::WORKERS_PER_STAGE,
            queue_capacity: defaults::QUEUE_CAPACITY,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
        }
    }
}

impl AppConfig {
    /// Loads configuration: defaults, then an optional `fourpaws` config
    /// file in the working directory, then `FOURPAWS_*` environment
    /// variables (`FOURPAWS_HTTP__RETRIES=5`).
    pub fn load() -> Result<Self> {
        let settings = ::config::Config::builder()
            .add_source(::config::Config::try_from(&Self::default())?)
            .add_source(::config::File::with_name("fourpaws").required(false))
            .add_source(::config::Environment::with_prefix("FOURPAWS").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        settings
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}

impl ApiConfig {
    /// Shared headers the mobile API expects on every call, including the
    /// basic-auth credential header.
    pub fn default_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();

        let static_headers: &[(&str, &str)] = &[
            ("Version-Build", "3.3.9"),
            ("X-Apps-Screen", "1792x828"),
            ("X-Apps-OS", "18.1"),
            ("X-Apps-Additionally", "404"),
            ("Accept-Language", "en-RU;q=1, ru-RU;q=0.9"),
            ("X-Apps-Build", "3.3.9(1)"),
            ("X-Apps-Location", "lat:0.0,lon:0.0"),
            ("X-Apps-Device", "iPhone12,1"),
        ];
        for (name, value) in static_headers {
            headers.insert(
                name.parse::<HeaderName>().context("Invalid header name")?,
                HeaderValue::from_static(value),
            );
        }

        headers.insert(
            USER_AGENT,
            HeaderValue::from_static("lapy/3.3.9 (iPhone; iOS 18.1; Scale/2.00)"),
        );

        let credential = signing::basic_auth(&self.username, &self.password);
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Basic {credential}"))
                .context("Invalid authorization header")?,
        );

        Ok(headers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_operational_policy() {
        let config = AppConfig::default();
        assert_eq!(config.http.retries, 3);
        assert_eq!(config.http.retry_delay_secs, 2);
        assert_eq!(config.pipeline.batch_size, 200);
        assert_eq!(config.pipeline.max_concurrent_requests, 5);
        assert_eq!(config.pipeline.chain_timeout_secs, 300);
    }

    #[test]
    fn default_headers_carry_basic_auth() {
        let api = ApiConfig::default();
        let headers = api.default_headers().unwrap();
        let auth = headers.get(AUTHORIZATION).unwrap().to_str().unwrap();
        assert!(auth.starts_with("Basic "));
        assert!(headers.contains_key(USER_AGENT));
    }
}
