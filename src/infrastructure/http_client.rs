//! HTTP client adapter with bounded retry
//!
//! Issues one outbound request at a time with a fixed-interval retry policy
//! for transport failures. Errors never cross this boundary: every failure
//! mode degrades to an explicit [`FetchOutcome::Degraded`] that callers
//! treat as an empty result, while keeping the reason for diagnostics.
//!
//! Retry applies to transport errors only (connect failures, timeouts). A
//! response with a non-success status is an application-level error and is
//! returned immediately without retrying.

use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::{Client, ClientBuilder, Method};
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, error, info};
use url::Url;

use crate::infrastructure::config::HttpConfig;

/// Why a request degraded instead of succeeding.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DegradeReason {
    #[error("transport failure after {attempts} attempts: {message}")]
    Transport { attempts: u32, message: String },

    #[error("unexpected status {status}")]
    Status { status: u16 },

    #[error("malformed response: {message}")]
    Malformed { message: String },
}

/// Tri-state request outcome: success, or a degraded-to-empty result that
/// still carries its reason.
#[derive(Debug, Clone)]
pub enum FetchOutcome<T> {
    Success(T),
    Degraded(DegradeReason),
}

impl<T> FetchOutcome<T> {
    /// Success value, discarding the degrade reason.
    pub fn ok(self) -> Option<T> {
        match self {
            Self::Success(value) => Some(value),
            Self::Degraded(_) => None,
        }
    }

    #[must_use]
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> FetchOutcome<U> {
        match self {
            Self::Success(value) => FetchOutcome::Success(f(value)),
            Self::Degraded(reason) => FetchOutcome::Degraded(reason),
        }
    }

    pub fn and_then<U>(self, f: impl FnOnce(T) -> FetchOutcome<U>) -> FetchOutcome<U> {
        match self {
            Self::Success(value) => f(value),
            Self::Degraded(reason) => FetchOutcome::Degraded(reason),
        }
    }
}

impl<T: Default> FetchOutcome<T> {
    /// Collapses to the default (empty) value on degradation - the behavior
    /// every stage observes unless it inspects the reason.
    pub fn into_value(self) -> T {
        match self {
            Self::Success(value) => value,
            Self::Degraded(_) => T::default(),
        }
    }
}

/// HTTP client with shared default headers and bounded retry.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    retries: u32,
    retry_delay: Duration,
}

impl HttpClient {
    /// Creates a client carrying the given default headers on every call.
    pub fn new(config: &HttpConfig, default_headers: HeaderMap) -> Result<Self, reqwest::Error> {
        let client = ClientBuilder::new()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .default_headers(default_headers)
            .cookie_store(true)
            .gzip(true)
            .build()?;

        Ok(Self {
            client,
            retries: config.retries.max(1),
            retry_delay: Duration::from_secs(config.retry_delay_secs),
        })
    }

    /// Issues one request and returns the body as JSON.
    ///
    /// Query parameters with a `None` value are stripped before sending.
    /// Extra headers are merged over the client defaults; `form` switches
    /// the body to form-encoding (used by the batch price endpoint).
    pub async fn request_json(
        &self,
        method: Method,
        url: &str,
        params: &[(&str, Option<String>)],
        extra_headers: Option<HeaderMap>,
        form: Option<&[(String, String)]>,
    ) -> FetchOutcome<Value> {
        let url = match Url::parse(url) {
            Ok(url) => url,
            Err(e) => {
                error!("Invalid URL '{url}': {e}");
                return FetchOutcome::Degraded(DegradeReason::Malformed {
                    message: format!("invalid URL: {e}"),
                });
            }
        };

        let params: Vec<(&str, String)> = params
            .iter()
            .filter_map(|(key, value)| value.clone().map(|v| (*key, v)))
            .collect();

        let mut last_error = String::new();
        for attempt in 1..=self.retries {
            let mut request = self.client.request(method.clone(), url.clone()).query(&params);
            if let Some(headers) = &extra_headers {
                request = request.headers(headers.clone());
            }
            if let Some(fields) = form {
                request = request.form(fields);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if !status.is_success() {
                        error!(
                            "Error {}: {}",
                            status.as_u16(),
                            status.canonical_reason().unwrap_or("unknown")
                        );
                        return FetchOutcome::Degraded(DegradeReason::Status {
                            status: status.as_u16(),
                        });
                    }

                    return match response.json::<Value>().await {
                        Ok(value) => {
                            debug!("Fetched {url} on attempt {attempt}");
                            FetchOutcome::Success(value)
                        }
                        Err(e) => {
                            error!("Malformed response body from {url}: {e}");
                            FetchOutcome::Degraded(DegradeReason::Malformed {
                                message: e.to_string(),
                            })
                        }
                    };
                }
                Err(e) => {
                    error!("HTTP error: {e}");
                    last_error = e.to_string();
                    if attempt < self.retries {
                        info!("Retrying... ({attempt}/{})", self.retries);
                        sleep(self.retry_delay).await;
                    }
                }
            }
        }

        error!("Max retries reached. Giving up.");
        FetchOutcome::Degraded(DegradeReason::Transport {
            attempts: self.retries,
            message: last_error,
        })
    }
}
