//! Infrastructure module - outbound adapters and process-wide concerns
//!
//! Configuration loading, logging initialization, the retrying HTTP client
//! adapter, request signing and session token acquisition.

pub mod auth;
pub mod config;
pub mod http_client;
pub mod logging;
pub mod signing;

pub use config::{ApiConfig, AppConfig, HttpConfig, LoggingConfig, PipelineConfig};
pub use http_client::{DegradeReason, FetchOutcome, HttpClient};
