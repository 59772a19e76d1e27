//! Session token acquisition
//!
//! The API hands out a session token from `/start/`; every subsequent call
//! carries it as a signed parameter. Token failures degrade to `None` - the
//! calling stage then degrades to empty the same way it would for any other
//! failed request.

use reqwest::Method;
use serde_json::Value;
use tracing::warn;

use crate::infrastructure::config::ApiConfig;
use crate::infrastructure::http_client::{FetchOutcome, HttpClient};
use crate::infrastructure::signing;

/// Obtains a fresh access token, or `None` if the request failed or the
/// response did not carry one.
pub async fn obtain_token(client: &HttpClient, api: &ApiConfig) -> Option<String> {
    let url = format!("{}/start/", api.base_url);
    let sign = signing::sign(&api.sign_salt, std::iter::empty());

    let outcome = client
        .request_json(Method::GET, &url, &[("sign", Some(sign))], None, None)
        .await;

    match outcome {
        FetchOutcome::Success(value) => {
            let token = value
                .pointer("/data/token")
                .and_then(Value::as_str)
                .map(str::to_string);
            if token.is_none() {
                warn!("Token missing from /start/ response");
            }
            token
        }
        FetchOutcome::Degraded(reason) => {
            warn!("Token request failed: {reason}");
            None
        }
    }
}
