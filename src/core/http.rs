//! Shared HTTP client helpers for web and API fetch strategies.

use std::time::Duration;

use reqwest::{Client, ClientBuilder};

use crate::error::{EngineError, Result};

/// Default timeout for HTTP requests.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Build a configured HTTP client.
pub fn build_client(timeout: Duration) -> Result<Client> {
    ClientBuilder::new()
        .timeout(timeout)
        .user_agent(format!("traymeter/{}", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| EngineError::Network(e.to_string()))
}

/// Build a client with the default timeout.
pub fn default_client() -> Result<Client> {
    build_client(DEFAULT_TIMEOUT)
}

/// GET a URL and deserialize its JSON body.
///
/// A 401/403 status maps to `AuthExpired` so callers can clear stale
/// credentials; other non-success statuses are network errors; a body that
/// fails to deserialize is a payload parse failure.
pub async fn fetch_json<T: serde::de::DeserializeOwned>(
    client: &Client,
    provider: &str,
    url: &str,
    headers: &[(&str, &str)],
) -> Result<T> {
    let mut request = client.get(url);
    for (name, value) in headers {
        request = request.header(*name, *value);
    }

    let response = request.send().await.map_err(|e| {
        if e.is_timeout() {
            EngineError::Timeout {
                provider: provider.to_string(),
                seconds: DEFAULT_TIMEOUT.as_secs(),
            }
        } else {
            EngineError::Network(e.to_string())
        }
    })?;

    let status = response.status();
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(EngineError::AuthExpired {
            provider: provider.to_string(),
        });
    }
    if !status.is_success() {
        return Err(EngineError::Network(format!("HTTP {status} from {url}")));
    }

    let body = response
        .text()
        .await
        .map_err(|e| EngineError::Network(e.to_string()))?;
    serde_json::from_str(&body).map_err(|e| EngineError::ParsePayload {
        provider: provider.to_string(),
        message: format!("{e}: {}", body.chars().take(200).collect::<String>()),
    })
}
