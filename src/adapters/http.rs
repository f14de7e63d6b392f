//! Shared HTTP plumbing for provider adapters.
//!
//! One `reqwest::Client` is built from the config and cloned into each
//! adapter (clones share the connection pool). Requests are attempted once.

use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::core::config::Config;
use crate::ports::{ProviderError, ProviderResult};

/// Build the outbound client used by all providers
pub fn build_client(config: &Config) -> ProviderResult<Client> {
    Client::builder()
        .timeout(config.http_timeout)
        .user_agent(config.user_agent.clone())
        .build()
        .map_err(|e| ProviderError::Connection {
            provider: "http",
            message: format!("cannot build HTTP client: {e}"),
        })
}

/// A provider response relayed verbatim
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

/// GET `url` with `params`, relaying whatever status the provider returns
pub async fn forward(
    client: &Client,
    provider: &'static str,
    url: &str,
    params: &[(&str, String)],
) -> ProviderResult<UpstreamResponse> {
    debug!(provider, url, "forwarding request");

    let response = client
        .get(url)
        .query(params)
        .send()
        .await
        .map_err(|e| ProviderError::from_reqwest(provider, e))?;

    let status = response.status().as_u16();
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    let body = response
        .bytes()
        .await
        .map_err(|e| ProviderError::from_reqwest(provider, e))?
        .to_vec();

    Ok(UpstreamResponse {
        status,
        content_type,
        body,
    })
}

/// GET `url` with `params` and decode a JSON body, failing on non-success status
pub async fn get_json<T: DeserializeOwned>(
    client: &Client,
    provider: &'static str,
    url: &str,
    params: &[(&str, String)],
) -> ProviderResult<T> {
    let response = client
        .get(url)
        .query(params)
        .send()
        .await
        .map_err(|e| ProviderError::from_reqwest(provider, e))?;

    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        return Err(ProviderError::Status {
            provider,
            status,
            body,
        });
    }

    response.json().await.map_err(|e| ProviderError::Decode {
        provider,
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_client() {
        assert!(build_client(&Config::default()).is_ok());
    }
}
