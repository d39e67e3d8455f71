// Shared HTTP plumbing for the concrete providers.

use std::time::Duration;

use anyhow::Context;
use serde::de::DeserializeOwned;
use tracing::debug;

use kcast_core::config::HttpConfig;
use kcast_core::source::SourceError;

/// One client for every provider, with a client-level timeout.
pub fn build_client(config: &HttpConfig) -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .user_agent(config.user_agent.clone())
        .build()
        .context("failed to build HTTP client")
}

async fn send(
    client: &reqwest::Client,
    source_name: &str,
    url: &str,
    query: &[(&str, String)],
) -> Result<reqwest::Response, SourceError> {
    debug!(source = source_name, url, "GET");
    let response = client
        .get(url)
        .query(query)
        .send()
        .await
        .map_err(|e| SourceError::request(source_name, e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(SourceError::request(source_name, format!("HTTP {status} from {url}")));
    }
    Ok(response)
}

/// GET `url` and decode the JSON body into `T`.
pub async fn get_json<T: DeserializeOwned>(
    client: &reqwest::Client,
    source_name: &str,
    url: &str,
    query: &[(&str, String)],
) -> Result<T, SourceError> {
    let body = get_text(client, source_name, url, query).await?;
    serde_json::from_str(&body).map_err(|e| SourceError::malformed(source_name, e.to_string()))
}

/// GET `url` and return the body as text.
pub async fn get_text(
    client: &reqwest::Client,
    source_name: &str,
    url: &str,
    query: &[(&str, String)],
) -> Result<String, SourceError> {
    send(client, source_name, url, query)
        .await?
        .text()
        .await
        .map_err(|e| SourceError::request(source_name, e.to_string()))
}
