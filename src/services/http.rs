//! Thin wrapper over `reqwest` shared by all services.

use color_eyre::{eyre::eyre, Result};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

const USER_AGENT: &str = concat!("dashcache/", env!("CARGO_PKG_VERSION"));

/// HTTP client used for third-party JSON endpoints
#[derive(Clone, Debug)]
pub struct HttpClient {
  client: reqwest::Client,
}

impl HttpClient {
  pub fn new() -> Result<Self> {
    let client = reqwest::Client::builder()
      .user_agent(USER_AGENT)
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client })
  }

  pub fn get(&self, url: Url) -> RequestBuilder {
    self.client.get(url)
  }

  pub fn post(&self, url: Url) -> RequestBuilder {
    self.client.post(url)
  }

  /// GET `url` and decode the JSON body. Non-2xx statuses are errors.
  pub async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
    let response = send(self.get(url.clone())).await?;
    decode(response, &url).await
  }
}

/// Send a request, turning transport failures into reports. The status is
/// not checked.
pub async fn send(request: RequestBuilder) -> Result<Response> {
  request
    .send()
    .await
    .map_err(|e| eyre!("Request failed: {}", e))
}

/// Decode a JSON body, failing on non-success statuses.
pub async fn decode<T: DeserializeOwned>(response: Response, url: &Url) -> Result<T> {
  let status = response.status();
  if !status.is_success() {
    return Err(status_error(status, url));
  }

  response
    .json()
    .await
    .map_err(|e| eyre!("Failed to parse response from {}: {}", redact(url), e))
}

pub fn status_error(status: StatusCode, url: &Url) -> color_eyre::Report {
  eyre!("{} returned {}", redact(url), status)
}

/// The URL without its query string, which may carry API keys.
fn redact(url: &Url) -> String {
  let mut clean = url.clone();
  clean.set_query(None);
  clean.to_string()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_redact_drops_query() {
    let url = Url::parse("https://api.example.com/api/nutrition?app_key=secret").expect("url");
    assert_eq!(redact(&url), "https://api.example.com/api/nutrition");
  }

  #[test]
  fn test_status_error_mentions_status() {
    let url = Url::parse("https://wttr.in/london?format=j1").expect("url");
    let err = status_error(StatusCode::SERVICE_UNAVAILABLE, &url);
    let text = err.to_string();
    assert!(text.contains("503"));
    assert!(!text.contains("format"));
  }
}
