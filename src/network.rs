//! The network side of the interceptor: a fetch primitive and its HTTP client.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use reqwest::header::HeaderMap;
use std::time::Duration;
use tracing::debug;

use crate::error::FetchError;
use crate::http::{CachedResponse, InterceptedRequest};

/// Anything that can resolve a request to a complete response.
#[async_trait]
pub trait Fetch: Send + Sync {
  async fn fetch(&self, request: &InterceptedRequest) -> Result<CachedResponse, FetchError>;
}

/// `reqwest`-backed fetcher used by the binary.
#[derive(Clone)]
pub struct HttpFetcher {
  client: reqwest::Client,
}

impl HttpFetcher {
  pub fn new(timeout: Duration) -> Result<Self> {
    let client = reqwest::Client::builder()
      .timeout(timeout)
      .user_agent(concat!("offgrid/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client })
  }
}

#[async_trait]
impl Fetch for HttpFetcher {
  async fn fetch(&self, request: &InterceptedRequest) -> Result<CachedResponse, FetchError> {
    let url = request.url.to_string();

    let response = self
      .client
      .request(request.method.clone(), request.url.clone())
      .headers(request.headers.clone())
      .send()
      .await
      .map_err(|e| send_error(&url, e))?;

    let status = response.status().as_u16();
    let headers = header_pairs(response.headers());

    // The whole body is read here; the response is complete and reusable from now on
    let body = response.bytes().await.map_err(|e| {
      if e.is_timeout() {
        FetchError::Timeout { url: url.clone() }
      } else {
        FetchError::Body {
          url: url.clone(),
          reason: e.to_string(),
        }
      }
    })?;

    Ok(CachedResponse {
      status,
      headers,
      body: body.to_vec(),
    })
  }
}

/// Header values that are not valid UTF-8 are kept, lossily decoded.
fn header_pairs(headers: &HeaderMap) -> Vec<(String, String)> {
  headers
    .iter()
    .map(|(name, value)| {
      let value = match value.to_str() {
        Ok(v) => v.to_string(),
        Err(_) => {
          debug!(header = %name, "non-UTF-8 header value, decoding lossily");
          String::from_utf8_lossy(value.as_bytes()).into_owned()
        }
      };
      (name.as_str().to_string(), value)
    })
    .collect()
}

fn send_error(url: &str, e: reqwest::Error) -> FetchError {
  if e.is_timeout() {
    FetchError::Timeout {
      url: url.to_string(),
    }
  } else {
    FetchError::Network {
      url: url.to_string(),
      reason: e.to_string(),
    }
  }
}
