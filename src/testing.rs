//! Test doubles shared by the unit tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use url::Url;

use crate::error::FetchError;
use crate::http::{CachedResponse, InterceptedRequest};
use crate::network::Fetch;

pub const SCOPE: &str = "http://localhost:8000/";

/// Resolve a path against the test scope.
pub fn page(path: &str) -> Url {
  Url::parse(SCOPE).unwrap().join(path).unwrap()
}

/// Fetcher that answers from a fixed table. Unknown URLs fail like a
/// dropped connection.
#[derive(Default)]
pub struct ScriptedFetcher {
  routes: HashMap<String, CachedResponse>,
  calls: AtomicUsize,
  gate: Option<Arc<Notify>>,
}

impl ScriptedFetcher {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn respond(mut self, url: Url, response: CachedResponse) -> Self {
    self.routes.insert(url.to_string(), response);
    self
  }

  /// Hold every fetch until the gate is notified once per fetch.
  pub fn gated(mut self, gate: Arc<Notify>) -> Self {
    self.gate = Some(gate);
    self
  }

  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl Fetch for ScriptedFetcher {
  async fn fetch(&self, request: &InterceptedRequest) -> Result<CachedResponse, FetchError> {
    self.calls.fetch_add(1, Ordering::SeqCst);

    if let Some(gate) = &self.gate {
      gate.notified().await;
    }

    self
      .routes
      .get(request.url.as_str())
      .cloned()
      .ok_or_else(|| FetchError::Network {
        url: request.url.to_string(),
        reason: "connection refused".to_string(),
      })
  }
}
