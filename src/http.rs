//! Request and response model shared by the router, strategies and store.

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use url::Url;

/// Body of the 503 returned when an HTML request is offline and uncached.
pub const OFFLINE_BODY: &str = "Sense connexió.";

/// Body of the 503 returned when dynamic data is neither cached nor reachable.
pub const NO_DATA_BODY: &str = "Sense dades.";

const SYNTHESIZED_CONTENT_TYPE: &str = "text/plain;charset=UTF-8";

/// Declared intent of an intercepted request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RequestMode {
  /// Top-level page navigation
  Navigate,
  /// Anything loaded by a page (scripts, images, data, ...)
  #[default]
  SubResource,
}

/// A request as seen by the interceptor.
#[derive(Debug, Clone)]
pub struct InterceptedRequest {
  pub method: Method,
  pub url: Url,
  pub mode: RequestMode,
  pub headers: HeaderMap,
}

impl InterceptedRequest {
  /// A plain `GET` sub-resource request.
  pub fn get(url: Url) -> Self {
    Self {
      method: Method::GET,
      url,
      mode: RequestMode::SubResource,
      headers: HeaderMap::new(),
    }
  }

  /// A `GET` navigation request.
  pub fn navigate(url: Url) -> Self {
    Self {
      mode: RequestMode::Navigate,
      ..Self::get(url)
    }
  }

  pub fn with_method(mut self, method: Method) -> Self {
    self.method = method;
    self
  }

  /// Set the `Accept` header. Values that are not valid header text are ignored.
  pub fn with_accept(mut self, accept: &str) -> Self {
    if let Ok(value) = HeaderValue::from_str(accept) {
      self.headers.insert(ACCEPT, value);
    }
    self
  }

  /// Every `Accept` value joined with ", ", or an empty string when absent.
  /// Values that are not UTF-8 are skipped.
  pub fn accept(&self) -> String {
    self
      .headers
      .get_all(ACCEPT)
      .iter()
      .filter_map(|v| v.to_str().ok())
      .collect::<Vec<_>>()
      .join(", ")
  }

  pub fn identity(&self) -> RequestIdentity {
    RequestIdentity::new(&self.method, &self.url)
  }

  /// Only `GET` requests are matched against or written into a store.
  pub fn is_cacheable(&self) -> bool {
    self.method == Method::GET
  }
}

/// Lookup key of a cached response: method plus absolute URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestIdentity {
  method: String,
  url: String,
}

impl RequestIdentity {
  /// Build an identity. The fragment never reaches the network, so it is
  /// not part of the key.
  pub fn new(method: &Method, url: &Url) -> Self {
    let mut url = url.clone();
    url.set_fragment(None);
    Self {
      method: method.as_str().to_string(),
      url: url.into(),
    }
  }

  pub fn method(&self) -> &str {
    &self.method
  }

  pub fn url(&self) -> &str {
    &self.url
  }

  /// Stable fixed-length storage key.
  pub fn cache_hash(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.to_string().as_bytes());
    hex::encode(hasher.finalize())
  }
}

impl fmt::Display for RequestIdentity {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} {}", self.method, self.url)
  }
}

/// A complete response: status, headers and the whole body.
///
/// Plain owned data. Storing and returning the same response means cloning
/// it, so the stored copy and the caller's copy never share a body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
  pub status: u16,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
}

impl CachedResponse {
  pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
    Self {
      status,
      headers: Vec::new(),
      body: body.into(),
    }
  }

  pub fn with_header(mut self, name: &str, value: &str) -> Self {
    self.headers.push((name.to_string(), value.to_string()));
    self
  }

  /// A 503 with a human readable body, used when nothing better exists.
  pub fn unavailable(message: &str) -> Self {
    Self::new(503, message).with_header("content-type", SYNTHESIZED_CONTENT_TYPE)
  }

  /// Exactly 200: the only status that is ever written to a store.
  pub fn is_storable(&self) -> bool {
    self.status == 200
  }

  /// Any 2xx status.
  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }

  /// First header with the given name, compared case-insensitively.
  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(n, _)| n.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }

  pub fn text(&self) -> String {
    String::from_utf8_lossy(&self.body).into_owned()
  }
}
