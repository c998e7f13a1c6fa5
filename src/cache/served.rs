//! Outcome types describing where a served response came from.

use crate::http::CachedResponse;

/// A response handed back to the client, with its provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Served {
  /// The actual response
  pub response: CachedResponse,
  /// Where the response came from
  pub source: CacheSource,
}

impl Served {
  /// Fresh response straight from the network.
  pub fn from_network(response: CachedResponse) -> Self {
    Self {
      response,
      source: CacheSource::Network,
    }
  }

  /// Stored response served without touching the network first.
  pub fn from_cache(response: CachedResponse) -> Self {
    Self {
      response,
      source: CacheSource::Cache,
    }
  }

  /// Stored response served because the network failed.
  pub fn offline(response: CachedResponse) -> Self {
    Self {
      response,
      source: CacheSource::Offline,
    }
  }

  /// Placeholder 503 built locally.
  pub fn synthesized(message: &str) -> Self {
    Self {
      response: CachedResponse::unavailable(message),
      source: CacheSource::Synthesized,
    }
  }
}

/// Indicates where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh data from network
  Network,
  /// Data from cache, network not consulted (or still refreshing in the background)
  Cache,
  /// Network unavailable, serving cached data
  Offline,
  /// Nothing available anywhere, serving a locally built 503
  Synthesized,
}

impl std::fmt::Display for CacheSource {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let name = match self {
      Self::Network => "network",
      Self::Cache => "cache",
      Self::Offline => "offline",
      Self::Synthesized => "synthesized",
    };
    f.write_str(name)
  }
}
