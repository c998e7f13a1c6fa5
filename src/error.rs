//! Error types for the interception engine.
//!
//! The engine speaks in these typed errors; the binary converts them into
//! `eyre` reports at the edge.

use thiserror::Error;

/// A network fetch that could not produce a response.
#[derive(Error, Debug)]
pub enum FetchError {
  #[error("network request to {url} failed: {reason}")]
  Network { url: String, reason: String },

  #[error("network request to {url} timed out")]
  Timeout { url: String },

  #[error("failed to read response body from {url}: {reason}")]
  Body { url: String, reason: String },
}

/// The versioned response store could not be used.
#[derive(Error, Debug)]
pub enum StoreError {
  #[error("response store unavailable: {0}")]
  Unavailable(String),

  #[error("sqlite error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("failed to encode cached response: {0}")]
  Encoding(#[from] serde_json::Error),

  #[error("store lock poisoned")]
  Poisoned,
}

/// Failure of the install lifecycle step. The host is expected to retry.
#[derive(Error, Debug)]
pub enum InstallError {
  #[error(transparent)]
  Store(#[from] StoreError),

  #[error("failed to fetch manifest entry {url}: {source}")]
  Fetch {
    url: String,
    #[source]
    source: FetchError,
  },

  #[error("manifest entry {url} answered with status {status}")]
  Status { url: String, status: u16 },
}

/// Failure surfaced by `Router::handle`.
///
/// Only Cache-First without a cached copy ever produces one; the other
/// strategies always resolve to a response.
#[derive(Error, Debug)]
pub enum InterceptError {
  #[error(transparent)]
  Network(#[from] FetchError),

  #[error(transparent)]
  Store(#[from] StoreError),
}
