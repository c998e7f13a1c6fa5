//! A handle on one version of the response store.

use std::fmt;
use std::sync::Arc;

use crate::error::StoreError;
use crate::http::{CachedResponse, RequestIdentity};

use super::storage::CacheStorage;

/// The response store for a single cache version.
///
/// Cheap to clone: clones share the same backend.
pub struct ResponseStore<S: CacheStorage> {
  storage: Arc<S>,
  version: String,
}

impl<S: CacheStorage> ResponseStore<S> {
  /// Handle on a version without touching the backend. The version comes
  /// into existence on its first write.
  pub fn new(storage: Arc<S>, version: &str) -> Self {
    Self {
      storage,
      version: version.to_string(),
    }
  }

  /// Open the given version, creating it if it does not exist.
  pub fn open(storage: Arc<S>, version: &str) -> Result<Self, StoreError> {
    storage.open(version)?;
    Ok(Self::new(storage, version))
  }

  pub fn version(&self) -> &str {
    &self.version
  }

  pub fn get(&self, identity: &RequestIdentity) -> Result<Option<CachedResponse>, StoreError> {
    self.storage.get(&self.version, identity)
  }

  pub fn put(&self, identity: &RequestIdentity, response: &CachedResponse) -> Result<(), StoreError> {
    self.storage.put(&self.version, identity, response)
  }

  pub fn put_all(&self, entries: &[(RequestIdentity, CachedResponse)]) -> Result<(), StoreError> {
    self.storage.put_all(&self.version, entries)
  }
}

impl<S: CacheStorage> fmt::Debug for ResponseStore<S> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ResponseStore")
      .field("version", &self.version)
      .finish_non_exhaustive()
  }
}

impl<S: CacheStorage> Clone for ResponseStore<S> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      version: self.version.clone(),
    }
  }
}
