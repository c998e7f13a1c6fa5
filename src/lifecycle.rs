//! Store lifecycle: populate the current version on install, prune the
//! others on activate.

use color_eyre::{eyre::eyre, Result};
use futures::future::try_join_all;
use std::sync::Arc;
use tracing::info;
use url::Url;

use crate::cache::{CacheStorage, ResponseStore};
use crate::error::{InstallError, StoreError};
use crate::http::InterceptedRequest;
use crate::network::Fetch;

/// Readiness reported to the host after each lifecycle step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
  /// Nothing has run yet
  Pending,
  /// Manifest stored, ready to take over (skip waiting)
  Installed,
  /// Old versions pruned, controlling requests (clients claimed)
  Activated,
}

/// Assets that must be present in the current store after install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
  entries: Vec<Url>,
}

impl Manifest {
  /// Resolve relative asset paths against the scope. Every entry must stay
  /// on the scope's origin.
  pub fn resolve(scope: &Url, paths: &[String]) -> Result<Self> {
    let entries = paths
      .iter()
      .map(|path| {
        let url = scope
          .join(path)
          .map_err(|e| eyre!("Invalid manifest entry '{}': {}", path, e))?;
        if url.origin() != scope.origin() {
          return Err(eyre!(
            "Manifest entry '{}' resolves outside of {}",
            path,
            scope.origin().ascii_serialization()
          ));
        }
        Ok(url)
      })
      .collect::<Result<Vec<_>>>()?;

    Ok(Self { entries })
  }

  pub fn iter(&self) -> impl Iterator<Item = &Url> {
    self.entries.iter()
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}

/// Open the version's store and fill it with every manifest entry.
///
/// All entries are fetched first; if any of them fails or answers with a
/// non-2xx status nothing is written and the install fails.
pub async fn install<S, F>(
  storage: Arc<S>,
  version: &str,
  manifest: &Manifest,
  fetcher: &F,
) -> Result<ResponseStore<S>, InstallError>
where
  S: CacheStorage,
  F: Fetch + ?Sized,
{
  let store = ResponseStore::open(storage, version)?;

  let fetches = manifest.iter().map(|url| async move {
    let request = InterceptedRequest::get(url.clone());
    let response = fetcher
      .fetch(&request)
      .await
      .map_err(|source| InstallError::Fetch {
        url: url.to_string(),
        source,
      })?;

    if !response.is_success() {
      return Err(InstallError::Status {
        url: url.to_string(),
        status: response.status,
      });
    }

    Ok((request.identity(), response))
  });

  let entries = try_join_all(fetches).await?;
  store.put_all(&entries)?;

  info!(version, entries = entries.len(), "installed cache version");
  Ok(store)
}

/// Delete every stored version except `current`. Returns the deleted ids.
pub fn activate<S: CacheStorage + ?Sized>(
  storage: &S,
  current: &str,
) -> Result<Vec<String>, StoreError> {
  let mut deleted = Vec::new();

  for info in storage.versions()? {
    if info.version == current {
      continue;
    }
    if storage.delete(&info.version)? {
      info!(version = %info.version, entries = info.entries, "deleted old cache version");
      deleted.push(info.version);
    }
  }

  Ok(deleted)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::MemoryStorage;
  use crate::http::CachedResponse;
  use crate::testing::{page, ScriptedFetcher, SCOPE};

  fn scope() -> Url {
    Url::parse(SCOPE).unwrap()
  }

  fn manifest(paths: &[&str]) -> Manifest {
    let paths: Vec<String> = paths.iter().map(|p| p.to_string()).collect();
    Manifest::resolve(&scope(), &paths).unwrap()
  }

  fn names(storage: &MemoryStorage) -> Vec<String> {
    storage
      .versions()
      .unwrap()
      .into_iter()
      .map(|v| v.version)
      .collect()
  }

  #[test]
  fn test_manifest_resolves_relative_paths() {
    let m = manifest(&["./", "index.html", "assets/icon-192.png"]);
    let urls: Vec<&str> = m.iter().map(|u| u.as_str()).collect();
    assert_eq!(
      urls,
      vec![
        "http://localhost:8000/",
        "http://localhost:8000/index.html",
        "http://localhost:8000/assets/icon-192.png",
      ]
    );
  }

  #[test]
  fn test_manifest_rejects_foreign_origin() {
    let paths = vec!["https://cdn.example.com/lib.js".to_string()];
    assert!(Manifest::resolve(&scope(), &paths).is_err());
  }

  #[tokio::test]
  async fn test_install_stores_every_entry() {
    let storage = Arc::new(MemoryStorage::new());
    let fetcher = ScriptedFetcher::new()
      .respond(page("a.css"), CachedResponse::new(200, "A"))
      .respond(page("b.js"), CachedResponse::new(200, "B"))
      .respond(page("c.png"), CachedResponse::new(200, "C"));

    let store = install(
      Arc::clone(&storage),
      "v3",
      &manifest(&["a.css", "b.js", "c.png"]),
      &fetcher,
    )
    .await
    .unwrap();

    for (path, body) in [("a.css", "A"), ("b.js", "B"), ("c.png", "C")] {
      let entry = store
        .get(&InterceptedRequest::get(page(path)).identity())
        .unwrap()
        .unwrap();
      assert_eq!(entry.body, body.as_bytes());
    }
    let versions = storage.versions().unwrap();
    assert_eq!(versions.len(), 1);
    assert_eq!(versions[0].entries, 3);
  }

  #[tokio::test]
  async fn test_install_is_all_or_nothing() {
    let storage = Arc::new(MemoryStorage::new());
    // c.png is unreachable
    let fetcher = ScriptedFetcher::new()
      .respond(page("a.css"), CachedResponse::new(200, "A"))
      .respond(page("b.js"), CachedResponse::new(200, "B"));

    let err = install(
      Arc::clone(&storage),
      "v3",
      &manifest(&["a.css", "b.js", "c.png"]),
      &fetcher,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, InstallError::Fetch { ref url, .. } if url.ends_with("c.png")));
    assert_eq!(storage.versions().unwrap()[0].entries, 0);
  }

  #[tokio::test]
  async fn test_install_rejects_error_status() {
    let storage = Arc::new(MemoryStorage::new());
    let fetcher = ScriptedFetcher::new()
      .respond(page("a.css"), CachedResponse::new(200, "A"))
      .respond(page("b.js"), CachedResponse::new(404, "missing"));

    let err = install(storage, "v3", &manifest(&["a.css", "b.js"]), &fetcher)
      .await
      .unwrap_err();

    assert!(matches!(err, InstallError::Status { status: 404, .. }));
  }

  #[test]
  fn test_activate_prunes_old_versions() {
    let storage = MemoryStorage::new();
    storage.open("v1").unwrap();
    storage.open("v2").unwrap();
    storage.open("v3").unwrap();

    let mut deleted = activate(&storage, "v3").unwrap();
    deleted.sort();

    assert_eq!(deleted, vec!["v1".to_string(), "v2".to_string()]);
    assert_eq!(names(&storage), vec!["v3".to_string()]);
  }

  #[test]
  fn test_activate_is_idempotent() {
    let storage = MemoryStorage::new();
    storage.open("old").unwrap();
    storage.open("current").unwrap();

    activate(&storage, "current").unwrap();
    let after_first = names(&storage);
    let deleted = activate(&storage, "current").unwrap();

    assert!(deleted.is_empty());
    assert_eq!(names(&storage), after_first);
  }

  #[test]
  fn test_activate_before_install_leaves_nothing() {
    let storage = MemoryStorage::new();
    storage.open("stale").unwrap();

    activate(&storage, "fresh").unwrap();

    assert!(names(&storage).is_empty());
  }
}
