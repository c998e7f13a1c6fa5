//! The interceptor entry point: lifecycle hooks plus per-request dispatch.

use color_eyre::Result;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;
use url::Url;

use crate::cache::{CacheLayer, CacheStorage, ResponseStore, Served, VersionInfo};
use crate::classify::{classify, DynamicDataRule, Strategy};
use crate::config::Config;
use crate::error::{InstallError, InterceptError, StoreError};
use crate::http::InterceptedRequest;
use crate::lifecycle::{self, LifecyclePhase, Manifest};
use crate::network::Fetch;

/// Everything the router needs from configuration, already validated.
#[derive(Debug, Clone)]
pub struct RouterSettings {
  pub scope: Url,
  pub cache_version: String,
  pub manifest: Manifest,
  pub dynamic_data: DynamicDataRule,
}

impl RouterSettings {
  pub fn from_config(config: &Config) -> Result<Self> {
    Ok(Self {
      scope: config.scope_url()?,
      cache_version: config.cache_version.clone(),
      manifest: config.manifest()?,
      dynamic_data: config.dynamic_data.clone(),
    })
  }
}

/// Offline-first request router.
///
/// Holds the storage backend and the fetcher explicitly; the current cache
/// version is fixed for the router's lifetime.
pub struct Router<S: CacheStorage, F: Fetch> {
  storage: Arc<S>,
  fetcher: Arc<F>,
  settings: RouterSettings,
  layer: CacheLayer<S, F>,
  phase: watch::Sender<LifecyclePhase>,
}

impl<S, F> Router<S, F>
where
  S: CacheStorage + 'static,
  F: Fetch + 'static,
{
  pub fn new(storage: Arc<S>, fetcher: Arc<F>, settings: RouterSettings) -> Self {
    let store = ResponseStore::new(Arc::clone(&storage), &settings.cache_version);
    let layer = CacheLayer::new(store, Arc::clone(&fetcher));
    let (phase, _) = watch::channel(LifecyclePhase::Pending);

    Self {
      storage,
      fetcher,
      settings,
      layer,
      phase,
    }
  }

  pub fn cache_version(&self) -> &str {
    &self.settings.cache_version
  }

  pub fn scope(&self) -> &Url {
    &self.settings.scope
  }

  /// Install hook: store every manifest entry in the current version.
  pub async fn on_install(&self) -> Result<(), InstallError> {
    lifecycle::install(
      Arc::clone(&self.storage),
      &self.settings.cache_version,
      &self.settings.manifest,
      self.fetcher.as_ref(),
    )
    .await?;

    self.phase.send_replace(LifecyclePhase::Installed);
    Ok(())
  }

  /// Activate hook: delete every version but the current one.
  pub async fn on_activate(&self) -> Result<Vec<String>, StoreError> {
    let deleted = lifecycle::activate(self.storage.as_ref(), &self.settings.cache_version)?;

    self.phase.send_replace(LifecyclePhase::Activated);
    Ok(deleted)
  }

  /// Every stored version, oldest first.
  pub fn versions(&self) -> Result<Vec<VersionInfo>, StoreError> {
    self.storage.versions()
  }

  /// Lifecycle readiness as seen by the host.
  pub fn subscribe(&self) -> watch::Receiver<LifecyclePhase> {
    self.phase.subscribe()
  }

  /// Resolve an intercepted request.
  ///
  /// Returns `Ok(None)` for requests outside the scope's origin; those are
  /// left for the host to send untouched.
  pub async fn handle(&self, request: &InterceptedRequest) -> Result<Option<Served>, InterceptError> {
    if request.url.origin() != self.settings.scope.origin() {
      debug!(url = %request.url, "foreign origin, passing through");
      return Ok(None);
    }

    let strategy = classify(request, &self.settings.dynamic_data);
    let served = match strategy {
      Strategy::Html => self.layer.network_first(request).await,
      Strategy::DynamicData => self.layer.stale_while_revalidate(request).await,
      Strategy::Static => self.layer.cache_first(request).await?,
    };

    debug!(
      url = %request.url,
      ?strategy,
      source = %served.source,
      status = served.response.status,
      "served"
    );
    Ok(Some(served))
  }

  /// Wait for background revalidations to land in the store.
  pub async fn settle(&self) {
    self.layer.settle().await;
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{CacheSource, MemoryStorage};
  use crate::http::CachedResponse;
  use crate::testing::{page, ScriptedFetcher, SCOPE};

  fn settings(manifest: &[&str]) -> RouterSettings {
    let scope = Url::parse(SCOPE).unwrap();
    let paths: Vec<String> = manifest.iter().map(|p| p.to_string()).collect();
    RouterSettings {
      manifest: Manifest::resolve(&scope, &paths).unwrap(),
      scope,
      cache_version: "v3".to_string(),
      dynamic_data: DynamicDataRule::default(),
    }
  }

  fn router(
    storage: &Arc<MemoryStorage>,
    fetcher: ScriptedFetcher,
    manifest: &[&str],
  ) -> Router<MemoryStorage, ScriptedFetcher> {
    Router::new(Arc::clone(storage), Arc::new(fetcher), settings(manifest))
  }

  fn ok(body: &str) -> CachedResponse {
    CachedResponse::new(200, body)
  }

  #[tokio::test]
  async fn test_foreign_origin_passes_through() {
    let storage = Arc::new(MemoryStorage::new());
    let router = router(&storage, ScriptedFetcher::new(), &[]);
    let request = InterceptedRequest::get(Url::parse("https://docs.google.com/sheet.csv").unwrap());

    assert_eq!(router.handle(&request).await.unwrap(), None);
  }

  #[tokio::test]
  async fn test_static_miss_fetches_and_stores() {
    let storage = Arc::new(MemoryStorage::new());
    let router = router(
      &storage,
      ScriptedFetcher::new().respond(page("style.css"), ok("B")),
      &[],
    );
    let request = InterceptedRequest::get(page("style.css"));

    let served = router.handle(&request).await.unwrap().unwrap();

    assert_eq!(served.response.body, b"B");
    let stored = storage.get("v3", &request.identity()).unwrap();
    assert_eq!(stored, Some(ok("B")));
  }

  #[tokio::test]
  async fn test_navigation_offline_serves_cache() {
    let storage = Arc::new(MemoryStorage::new());
    let request = InterceptedRequest::navigate(page("/"));
    storage.put("v3", &request.identity(), &ok("<html>home</html>")).unwrap();
    let router = router(&storage, ScriptedFetcher::new(), &[]);

    let served = router.handle(&request).await.unwrap().unwrap();

    assert_eq!(served.source, CacheSource::Offline);
    assert_eq!(served.response.body, b"<html>home</html>");
  }

  #[tokio::test]
  async fn test_navigation_offline_uncached_is_503() {
    let storage = Arc::new(MemoryStorage::new());
    let router = router(&storage, ScriptedFetcher::new(), &[]);

    let served = router
      .handle(&InterceptedRequest::navigate(page("/")))
      .await
      .unwrap()
      .unwrap();

    assert_eq!(served.response.status, 503);
    assert_eq!(served.response.text(), "Sense connexió.");
  }

  #[tokio::test]
  async fn test_dynamic_data_served_from_cache_then_refreshed() {
    let storage = Arc::new(MemoryStorage::new());
    let request = InterceptedRequest::get(page("data/x.json"));
    storage.put("v3", &request.identity(), &ok("E")).unwrap();
    let router = router(
      &storage,
      ScriptedFetcher::new().respond(page("data/x.json"), ok("E2")),
      &[],
    );

    let served = router.handle(&request).await.unwrap().unwrap();
    assert_eq!(served.source, CacheSource::Cache);
    assert_eq!(served.response.body, b"E");

    router.settle().await;
    assert_eq!(storage.get("v3", &request.identity()).unwrap(), Some(ok("E2")));
  }

  #[tokio::test]
  async fn test_dynamic_data_offline_uncached_is_503() {
    let storage = Arc::new(MemoryStorage::new());
    let router = router(&storage, ScriptedFetcher::new(), &[]);

    let served = router
      .handle(&InterceptedRequest::get(page("data/y.csv")))
      .await
      .unwrap()
      .unwrap();

    assert_eq!(served.response.status, 503);
    assert_eq!(served.response.text(), "Sense dades.");
  }

  #[tokio::test]
  async fn test_install_then_activate() {
    let storage = Arc::new(MemoryStorage::new());
    storage.put("v2", &InterceptedRequest::get(page("a")).identity(), &ok("old")).unwrap();
    let router = router(
      &storage,
      ScriptedFetcher::new()
        .respond(page("a"), ok("A"))
        .respond(page("b"), ok("B"))
        .respond(page("c"), ok("C")),
      &["a", "b", "c"],
    );
    let mut phase = router.subscribe();
    assert_eq!(*phase.borrow_and_update(), LifecyclePhase::Pending);

    router.on_install().await.unwrap();
    assert_eq!(*phase.borrow_and_update(), LifecyclePhase::Installed);

    let deleted = router.on_activate().await.unwrap();
    assert_eq!(deleted, vec!["v2".to_string()]);
    assert_eq!(*phase.borrow_and_update(), LifecyclePhase::Activated);

    let versions = storage.versions().unwrap();
    assert_eq!(versions.len(), 1);
    assert_eq!(versions[0].version, "v3");
    assert_eq!(versions[0].entries, 3);
  }

  #[tokio::test]
  async fn test_installed_assets_served_offline() {
    let storage = Arc::new(MemoryStorage::new());
    let online = router(
      &storage,
      ScriptedFetcher::new()
        .respond(page("./"), ok("<html>"))
        .respond(page("style.css"), ok("css")),
      &["./", "style.css"],
    );
    online.on_install().await.unwrap();

    let offline = router(&storage, ScriptedFetcher::new(), &["./", "style.css"]);

    let css = offline
      .handle(&InterceptedRequest::get(page("style.css")))
      .await
      .unwrap()
      .unwrap();
    assert_eq!(css.source, CacheSource::Cache);
    assert_eq!(css.response.body, b"css");

    let home = offline
      .handle(&InterceptedRequest::navigate(page("./")))
      .await
      .unwrap()
      .unwrap();
    assert_eq!(home.source, CacheSource::Offline);
    assert_eq!(home.response.body, b"<html>");
  }

  #[tokio::test]
  async fn test_static_offline_miss_is_error() {
    let storage = Arc::new(MemoryStorage::new());
    let router = router(&storage, ScriptedFetcher::new(), &[]);

    let err = router
      .handle(&InterceptedRequest::get(page("app.js")))
      .await
      .unwrap_err();

    assert!(matches!(err, InterceptError::Network(_)));
  }

  #[tokio::test]
  async fn test_failed_install_keeps_phase_pending() {
    let storage = Arc::new(MemoryStorage::new());
    let router = router(&storage, ScriptedFetcher::new(), &["index.html"]);
    let phase = router.subscribe();

    assert!(router.on_install().await.is_err());
    assert_eq!(*phase.borrow(), LifecyclePhase::Pending);
  }
}
