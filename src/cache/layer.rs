//! Cache layer that orchestrates caching logic with network fetching.

use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{InterceptError, StoreError};
use crate::http::{CachedResponse, InterceptedRequest, NO_DATA_BODY, OFFLINE_BODY};
use crate::network::Fetch;

use super::served::Served;
use super::storage::CacheStorage;
use super::store::ResponseStore;

type Refresh = JoinHandle<Option<CachedResponse>>;

/// Cache layer that runs the three retrieval strategies.
///
/// This layer sits between the router and the network, reading and writing
/// one version of the response store.
pub struct CacheLayer<S: CacheStorage, F: Fetch> {
  store: ResponseStore<S>,
  fetcher: Arc<F>,
  /// Background revalidations whose result nobody is waiting for
  refreshes: Arc<Mutex<Vec<Refresh>>>,
}

impl<S, F> CacheLayer<S, F>
where
  S: CacheStorage + 'static,
  F: Fetch + 'static,
{
  pub fn new(store: ResponseStore<S>, fetcher: Arc<F>) -> Self {
    Self {
      store,
      fetcher,
      refreshes: Arc::new(Mutex::new(Vec::new())),
    }
  }

  pub fn store(&self) -> &ResponseStore<S> {
    &self.store
  }

  /// Cache-first strategy.
  ///
  /// 1. Check cache - if present, return immediately
  /// 2. If missing, fetch from network and store a 200
  /// 3. On network failure there is nothing to fall back to: the error propagates
  pub async fn cache_first(&self, request: &InterceptedRequest) -> Result<Served, InterceptError> {
    if let Some(cached) = lookup(&self.store, request)? {
      debug!(url = %request.url, "cache-first: hit");
      return Ok(Served::from_cache(cached));
    }

    debug!(url = %request.url, "cache-first: miss, fetching");
    let fresh = self.fetcher.fetch(request).await?;
    remember(&self.store, request, &fresh);
    Ok(Served::from_network(fresh))
  }

  /// Network-first strategy.
  ///
  /// 1. Fetch from network, storing a 200
  /// 2. On network failure, return the cached copy (offline mode)
  /// 3. With no cached copy either, answer with a 503
  pub async fn network_first(&self, request: &InterceptedRequest) -> Served {
    match self.fetcher.fetch(request).await {
      Ok(fresh) => {
        remember(&self.store, request, &fresh);
        Served::from_network(fresh)
      }
      Err(err) => {
        debug!(url = %request.url, error = %err, "network-first: network failed, trying cache");
        match lookup(&self.store, request) {
          Ok(Some(cached)) => Served::offline(cached),
          Ok(None) => Served::synthesized(OFFLINE_BODY),
          Err(store_err) => {
            warn!(url = %request.url, error = %store_err, "cache lookup failed");
            Served::synthesized(OFFLINE_BODY)
          }
        }
      }
    }
  }

  /// Stale-while-revalidate strategy.
  ///
  /// A revalidation is always spawned. With a cached copy the copy is
  /// returned at once and the revalidation finishes on its own; without one
  /// the revalidation is awaited.
  pub async fn stale_while_revalidate(&self, request: &InterceptedRequest) -> Served {
    let cached = lookup(&self.store, request).unwrap_or_else(|err| {
      warn!(url = %request.url, error = %err, "cache lookup failed");
      None
    });

    let refresh = self.spawn_revalidate(request);

    match cached {
      Some(cached) => {
        debug!(url = %request.url, "stale-while-revalidate: serving cache, refreshing in background");
        self.track(refresh);
        Served::from_cache(cached)
      }
      None => match refresh.await {
        Ok(Some(fresh)) => Served::from_network(fresh),
        Ok(None) => Served::synthesized(NO_DATA_BODY),
        Err(err) => {
          warn!(url = %request.url, error = %err, "revalidation task failed");
          Served::synthesized(NO_DATA_BODY)
        }
      },
    }
  }

  /// Wait for every background revalidation started so far.
  pub async fn settle(&self) {
    let pending = std::mem::take(&mut *self.refreshes.lock().unwrap_or_else(|e| e.into_inner()));

    for refresh in pending {
      if let Err(err) = refresh.await {
        warn!(error = %err, "revalidation task failed");
      }
    }
  }

  /// Number of revalidations that have not finished yet.
  pub fn pending_refreshes(&self) -> usize {
    self
      .refreshes
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .iter()
      .filter(|h| !h.is_finished())
      .count()
  }

  fn spawn_revalidate(&self, request: &InterceptedRequest) -> Refresh {
    let store = self.store.clone();
    let fetcher = Arc::clone(&self.fetcher);
    let request = request.clone();

    // Runs to completion even if the caller has long been answered
    tokio::spawn(async move {
      match fetcher.fetch(&request).await {
        Ok(fresh) => {
          remember(&store, &request, &fresh);
          Some(fresh)
        }
        Err(err) => {
          debug!(url = %request.url, error = %err, "revalidation failed");
          None
        }
      }
    })
  }

  fn track(&self, refresh: Refresh) {
    let mut refreshes = self.refreshes.lock().unwrap_or_else(|e| e.into_inner());
    refreshes.retain(|h| !h.is_finished());
    refreshes.push(refresh);
  }
}

impl<S: CacheStorage, F: Fetch> Clone for CacheLayer<S, F> {
  fn clone(&self) -> Self {
    Self {
      store: self.store.clone(),
      fetcher: Arc::clone(&self.fetcher),
      refreshes: Arc::clone(&self.refreshes),
    }
  }
}

/// Store lookup. Only `GET` requests can ever hit.
fn lookup<S: CacheStorage>(
  store: &ResponseStore<S>,
  request: &InterceptedRequest,
) -> Result<Option<CachedResponse>, StoreError> {
  if !request.is_cacheable() {
    return Ok(None);
  }
  store.get(&request.identity())
}

/// Write a fresh response if it is a 200 for a `GET`.
///
/// A failed write never fails the request; the fresh response is still served.
fn remember<S: CacheStorage>(
  store: &ResponseStore<S>,
  request: &InterceptedRequest,
  fresh: &CachedResponse,
) {
  if !request.is_cacheable() || !fresh.is_storable() {
    debug!(url = %request.url, status = fresh.status, "not cacheable, skipping store");
    return;
  }

  if let Err(err) = store.put(&request.identity(), fresh) {
    warn!(url = %request.url, error = %err, "failed to store response");
  }
}
