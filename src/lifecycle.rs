//! Worker lifecycle: install (pre-cache), activate (prune old stores), fetch.

use color_eyre::{eyre::eyre, Result};
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::CacheStorage;
use crate::http::{Request, Response};
use crate::net::Fetcher;
use crate::router::{Dispatch, Router};

/// Name of the current store. Bump on deploy to invalidate everything cached
/// by earlier versions.
pub const CACHE_VERSION: &str = "kyoto-trip-v1";

/// Web-font stylesheet used by the page.
pub const FONT_STYLESHEET: &str = "https://fonts.googleapis.com/css2?family=Zen+Kaku+Gothic+New:wght@400;500;700&family=Zen+Old+Mincho:wght@400;700&family=Caveat:wght@400;600&display=swap";

/// Resources written to the store at install, relative to the page origin.
pub const PRE_CACHE: [&str; 3] = ["./", "./index.html", FONT_STYLESHEET];

/// Resolve the pre-cache list against the page's scope URL.
pub fn precache_urls(origin: &Url) -> Result<Vec<Url>> {
  PRE_CACHE
    .iter()
    .map(|entry| {
      origin
        .join(entry)
        .map_err(|e| eyre!("Invalid pre-cache entry {}: {}", entry, e))
    })
    .collect()
}

/// Lifecycle state of a worker version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
  Parsed,
  Installing,
  Installed,
  Activating,
  Activated,
  /// Install failed; this version will never serve traffic
  Redundant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOutcome {
  /// Entries written to the store
  pub cached: usize,
  /// Take over without waiting for existing clients to close
  pub skip_waiting: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivateOutcome {
  /// Stores removed because their version is not current
  pub deleted: Vec<String>,
  /// Take control of already-open clients
  pub claimed: bool,
}

/// One version of the offline worker bound to a store backend and a fetcher.
pub struct ServiceWorker<S: CacheStorage, F: Fetcher> {
  storage: Arc<S>,
  fetcher: Arc<F>,
  version: String,
  precache: Vec<Url>,
  state: WorkerState,
  router: Router<S, F>,
}

impl<S: CacheStorage, F: Fetcher> ServiceWorker<S, F> {
  /// Create the current version of the worker for the page at `origin`.
  pub fn new(storage: Arc<S>, fetcher: Arc<F>, origin: &Url) -> Result<Self> {
    let precache = precache_urls(origin)?;
    Ok(Self::with_version(storage, fetcher, CACHE_VERSION, precache))
  }

  /// Create a worker with an explicit version and pre-cache list.
  pub fn with_version(storage: Arc<S>, fetcher: Arc<F>, version: &str, precache: Vec<Url>) -> Self {
    let router = Router::new(Arc::clone(&storage), Arc::clone(&fetcher), version);
    Self {
      storage,
      fetcher,
      version: version.to_string(),
      precache,
      state: WorkerState::Parsed,
      router,
    }
  }

  /// Pick up a version installed by an earlier run.
  ///
  /// If the store for this version exists the worker is treated as active,
  /// since install is always followed straight away by activation.
  pub fn resume(storage: Arc<S>, fetcher: Arc<F>, origin: &Url) -> Result<Self> {
    let mut worker = Self::new(storage, fetcher, origin)?;
    if worker.storage.has(&worker.version)? {
      worker.state = WorkerState::Activated;
    }
    Ok(worker)
  }

  pub fn state(&self) -> WorkerState {
    self.state
  }

  pub fn version(&self) -> &str {
    &self.version
  }

  pub fn router(&self) -> &Router<S, F> {
    &self.router
  }

  /// Fetch every pre-cache entry and write them to the store in one step.
  ///
  /// Fails if any entry cannot be fetched or comes back with a non-2xx
  /// status. On failure nothing is written and the worker becomes
  /// `Redundant`.
  pub async fn install(&mut self) -> Result<InstallOutcome> {
    if self.state != WorkerState::Parsed {
      return Err(eyre!(
        "Cannot install {} from state {:?}",
        self.version,
        self.state
      ));
    }
    self.state = WorkerState::Installing;
    info!(version = %self.version, entries = self.precache.len(), "installing");

    match self.precache_all().await {
      Ok(cached) => {
        self.state = WorkerState::Installed;
        info!(version = %self.version, cached, "installed");
        Ok(InstallOutcome {
          cached,
          skip_waiting: true,
        })
      }
      Err(e) => {
        self.state = WorkerState::Redundant;
        warn!(version = %self.version, error = %e, "install failed");
        Err(e)
      }
    }
  }

  async fn precache_all(&self) -> Result<usize> {
    let requests: Vec<Request> = self.precache.iter().cloned().map(Request::get).collect();

    let fetcher = &self.fetcher;
    let results = join_all(requests.iter().map(|request| fetcher.fetch(request))).await;

    let mut entries: Vec<(Request, Response)> = Vec::with_capacity(requests.len());
    for (request, result) in requests.into_iter().zip(results) {
      let response = result.map_err(|e| eyre!("Failed to pre-cache {}: {}", request.url, e))?;
      if !response.ok() {
        return Err(eyre!(
          "Failed to pre-cache {}: status {}",
          request.url,
          response.status
        ));
      }
      debug!(url = %request.url, status = response.status, "pre-cached");
      entries.push((request, response));
    }

    self.storage.put_all(&self.version, &entries)?;
    Ok(entries.len())
  }

  /// Delete every store except the current one and take control of clients.
  ///
  /// A store that fails to delete is logged and skipped. Deletion cannot be
  /// undone.
  pub async fn activate(&mut self) -> Result<ActivateOutcome> {
    if !matches!(self.state, WorkerState::Installed | WorkerState::Activated) {
      return Err(eyre!(
        "Cannot activate {} from state {:?}",
        self.version,
        self.state
      ));
    }
    let previous = self.state;
    self.state = WorkerState::Activating;

    let names = match self.storage.keys() {
      Ok(names) => names,
      Err(e) => {
        self.state = previous;
        return Err(e);
      }
    };

    let mut deleted = Vec::new();
    for name in names.into_iter().filter(|name| *name != self.version) {
      match self.storage.delete(&name) {
        Ok(true) => {
          info!(store = %name, "deleted stale store");
          deleted.push(name);
        }
        Ok(false) => {}
        Err(e) => warn!(store = %name, error = %e, "failed to delete stale store"),
      }
    }

    self.state = WorkerState::Activated;
    info!(version = %self.version, deleted = deleted.len(), "activated");
    Ok(ActivateOutcome {
      deleted,
      claimed: true,
    })
  }

  /// Handle an intercepted request.
  ///
  /// Only an activated worker controls the page; before that every request
  /// goes straight to the network.
  pub async fn handle_fetch(&self, request: Request) -> Dispatch {
    if self.state != WorkerState::Activated {
      debug!(url = %request.url, state = ?self.state, "worker not active, not intercepting");
      return Dispatch::Bypass(request);
    }
    self.router.dispatch(request).await
  }
}
