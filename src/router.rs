//! Per-request routing: pick a strategy from the request's host and run it.
//!
//! Every GET request ends in a response. Network failures never escape: each
//! strategy turns them into a stored copy or a synthesized stand-in. Only
//! non-GET requests are handed back to the caller untouched.
//!
//! Successful network responses are written to the store on a blocking task
//! that the request does not wait for. A failed write is logged and dropped,
//! and a request that arrives before the write lands simply misses the store.

use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::cache::CacheStorage;
use crate::http::{Request, Response};
use crate::net::Fetcher;
use crate::route::{classify, Route, Strategy};

/// Where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
  /// Fresh from the network
  Network,
  /// Read from the current store
  Cache,
  /// Synthesized because neither network nor store could answer
  Substitute,
}

/// A response produced by the router, with how it was obtained.
#[derive(Debug, Clone)]
pub struct Served {
  pub response: Response,
  pub route: Route,
  pub source: Source,
}

/// Outcome of offering a request to the router.
#[derive(Debug)]
pub enum Dispatch {
  /// Not intercepted; the caller sends the request itself
  Bypass(Request),
  /// Intercepted and answered
  Respond(Served),
}

/// Routes intercepted requests between the network and the current store.
pub struct Router<S: CacheStorage, F: Fetcher> {
  storage: Arc<S>,
  fetcher: Arc<F>,
  version: Arc<str>,
  writes: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl<S: CacheStorage, F: Fetcher> Router<S, F> {
  /// Create a router serving from the store named `version`.
  pub fn new(storage: Arc<S>, fetcher: Arc<F>, version: &str) -> Self {
    Self {
      storage,
      fetcher,
      version: Arc::from(version),
      writes: Arc::new(Mutex::new(Vec::new())),
    }
  }

  /// Offer a request to the router.
  ///
  /// Non-GET requests are returned as `Bypass` without touching the store or
  /// the network. Everything else is classified and answered.
  pub async fn dispatch(&self, request: Request) -> Dispatch {
    if !request.is_get() {
      debug!(method = %request.method, url = %request.url, "bypassing non-GET request");
      return Dispatch::Bypass(request);
    }

    let route = classify(&request.url);
    let (response, source) = self.serve(route.strategy(), &request).await;
    debug!(
      url = %request.url,
      route = route.name(),
      status = response.status,
      ?source,
      "served request"
    );

    Dispatch::Respond(Served {
      response,
      route,
      source,
    })
  }

  /// Run one strategy for a GET request.
  pub async fn serve(&self, strategy: Strategy, request: &Request) -> (Response, Source) {
    match strategy {
      Strategy::NetworkOnly => self.network_only(request).await,
      Strategy::CacheFirst => self.cache_first(request).await,
      Strategy::NetworkFirst => self.network_first(request).await,
    }
  }

  async fn network_only(&self, request: &Request) -> (Response, Source) {
    match self.fetcher.fetch(request).await {
      Ok(response) => (response, Source::Network),
      Err(e) => {
        warn!(url = %request.url, error = %e, "network unavailable, serving offline JSON");
        (Response::offline_json(), Source::Substitute)
      }
    }
  }

  async fn cache_first(&self, request: &Request) -> (Response, Source) {
    if let Some(response) = self.lookup(request) {
      return (response, Source::Cache);
    }

    match self.fetcher.fetch(request).await {
      Ok(response) => {
        if response.ok() {
          self.store_in_background(request, &response);
        }
        (response, Source::Network)
      }
      Err(e) => {
        warn!(url = %request.url, error = %e, "cache miss and network unavailable");
        (Response::request_timeout(), Source::Substitute)
      }
    }
  }

  async fn network_first(&self, request: &Request) -> (Response, Source) {
    match self.fetcher.fetch(request).await {
      Ok(response) => {
        if response.ok() {
          self.store_in_background(request, &response);
        }
        (response, Source::Network)
      }
      Err(e) => match self.lookup(request) {
        Some(response) => {
          debug!(url = %request.url, error = %e, "network unavailable, serving stored copy");
          (response, Source::Cache)
        }
        None => {
          warn!(url = %request.url, error = %e, "network unavailable and page not cached");
          (Response::not_cached(), Source::Substitute)
        }
      },
    }
  }

  /// Read the current store. Read errors count as a miss.
  fn lookup(&self, request: &Request) -> Option<Response> {
    match self.storage.match_request(&self.version, request) {
      Ok(Some(cached)) => {
        debug!(url = %request.url, cached_at = %cached.cached_at, "store hit");
        Some(cached.response)
      }
      Ok(None) => None,
      Err(e) => {
        debug!(url = %request.url, error = %e, "store read failed, treating as miss");
        None
      }
    }
  }

  /// Write a copy of the response to the current store without waiting.
  fn store_in_background(&self, request: &Request, response: &Response) {
    let storage = Arc::clone(&self.storage);
    let version = Arc::clone(&self.version);
    let request = request.clone();
    let response = response.clone();

    let handle = tokio::task::spawn_blocking(move || {
      if let Err(e) = storage.put(&version, &request, &response) {
        debug!(url = %request.url, error = %e, "background store write failed");
      }
    });

    let mut writes = match self.writes.lock() {
      Ok(writes) => writes,
      Err(poisoned) => poisoned.into_inner(),
    };
    writes.retain(|h| !h.is_finished());
    writes.push(handle);
  }

  /// Wait for every background store write started so far.
  ///
  /// Responses never wait on this. It exists for hosts that are about to
  /// exit and would otherwise abandon pending writes.
  pub async fn drain_writes(&self) {
    let pending = {
      let mut writes = match self.writes.lock() {
        Ok(writes) => writes,
        Err(poisoned) => poisoned.into_inner(),
      };
      std::mem::take(&mut *writes)
    };

    for handle in pending {
      if let Err(e) = handle.await {
        debug!(error = %e, "background store write task failed");
      }
    }
  }
}

impl<S: CacheStorage, F: Fetcher> Clone for Router<S, F> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      fetcher: Arc::clone(&self.fetcher),
      version: Arc::clone(&self.version),
      writes: Arc::clone(&self.writes),
    }
  }
}
