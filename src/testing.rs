//! Test doubles for the store and the network.

use color_eyre::{eyre::eyre, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use url::Url;

use crate::cache::{CacheStorage, CachedResponse, MemoryStorage};
use crate::http::{Request, Response};
use crate::net::Fetcher;

pub fn url(s: &str) -> Url {
  Url::parse(s).unwrap()
}

/// Fetcher that answers from a fixed table.
///
/// URLs missing from the table fail like an unreachable host, and so does
/// every URL once `go_offline` has been called.
#[derive(Default)]
pub struct FakeFetcher {
  replies: HashMap<String, Response>,
  offline: AtomicBool,
  calls: AtomicUsize,
  requested: Mutex<Vec<String>>,
}

impl FakeFetcher {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn respond(mut self, target: &str, response: Response) -> Self {
    self.replies.insert(url(target).to_string(), response);
    self
  }

  pub fn go_offline(&self) {
    self.offline.store(true, Ordering::SeqCst);
  }

  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }

  pub fn requested(&self) -> Vec<String> {
    self.requested.lock().unwrap().clone()
  }
}

impl Fetcher for FakeFetcher {
  async fn fetch(&self, request: &Request) -> Result<Response> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    self.requested.lock().unwrap().push(request.url.to_string());

    if self.offline.load(Ordering::SeqCst) {
      return Err(eyre!("Failed to fetch {}: network is offline", request.url));
    }

    self
      .replies
      .get(request.url.as_str())
      .cloned()
      .ok_or_else(|| eyre!("Failed to fetch {}: connection refused", request.url))
  }
}

/// Store whose every operation fails.
pub struct FailingStorage;

impl CacheStorage for FailingStorage {
  fn keys(&self) -> Result<Vec<String>> {
    Err(eyre!("store unavailable"))
  }

  fn has(&self, _store: &str) -> Result<bool> {
    Err(eyre!("store unavailable"))
  }

  fn delete(&self, _store: &str) -> Result<bool> {
    Err(eyre!("store unavailable"))
  }

  fn match_request(&self, _store: &str, _request: &Request) -> Result<Option<CachedResponse>> {
    Err(eyre!("store unavailable"))
  }

  fn put(&self, _store: &str, _request: &Request, _response: &Response) -> Result<()> {
    Err(eyre!("store unavailable"))
  }

  fn put_all(&self, _store: &str, _entries: &[(Request, Response)]) -> Result<()> {
    Err(eyre!("store unavailable"))
  }

  fn entry_count(&self, _store: &str) -> Result<usize> {
    Err(eyre!("store unavailable"))
  }
}

/// In-memory store whose `keys` can be switched to fail.
#[derive(Default)]
pub struct BrokenKeysStorage {
  inner: MemoryStorage,
  broken: AtomicBool,
}

impl BrokenKeysStorage {
  pub fn break_keys(&self) {
    self.broken.store(true, Ordering::SeqCst);
  }
}

impl CacheStorage for BrokenKeysStorage {
  fn keys(&self) -> Result<Vec<String>> {
    if self.broken.load(Ordering::SeqCst) {
      return Err(eyre!("store unavailable"));
    }
    self.inner.keys()
  }

  fn has(&self, store: &str) -> Result<bool> {
    self.inner.has(store)
  }

  fn delete(&self, store: &str) -> Result<bool> {
    self.inner.delete(store)
  }

  fn match_request(&self, store: &str, request: &Request) -> Result<Option<CachedResponse>> {
    self.inner.match_request(store, request)
  }

  fn put(&self, store: &str, request: &Request, response: &Response) -> Result<()> {
    self.inner.put(store, request, response)
  }

  fn put_all(&self, store: &str, entries: &[(Request, Response)]) -> Result<()> {
    self.inner.put_all(store, entries)
  }

  fn entry_count(&self, store: &str) -> Result<usize> {
    self.inner.entry_count(store)
  }
}
