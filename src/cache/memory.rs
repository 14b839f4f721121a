//! In-memory store backend.

use chrono::Utc;
use color_eyre::{eyre::eyre, Result};
use std::collections::HashMap;
use std::sync::Mutex;

use super::key::request_key;
use super::traits::{CacheStorage, CachedResponse};
use crate::http::{Request, Response};

/// Store backend that keeps everything in process memory.
///
/// Used for tests and for runs that should not touch the disk.
#[derive(Default)]
pub struct MemoryStorage {
  // Vec keeps creation order for `keys()`
  stores: Mutex<Vec<(String, HashMap<String, CachedResponse>)>>,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }
}

fn reject_non_get(request: &Request) -> Result<()> {
  if request.is_get() {
    Ok(())
  } else {
    Err(eyre!(
      "Refusing to store {} request for {}",
      request.method,
      request.url
    ))
  }
}

fn entries_mut<'a>(
  stores: &'a mut Vec<(String, HashMap<String, CachedResponse>)>,
  store: &str,
) -> &'a mut HashMap<String, CachedResponse> {
  let index = match stores.iter().position(|(name, _)| name == store) {
    Some(index) => index,
    None => {
      stores.push((store.to_string(), HashMap::new()));
      stores.len() - 1
    }
  };
  &mut stores[index].1
}

impl CacheStorage for MemoryStorage {
  fn keys(&self) -> Result<Vec<String>> {
    let stores = self
      .stores
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(stores.iter().map(|(name, _)| name.clone()).collect())
  }

  fn has(&self, store: &str) -> Result<bool> {
    let stores = self
      .stores
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(stores.iter().any(|(name, _)| name == store))
  }

  fn delete(&self, store: &str) -> Result<bool> {
    let mut stores = self
      .stores
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    let before = stores.len();
    stores.retain(|(name, _)| name != store);
    Ok(stores.len() != before)
  }

  fn match_request(&self, store: &str, request: &Request) -> Result<Option<CachedResponse>> {
    if !request.is_get() {
      return Ok(None);
    }
    let stores = self
      .stores
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    let key = request_key(&request.url);
    Ok(
      stores
        .iter()
        .find(|(name, _)| name == store)
        .and_then(|(_, entries)| entries.get(&key).cloned()),
    )
  }

  fn put(&self, store: &str, request: &Request, response: &Response) -> Result<()> {
    reject_non_get(request)?;
    let mut stores = self
      .stores
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    entries_mut(&mut stores, store).insert(
      request_key(&request.url),
      CachedResponse {
        response: response.clone(),
        cached_at: Utc::now(),
      },
    );
    Ok(())
  }

  fn put_all(&self, store: &str, entries: &[(Request, Response)]) -> Result<()> {
    // Validate everything before taking the lock so a bad entry writes nothing
    for (request, _) in entries {
      reject_non_get(request)?;
    }

    let mut stores = self
      .stores
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    let now = Utc::now();
    let target = entries_mut(&mut stores, store);
    for (request, response) in entries {
      target.insert(
        request_key(&request.url),
        CachedResponse {
          response: response.clone(),
          cached_at: now,
        },
      );
    }
    Ok(())
  }

  fn entry_count(&self, store: &str) -> Result<usize> {
    let stores = self
      .stores
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(
      stores
        .iter()
        .find(|(name, _)| name == store)
        .map(|(_, entries)| entries.len())
        .unwrap_or(0),
    )
  }
}
