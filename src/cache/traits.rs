//! Store trait shared by the durable and in-memory backends.

use chrono::{DateTime, Utc};
use color_eyre::Result;

use crate::http::{Request, Response};

/// A response read back from a store.
#[derive(Debug, Clone)]
pub struct CachedResponse {
  /// The stored response
  pub response: Response,
  /// When the response was written
  pub cached_at: DateTime<Utc>,
}

/// Trait for store backends.
///
/// Every operation names the store it acts on. Writes create the store on
/// demand. Implementations must reject non-GET writes and never match a
/// non-GET request.
pub trait CacheStorage: Send + Sync + 'static {
  /// Names of every store present, oldest first.
  fn keys(&self) -> Result<Vec<String>>;

  /// Whether a store with this name exists.
  fn has(&self, store: &str) -> Result<bool>;

  /// Delete a store and all its entries. Returns whether it existed.
  fn delete(&self, store: &str) -> Result<bool>;

  /// Look up the response stored for a request.
  fn match_request(&self, store: &str, request: &Request) -> Result<Option<CachedResponse>>;

  /// Store a response for a request, replacing any previous entry.
  fn put(&self, store: &str, request: &Request, response: &Response) -> Result<()>;

  /// Store several entries at once. Either all of them are written (and the
  /// store exists afterwards) or none are.
  fn put_all(&self, store: &str, entries: &[(Request, Response)]) -> Result<()>;

  /// Number of entries in a store (zero if it does not exist).
  fn entry_count(&self, store: &str) -> Result<usize>;
}
