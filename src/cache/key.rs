//! Request descriptor keys.

use sha2::{Digest, Sha256};
use url::Url;

/// Stable key for a GET request, derived from its URL.
///
/// The fragment never reaches the server, so it is dropped before hashing.
pub fn request_key(url: &Url) -> String {
  let input = format!("GET {}", normalize_url(url));

  // SHA256 hash for stable, fixed-length keys
  let mut hasher = Sha256::new();
  hasher.update(input.as_bytes());
  hex::encode(hasher.finalize())
}

/// URL as the store sees it: serialized without its fragment.
pub fn normalize_url(url: &Url) -> String {
  let mut url = url.clone();
  url.set_fragment(None);
  url.to_string()
}
