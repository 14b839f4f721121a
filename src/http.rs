//! Request and response types exchanged between the page, the store and the network.

use bytes::Bytes;
use color_eyre::{eyre::eyre, Result};
use std::fmt;
use std::str::FromStr;
use url::Url;

/// Body served to the page when the weather API is unreachable.
pub const OFFLINE_JSON_BODY: &str = r#"{"error":"offline"}"#;

/// Body served when the page is neither reachable nor cached.
pub const NOT_CACHED_BODY: &str = "オフラインです。ページがキャッシュされていません。";

/// HTTP request method.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
  Get,
  Head,
  Post,
  Put,
  Patch,
  Delete,
  Options,
  Other(String),
}

impl Method {
  pub fn as_str(&self) -> &str {
    match self {
      Method::Get => "GET",
      Method::Head => "HEAD",
      Method::Post => "POST",
      Method::Put => "PUT",
      Method::Patch => "PATCH",
      Method::Delete => "DELETE",
      Method::Options => "OPTIONS",
      Method::Other(m) => m.as_str(),
    }
  }
}

impl FromStr for Method {
  type Err = color_eyre::Report;

  fn from_str(s: &str) -> Result<Self> {
    let upper = s.trim().to_ascii_uppercase();
    if upper.is_empty() {
      return Err(eyre!("Empty HTTP method"));
    }
    Ok(match upper.as_str() {
      "GET" => Method::Get,
      "HEAD" => Method::Head,
      "POST" => Method::Post,
      "PUT" => Method::Put,
      "PATCH" => Method::Patch,
      "DELETE" => Method::Delete,
      "OPTIONS" => Method::Options,
      _ => Method::Other(upper),
    })
  }
}

impl fmt::Display for Method {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// An intercepted outbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
  pub method: Method,
  pub url: Url,
  pub headers: Vec<(String, String)>,
}

impl Request {
  pub fn new(method: Method, url: Url) -> Self {
    Self {
      method,
      url,
      headers: Vec::new(),
    }
  }

  /// Create a GET request with no headers.
  pub fn get(url: Url) -> Self {
    Self::new(Method::Get, url)
  }

  pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.headers.push((name.into(), value.into()));
    self
  }

  pub fn is_get(&self) -> bool {
    self.method == Method::Get
  }
}

/// A response, either from the network, from the store, or synthesized.
///
/// The body is a shared immutable buffer, so cloning a response gives two
/// independently readable copies of the same bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
  pub status: u16,
  pub headers: Vec<(String, String)>,
  pub body: Bytes,
}

impl Response {
  pub fn new(status: u16, headers: Vec<(String, String)>, body: impl Into<Bytes>) -> Self {
    Self {
      status,
      headers,
      body: body.into(),
    }
  }

  /// Stand-in for weather data when the network is down.
  pub fn offline_json() -> Self {
    Self::new(
      200,
      vec![("Content-Type".to_string(), "application/json".to_string())],
      OFFLINE_JSON_BODY,
    )
  }

  /// Empty 408 returned by cache-first routes when the network is down.
  pub fn request_timeout() -> Self {
    Self::new(408, Vec::new(), Bytes::new())
  }

  /// Plain-text 503 returned when a page is neither reachable nor cached.
  pub fn not_cached() -> Self {
    Self::new(
      503,
      vec![(
        "Content-Type".to_string(),
        "text/plain; charset=utf-8".to_string(),
      )],
      NOT_CACHED_BODY,
    )
  }

  /// True for 2xx statuses.
  pub fn ok(&self) -> bool {
    (200..300).contains(&self.status)
  }

  /// Case-insensitive header lookup.
  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(k, _)| k.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }

  /// Body decoded as UTF-8, lossy.
  pub fn text(&self) -> String {
    String::from_utf8_lossy(&self.body).into_owned()
  }
}
