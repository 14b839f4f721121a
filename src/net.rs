//! Network access for intercepted requests.

use color_eyre::{eyre::eyre, Result};
use std::future::Future;
use std::time::Duration;

use crate::http::{Request, Response};

/// User agent sent with every network request.
const USER_AGENT_VALUE: &str = concat!("trip-sw/", env!("CARGO_PKG_VERSION"));

/// Something that can send a request over the network.
///
/// An `Err` means the request never produced a response (DNS failure,
/// refused connection, timeout, truncated body). HTTP error statuses are
/// returned as `Ok` responses.
pub trait Fetcher: Send + Sync + 'static {
  fn fetch(&self, request: &Request) -> impl Future<Output = Result<Response>> + Send;
}

/// Fetcher backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
  client: reqwest::Client,
}

impl HttpFetcher {
  pub fn new(timeout: Duration) -> Result<Self> {
    let client = reqwest::Client::builder()
      .timeout(timeout)
      .user_agent(USER_AGENT_VALUE)
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client })
  }
}

impl Fetcher for HttpFetcher {
  async fn fetch(&self, request: &Request) -> Result<Response> {
    let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
      .map_err(|e| eyre!("Invalid method {}: {}", request.method, e))?;

    let mut builder = self.client.request(method, request.url.clone());
    for (name, value) in &request.headers {
      builder = builder.header(name.as_str(), value.as_str());
    }

    let response = builder
      .send()
      .await
      .map_err(|e| eyre!("Failed to fetch {}: {}", request.url, e))?;

    let status = response.status().as_u16();
    let headers = response
      .headers()
      .iter()
      .map(|(name, value)| {
        // Values outside visible ASCII are kept, decoded as lossy UTF-8
        (
          name.as_str().to_string(),
          String::from_utf8_lossy(value.as_bytes()).into_owned(),
        )
      })
      .collect();

    let body = response
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read body of {}: {}", request.url, e))?;

    Ok(Response {
      status,
      headers,
      body,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::http::Method;
  use url::Url;
  use wiremock::matchers::{header, method, path};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  fn fetcher() -> HttpFetcher {
    HttpFetcher::new(Duration::from_secs(5)).expect("failed to create fetcher")
  }

  #[tokio::test]
  async fn test_fetch_returns_status_headers_body() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
      .and(path("/index.html"))
      .respond_with(
        ResponseTemplate::new(200)
          .set_body_string("<html></html>")
          .insert_header("content-type", "text/html"),
      )
      .mount(&mock_server)
      .await;

    let url = Url::parse(&format!("{}/index.html", mock_server.uri())).unwrap();
    let response = fetcher().fetch(&Request::get(url)).await.unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.header("Content-Type"), Some("text/html"));
    assert_eq!(response.text(), "<html></html>");
  }

  #[tokio::test]
  async fn test_keeps_non_ascii_header_values() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
      .and(path("/itinerary.pdf"))
      .respond_with(
        ResponseTemplate::new(200)
          .insert_header("content-disposition", "attachment; filename=\"京都.pdf\"")
          .insert_header("x-trip", "kyoto"),
      )
      .mount(&mock_server)
      .await;

    let url = Url::parse(&format!("{}/itinerary.pdf", mock_server.uri())).unwrap();
    let response = fetcher().fetch(&Request::get(url)).await.unwrap();

    assert_eq!(
      response.header("content-disposition"),
      Some("attachment; filename=\"京都.pdf\"")
    );
    assert_eq!(response.header("x-trip"), Some("kyoto"));
  }

  #[tokio::test]
  async fn test_error_status_is_not_a_failure() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
      .and(path("/missing"))
      .respond_with(ResponseTemplate::new(404))
      .mount(&mock_server)
      .await;

    let url = Url::parse(&format!("{}/missing", mock_server.uri())).unwrap();
    let response = fetcher().fetch(&Request::get(url)).await.unwrap();

    assert_eq!(response.status, 404);
    assert!(!response.ok());
  }

  #[tokio::test]
  async fn test_forwards_method_and_headers() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
      .and(path("/submit"))
      .and(header("x-trip", "kyoto"))
      .respond_with(ResponseTemplate::new(201))
      .mount(&mock_server)
      .await;

    let url = Url::parse(&format!("{}/submit", mock_server.uri())).unwrap();
    let request = Request::new(Method::Post, url).with_header("x-trip", "kyoto");
    let response = fetcher().fetch(&request).await.unwrap();

    assert_eq!(response.status, 201);
  }

  #[tokio::test]
  async fn test_connection_refused_is_error() {
    // Grab a free port, then close it so the connection is refused
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    let url = Url::parse(&format!("http://127.0.0.1:{}/", port)).unwrap();

    assert!(fetcher().fetch(&Request::get(url)).await.is_err());
  }
}
