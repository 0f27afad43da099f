//! Request/response types, the network fetcher trait, and cache key derivation.

use futures::future::BoxFuture;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use url::Url;

/// What kind of resource a request is for, as reported by the requester.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
  /// Top-level or framed HTML document
  Document,
  Script,
  Style,
  Image,
  Font,
  /// Anything else (fetch/XHR, media, workers, ...)
  Other,
}

/// An outbound request as seen by the caching layer.
///
/// The layer never inspects request bodies, so none is carried here.
#[derive(Debug, Clone)]
pub struct Request {
  pub method: String,
  pub url: Url,
  pub headers: HashMap<String, String>,
  pub destination: Destination,
  /// True for top-level navigations.
  pub navigation: bool,
}

impl Request {
  /// A plain GET request for a URL.
  pub fn get(url: Url) -> Self {
    Self {
      method: "GET".to_string(),
      url,
      headers: HashMap::new(),
      destination: Destination::Other,
      navigation: false,
    }
  }

  /// A top-level navigation request for a document.
  pub fn navigate(url: Url) -> Self {
    Self {
      method: "GET".to_string(),
      url,
      headers: HashMap::new(),
      destination: Destination::Document,
      navigation: true,
    }
  }

  pub fn with_destination(mut self, destination: Destination) -> Self {
    self.destination = destination;
    self
  }

  pub fn with_header(mut self, name: &str, value: &str) -> Self {
    self.headers.insert(name.to_lowercase(), value.to_string());
    self
  }

  /// Look up a header by name, case-insensitively.
  pub fn header(&self, name: &str) -> Option<&str> {
    let name = name.to_lowercase();
    self
      .headers
      .iter()
      .find(|(k, _)| k.to_lowercase() == name)
      .map(|(_, v)| v.as_str())
  }

  /// Canonical cache key for this request: method, absolute URL and the
  /// `Accept` header (the one header strategies vary on).
  ///
  /// SHA256 hash for stable, fixed-length keys.
  pub fn cache_key(&self) -> String {
    let accept = self.header("accept").unwrap_or("");

    let mut hasher = Sha256::new();
    hasher.update(self.method.as_bytes());
    hasher.update(b"\n");
    hasher.update(self.url.as_str().as_bytes());
    hasher.update(b"\n");
    hasher.update(accept.as_bytes());
    hex::encode(hasher.finalize())
  }
}

/// A response as returned to the application: indistinguishable from a
/// normal network response whether it came from the network or a partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
  pub status: u16,
  pub headers: HashMap<String, String>,
  pub body: Vec<u8>,
}

impl Response {
  pub fn new(status: u16, body: Vec<u8>) -> Self {
    Self {
      status,
      headers: HashMap::new(),
      body,
    }
  }

  pub fn with_header(mut self, name: &str, value: &str) -> Self {
    self.headers.insert(name.to_lowercase(), value.to_string());
    self
  }

  /// Whether this response has a success (2xx) status.
  pub fn is_success(&self) -> bool {
    (200..=299).contains(&self.status)
  }
}

/// Per-request fetch failures the strategies branch on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
  /// Transport-level failure (DNS, connect, TLS, dropped connection)
  Network(String),
  /// The fetch did not complete within the configured deadline
  Timeout,
  /// The server answered, but with a non-success status
  Status(u16),
}

impl std::fmt::Display for FetchError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::Network(msg) => write!(f, "network error: {}", msg),
      Self::Timeout => write!(f, "network request timed out"),
      Self::Status(status) => write!(f, "unexpected response status {}", status),
    }
  }
}

impl std::error::Error for FetchError {}

/// Network access used by the strategies and the precache loader.
///
/// Object-safe so executors can hand the returned future to a detached task;
/// implementations clone whatever request state they need.
pub trait Fetcher: Send + Sync + 'static {
  fn fetch(&self, request: &Request) -> BoxFuture<'static, Result<Response, FetchError>>;
}

/// Real network fetcher backed by reqwest.
#[derive(Clone)]
pub struct HttpFetcher {
  client: reqwest::Client,
}

impl HttpFetcher {
  pub fn new() -> Self {
    Self {
      client: reqwest::Client::new(),
    }
  }
}

impl Default for HttpFetcher {
  fn default() -> Self {
    Self::new()
  }
}

impl Fetcher for HttpFetcher {
  fn fetch(&self, request: &Request) -> BoxFuture<'static, Result<Response, FetchError>> {
    let client = self.client.clone();
    let method = request.method.clone();
    let url = request.url.clone();
    let headers = request.headers.clone();

    Box::pin(async move {
      let method = reqwest::Method::from_bytes(method.as_bytes())
        .map_err(|e| FetchError::Network(format!("invalid method {}: {}", method, e)))?;

      let mut builder = client.request(method, url.as_str());
      for (name, value) in &headers {
        builder = builder.header(name, value);
      }

      let response = builder
        .send()
        .await
        .map_err(|e| FetchError::Network(e.to_string()))?;

      let status = response.status().as_u16();
      let headers = response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
          value
            .to_str()
            .ok()
            .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();
      let body = response
        .bytes()
        .await
        .map_err(|e| FetchError::Network(e.to_string()))?
        .to_vec();

      Ok(Response {
        status,
        headers,
        body,
      })
    })
  }
}

/// Scripted fetcher for tests: fixed outcomes per URL, optional delay,
/// shared call counter.
#[cfg(test)]
pub mod fake {
  use super::*;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::{Arc, Mutex};
  use std::time::Duration;

  #[derive(Clone, Default)]
  pub struct FakeFetcher {
    routes: Arc<Mutex<HashMap<String, Result<Response, FetchError>>>>,
    delay: Arc<Mutex<Option<Duration>>>,
    calls: Arc<AtomicUsize>,
  }

  impl FakeFetcher {
    pub fn new() -> Self {
      Self::default()
    }

    /// Route a URL to a 200 response with the given body.
    pub fn ok(self, url: &str, body: &[u8]) -> Self {
      self.route(url, Ok(Response::new(200, body.to_vec())))
    }

    /// Route a URL to a response with the given status.
    pub fn status(self, url: &str, status: u16) -> Self {
      self.route(url, Ok(Response::new(status, Vec::new())))
    }

    /// Route a URL to a fetch failure.
    pub fn fail(self, url: &str, error: FetchError) -> Self {
      self.route(url, Err(error))
    }

    pub fn route(self, url: &str, outcome: Result<Response, FetchError>) -> Self {
      self.routes.lock().unwrap().insert(url.to_string(), outcome);
      self
    }

    /// Delay every fetch by the given duration (tokio sleep, so paused-time
    /// tests can control it).
    pub fn with_delay(self, delay: Duration) -> Self {
      *self.delay.lock().unwrap() = Some(delay);
      self
    }

    /// Replace a route after construction (e.g. for revalidation tests).
    pub fn set_route(&self, url: &str, outcome: Result<Response, FetchError>) {
      self.routes.lock().unwrap().insert(url.to_string(), outcome);
    }

    pub fn calls(&self) -> usize {
      self.calls.load(Ordering::SeqCst)
    }
  }

  impl Fetcher for FakeFetcher {
    fn fetch(&self, request: &Request) -> BoxFuture<'static, Result<Response, FetchError>> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      let outcome = self
        .routes
        .lock()
        .unwrap()
        .get(request.url.as_str())
        .cloned()
        .unwrap_or_else(|| Err(FetchError::Network(format!("no route for {}", request.url))));
      let delay = *self.delay.lock().unwrap();

      Box::pin(async move {
        if let Some(delay) = delay {
          tokio::time::sleep(delay).await;
        }
        outcome
      })
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
  }

  #[test]
  fn test_cache_key_is_deterministic() {
    let a = Request::get(url("https://app.example.com/api/tasks"));
    let b = Request::get(url("https://app.example.com/api/tasks"));
    assert_eq!(a.cache_key(), b.cache_key());
  }

  #[test]
  fn test_cache_key_varies_with_url_and_method() {
    let a = Request::get(url("https://app.example.com/api/tasks"));
    let b = Request::get(url("https://app.example.com/api/orgs"));
    assert_ne!(a.cache_key(), b.cache_key());

    let mut head = Request::get(url("https://app.example.com/api/tasks"));
    head.method = "HEAD".to_string();
    assert_ne!(a.cache_key(), head.cache_key());
  }

  #[test]
  fn test_cache_key_varies_with_accept_header() {
    let plain = Request::get(url("https://app.example.com/api/tasks"));
    let json = Request::get(url("https://app.example.com/api/tasks"))
      .with_header("Accept", "application/json");
    assert_ne!(plain.cache_key(), json.cache_key());
  }

  #[test]
  fn test_header_lookup_is_case_insensitive() {
    let request =
      Request::get(url("https://app.example.com/")).with_header("Accept", "text/html");
    assert_eq!(request.header("accept"), Some("text/html"));
    assert_eq!(request.header("ACCEPT"), Some("text/html"));
    assert_eq!(request.header("authorization"), None);
  }

  #[test]
  fn test_response_success_range() {
    assert!(Response::new(200, Vec::new()).is_success());
    assert!(Response::new(204, Vec::new()).is_success());
    assert!(!Response::new(304, Vec::new()).is_success());
    assert!(!Response::new(500, Vec::new()).is_success());
  }
}
