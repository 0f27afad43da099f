//! Maps an incoming request to the partition role and strategy serving it.

use url::Url;

use crate::fetch::{Destination, Request};

/// Logical resource category; each role owns one partition per version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
  Static,
  Images,
  Fonts,
  Api,
  Pages,
}

impl Role {
  pub const ALL: [Role; 5] = [
    Role::Static,
    Role::Images,
    Role::Fonts,
    Role::Api,
    Role::Pages,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      Role::Static => "static",
      Role::Images => "images",
      Role::Fonts => "fonts",
      Role::Api => "api",
      Role::Pages => "pages",
    }
  }
}

/// The caching algorithm bound to a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
  CacheFirst,
  NetworkFirst,
  StaleWhileRevalidate,
}

/// Outcome of classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
  /// Serve through the given role's partition with the given strategy.
  Cached { role: Role, strategy: Strategy },
  /// Forward to the network untouched; no partition is consulted or written.
  Passthrough,
}

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "svg", "ico", "avif"];
const FONT_EXTENSIONS: &[&str] = &["woff", "woff2", "ttf", "otf", "eot"];

/// Classify a request. Pure function of the request's URL shape and
/// destination; rules are evaluated in fixed priority order and the first
/// match wins, so an HTML document under the API prefix is still API.
pub fn classify(request: &Request, api_prefix: &str) -> Classification {
  // 1. API path prefix
  if request.url.path().starts_with(api_prefix) {
    return Classification::Cached {
      role: Role::Api,
      strategy: Strategy::NetworkFirst,
    };
  }

  // 2. Documents and navigations
  if request.navigation || request.destination == Destination::Document {
    return Classification::Cached {
      role: Role::Pages,
      strategy: Strategy::StaleWhileRevalidate,
    };
  }

  // 3. Images and fonts by extension
  if let Some(ext) = extension(&request.url) {
    if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
      return Classification::Cached {
        role: Role::Images,
        strategy: Strategy::CacheFirst,
      };
    }
    if FONT_EXTENSIONS.contains(&ext.as_str()) {
      return Classification::Cached {
        role: Role::Fonts,
        strategy: Strategy::CacheFirst,
      };
    }
  }

  // 4. Content-hashed build artifacts
  if is_hashed_asset(&request.url) {
    return Classification::Cached {
      role: Role::Static,
      strategy: Strategy::CacheFirst,
    };
  }

  Classification::Passthrough
}

/// Lowercased file extension of the URL path, if any.
fn extension(url: &Url) -> Option<String> {
  let file = url.path_segments()?.last()?;
  let (stem, ext) = file.rsplit_once('.')?;
  if stem.is_empty() || ext.is_empty() {
    return None;
  }
  Some(ext.to_lowercase())
}

/// Whether the URL names a script or stylesheet carrying a build-time
/// revision marker, e.g. `app.3f9a1c2d.js`. Presence of the marker means the
/// content is immutable for that name.
fn is_hashed_asset(url: &Url) -> bool {
  let file = match url.path_segments().and_then(|s| s.last()) {
    Some(f) => f,
    None => return false,
  };

  let mut parts = file.rsplitn(3, '.');
  let ext = parts.next().unwrap_or("");
  let revision = parts.next().unwrap_or("");
  let stem = parts.next().unwrap_or("");

  if stem.is_empty() || !matches!(ext.to_lowercase().as_str(), "js" | "css") {
    return false;
  }

  (8..=32).contains(&revision.len())
    && revision
      .chars()
      .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::fetch::Destination;

  const API_PREFIX: &str = "/api/";

  fn get(url: &str) -> Request {
    Request::get(Url::parse(url).unwrap())
  }

  fn cached(role: Role, strategy: Strategy) -> Classification {
    Classification::Cached { role, strategy }
  }

  #[test]
  fn test_api_prefix_is_network_first() {
    let request = get("https://app.example.com/api/tasks?page=2");
    assert_eq!(
      classify(&request, API_PREFIX),
      cached(Role::Api, Strategy::NetworkFirst)
    );
  }

  #[test]
  fn test_api_prefix_wins_over_document() {
    // An HTML document served from the API prefix is still API.
    let request = Request::navigate(Url::parse("https://app.example.com/api/report.html").unwrap());
    assert_eq!(
      classify(&request, API_PREFIX),
      cached(Role::Api, Strategy::NetworkFirst)
    );
  }

  #[test]
  fn test_navigation_is_stale_while_revalidate() {
    let request = Request::navigate(Url::parse("https://app.example.com/orgs/42").unwrap());
    assert_eq!(
      classify(&request, API_PREFIX),
      cached(Role::Pages, Strategy::StaleWhileRevalidate)
    );
  }

  #[test]
  fn test_document_destination_without_navigation_flag() {
    let request =
      get("https://app.example.com/frame.html").with_destination(Destination::Document);
    assert_eq!(
      classify(&request, API_PREFIX),
      cached(Role::Pages, Strategy::StaleWhileRevalidate)
    );
  }

  #[test]
  fn test_image_extensions_are_cache_first() {
    for url in [
      "https://cdn.example.com/avatars/u42.png",
      "https://cdn.example.com/logo.SVG",
      "https://cdn.example.com/photo.webp",
    ] {
      assert_eq!(
        classify(&get(url), API_PREFIX),
        cached(Role::Images, Strategy::CacheFirst),
        "{}",
        url
      );
    }
  }

  #[test]
  fn test_font_extensions_are_cache_first() {
    let request = get("https://cdn.example.com/fonts/inter.woff2");
    assert_eq!(
      classify(&request, API_PREFIX),
      cached(Role::Fonts, Strategy::CacheFirst)
    );
  }

  #[test]
  fn test_hashed_script_and_style_are_static() {
    for url in [
      "https://app.example.com/assets/app.3f9a1c2d.js",
      "https://app.example.com/assets/main.0123456789abcdef.css",
    ] {
      assert_eq!(
        classify(&get(url), API_PREFIX),
        cached(Role::Static, Strategy::CacheFirst),
        "{}",
        url
      );
    }
  }

  #[test]
  fn test_unhashed_script_is_passthrough() {
    // No revision marker, so nothing guarantees immutability.
    assert_eq!(
      classify(&get("https://app.example.com/assets/app.js"), API_PREFIX),
      Classification::Passthrough
    );
    // Marker too short
    assert_eq!(
      classify(&get("https://app.example.com/assets/app.ab12.js"), API_PREFIX),
      Classification::Passthrough
    );
    // Marker not hex
    assert_eq!(
      classify(
        &get("https://app.example.com/assets/app.notahash0.js"),
        API_PREFIX
      ),
      Classification::Passthrough
    );
  }

  #[test]
  fn test_everything_else_is_passthrough() {
    for url in [
      "https://app.example.com/ws/feed",
      "https://app.example.com/download/export.csv",
      "https://other.example.net/",
    ] {
      assert_eq!(classify(&get(url), API_PREFIX), Classification::Passthrough, "{}", url);
    }
  }
}
