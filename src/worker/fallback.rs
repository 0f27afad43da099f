//! Last-resort response for navigations that fail both network and cache.

use tracing::warn;
use url::Url;

use crate::fetch::{Request, Response};
use crate::store::PartitionStore;

/// Serve the precached offline document from the static partition.
///
/// The install invariant guarantees the document is there; if it is somehow
/// missing anyway, a generic failure response is synthesized rather than
/// propagating an error.
pub fn offline_fallback<S: PartitionStore + ?Sized>(
  store: &S,
  static_partition: &str,
  offline_url: &Url,
) -> Response {
  let key = Request::get(offline_url.clone()).cache_key();

  match store.read(static_partition, &key) {
    Ok(Some(entry)) => entry.into_response(),
    Ok(None) => {
      warn!(%offline_url, "offline document missing from static partition");
      service_unavailable()
    }
    Err(error) => {
      warn!(%offline_url, %error, "failed to read offline document");
      service_unavailable()
    }
  }
}

fn service_unavailable() -> Response {
  Response::new(503, b"offline".to_vec()).with_header("content-type", "text/plain")
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::store::{MemoryStore, StoredResponse};

  const PARTITION: &str = "static-v1.0.0";

  fn offline_url() -> Url {
    Url::parse("https://app.example.com/offline.html").unwrap()
  }

  #[test]
  fn test_serves_precached_offline_document() {
    let store = MemoryStore::new();
    let key = Request::get(offline_url()).cache_key();
    let doc = StoredResponse::snapshot(
      &Response::new(200, b"<html>offline</html>".to_vec()).with_header("content-type", "text/html"),
    );
    store.write(PARTITION, &key, &doc).unwrap();

    let response = offline_fallback(&store, PARTITION, &offline_url());
    assert_eq!(response.status, 200);
    assert_eq!(response.body, b"<html>offline</html>");
  }

  #[test]
  fn test_missing_document_synthesizes_generic_failure() {
    let store = MemoryStore::new();

    let response = offline_fallback(&store, PARTITION, &offline_url());
    assert_eq!(response.status, 503);
    assert_eq!(response.body, b"offline");
  }
}
