//! Install-time precaching of the critical asset manifest.

use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::fetch::{Fetcher, Request};
use crate::store::{PartitionStore, StoredResponse};

/// One precache target: a URL plus the build-time revision of its content.
#[derive(Debug, Clone, Deserialize)]
pub struct ManifestEntry {
  pub url: String,
  /// Revision of the content at this URL; `None` for URLs that embed their
  /// revision in the name (content-hashed assets).
  #[serde(default)]
  pub revision: Option<String>,
}

impl ManifestEntry {
  pub fn new(url: impl Into<String>, revision: Option<&str>) -> Self {
    Self {
      url: url.into(),
      revision: revision.map(String::from),
    }
  }
}

/// Fetch every manifest entry and store it into `partition`.
///
/// All-or-nothing: entries are fetched independently and concurrently, but a
/// single network failure or non-success status fails the whole operation and
/// nothing is written, so a version whose application shell is incomplete is
/// never installed.
pub async fn precache<S, F>(
  store: &S,
  fetcher: &F,
  partition: &str,
  manifest: &[ManifestEntry],
) -> Result<()>
where
  S: PartitionStore + ?Sized,
  F: Fetcher + ?Sized,
{
  let fetches = manifest.iter().map(|entry| async move {
    let request = Request::get(fetch_url(entry)?);
    let response = fetcher
      .fetch(&request)
      .await
      .map_err(|e| eyre!("Precache fetch failed for {}: {}", entry.url, e))?;

    if !response.is_success() {
      return Err(eyre!(
        "Precache fetch for {} returned status {}",
        entry.url,
        response.status
      ));
    }

    Ok((entry, response))
  });

  let fetched = futures::future::try_join_all(fetches).await?;

  // Only write once every entry has been fetched successfully.
  for (entry, response) in fetched {
    let bare = Url::parse(&entry.url)
      .map_err(|e| eyre!("Invalid precache URL {}: {}", entry.url, e))?;
    let key = Request::get(bare).cache_key();
    store.write(partition, &key, &StoredResponse::snapshot(&response))?;
    debug!(url = %entry.url, partition, "precached");
  }

  Ok(())
}

/// URL actually fetched for an entry: the entry URL with its revision
/// appended as a cache-busting query parameter. The entry is still stored
/// under the bare URL's key.
fn fetch_url(entry: &ManifestEntry) -> Result<Url> {
  let mut url = Url::parse(&entry.url)
    .map_err(|e| eyre!("Invalid precache URL {}: {}", entry.url, e))?;
  if let Some(revision) = &entry.revision {
    url.query_pairs_mut().append_pair("__rev", revision);
  }
  Ok(url)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::fetch::fake::FakeFetcher;
  use crate::fetch::FetchError;
  use crate::store::MemoryStore;

  const PARTITION: &str = "static-v1.0.0";

  fn manifest() -> Vec<ManifestEntry> {
    vec![
      ManifestEntry::new("https://app.example.com/index.html", Some("a1b2c3")),
      ManifestEntry::new("https://app.example.com/offline.html", Some("d4e5f6")),
      ManifestEntry::new("https://app.example.com/assets/app.3f9a1c2d.js", None),
    ]
  }

  fn key_for(url: &str) -> String {
    Request::get(Url::parse(url).unwrap()).cache_key()
  }

  #[tokio::test]
  async fn test_precache_stores_all_entries_under_bare_urls() {
    let store = MemoryStore::new();
    let fetcher = FakeFetcher::new()
      .ok("https://app.example.com/index.html?__rev=a1b2c3", b"shell")
      .ok("https://app.example.com/offline.html?__rev=d4e5f6", b"offline")
      .ok("https://app.example.com/assets/app.3f9a1c2d.js", b"js");

    precache(&store, &fetcher, PARTITION, &manifest()).await.unwrap();

    assert_eq!(store.entry_count(PARTITION).unwrap(), 3);
    let shell = store
      .read(PARTITION, &key_for("https://app.example.com/index.html"))
      .unwrap()
      .unwrap();
    assert_eq!(shell.body, b"shell");
  }

  #[tokio::test]
  async fn test_precache_fails_wholesale_on_error_status() {
    let store = MemoryStore::new();
    let fetcher = FakeFetcher::new()
      .ok("https://app.example.com/index.html?__rev=a1b2c3", b"shell")
      .status("https://app.example.com/offline.html?__rev=d4e5f6", 500)
      .ok("https://app.example.com/assets/app.3f9a1c2d.js", b"js");

    let result = precache(&store, &fetcher, PARTITION, &manifest()).await;

    assert!(result.is_err());
    assert_eq!(store.entry_count(PARTITION).unwrap(), 0);
  }

  #[tokio::test]
  async fn test_precache_fails_wholesale_on_network_error() {
    let store = MemoryStore::new();
    let fetcher = FakeFetcher::new()
      .ok("https://app.example.com/index.html?__rev=a1b2c3", b"shell")
      .fail(
        "https://app.example.com/offline.html?__rev=d4e5f6",
        FetchError::Network("connection refused".to_string()),
      )
      .ok("https://app.example.com/assets/app.3f9a1c2d.js", b"js");

    let result = precache(&store, &fetcher, PARTITION, &manifest()).await;

    assert!(result.is_err());
    assert_eq!(store.entry_count(PARTITION).unwrap(), 0);
  }

  #[tokio::test]
  async fn test_empty_manifest_precaches_nothing() {
    let store = MemoryStore::new();
    let fetcher = FakeFetcher::new();

    precache(&store, &fetcher, PARTITION, &[]).await.unwrap();

    assert_eq!(fetcher.calls(), 0);
    assert_eq!(store.entry_count(PARTITION).unwrap(), 0);
  }
}
