//! The three caching strategies.
//!
//! All three share one shape: `execute(strategy, request, partition)` always
//! produces a `Response` unless the network failed and no cached fallback
//! applies, in which case the original network failure is surfaced.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::classify::Strategy;
use crate::fetch::{FetchError, Fetcher, Request, Response};
use crate::store::{PartitionStore, StoredResponse};

/// Runs the strategy selected by the classifier against one partition.
pub struct StrategyRunner<S, F> {
  store: Arc<S>,
  fetcher: Arc<F>,
  /// How long network-first waits before falling back to the partition
  network_timeout: Duration,
  /// Oldest a cached entry may be and still serve as a network-first fallback
  api_max_age: chrono::Duration,
}

impl<S, F> StrategyRunner<S, F>
where
  S: PartitionStore + 'static,
  F: Fetcher,
{
  pub fn new(
    store: Arc<S>,
    fetcher: Arc<F>,
    network_timeout: Duration,
    api_max_age: chrono::Duration,
  ) -> Self {
    Self {
      store,
      fetcher,
      network_timeout,
      api_max_age,
    }
  }

  pub async fn execute(
    &self,
    strategy: Strategy,
    request: &Request,
    partition: &str,
  ) -> Result<Response, FetchError> {
    match strategy {
      Strategy::CacheFirst => self.cache_first(request, partition).await,
      Strategy::NetworkFirst => self.network_first(request, partition).await,
      Strategy::StaleWhileRevalidate => self.stale_while_revalidate(request, partition).await,
    }
  }

  /// Serve from the partition if present, never touching the network; on a
  /// miss, fetch and write through. Cached presence implies validity here
  /// (hashed assets are immutable), so there is no freshness check.
  async fn cache_first(&self, request: &Request, partition: &str) -> Result<Response, FetchError> {
    let key = request.cache_key();

    if let Some(entry) = self.read_entry(partition, &key) {
      return Ok(entry.into_response());
    }

    let response = self.fetcher.fetch(request).await?;
    if !response.is_success() {
      return Err(FetchError::Status(response.status));
    }
    write_through(self.store.as_ref(), partition, &key, &response);
    Ok(response)
  }

  /// Race the network against the timeout; fall back to the partition only
  /// for entries younger than the max age, otherwise surface the original
  /// failure. Losing the race does not cancel the fetch: it keeps running
  /// detached and a late success still refreshes the partition.
  async fn network_first(&self, request: &Request, partition: &str) -> Result<Response, FetchError> {
    let key = request.cache_key();

    let fetch = self.fetcher.fetch(request);
    let store = Arc::clone(&self.store);
    let task_partition = partition.to_string();
    let task_key = key.clone();
    let handle = tokio::spawn(async move {
      let result = fetch.await;
      if let Ok(response) = &result {
        if response.is_success() {
          write_through(store.as_ref(), &task_partition, &task_key, response);
        }
      }
      result
    });

    let failure = match tokio::time::timeout(self.network_timeout, handle).await {
      Ok(Ok(Ok(response))) if response.is_success() => return Ok(response),
      Ok(Ok(Ok(response))) => FetchError::Status(response.status),
      Ok(Ok(Err(error))) => error,
      Ok(Err(join_error)) => FetchError::Network(join_error.to_string()),
      Err(_) => FetchError::Timeout,
    };

    if let Some(entry) = self.read_entry(partition, &key) {
      if Utc::now() - entry.stored_at <= self.api_max_age {
        debug!(partition, "network first falling back to cached entry");
        return Ok(entry.into_response());
      }
      debug!(partition, "cached entry exceeds max age, surfacing network failure");
    }

    Err(failure)
  }

  /// Serve the cached entry immediately and refresh it from the network in a
  /// detached task; if nothing is cached yet, await the network directly.
  async fn stale_while_revalidate(
    &self,
    request: &Request,
    partition: &str,
  ) -> Result<Response, FetchError> {
    let key = request.cache_key();

    if let Some(entry) = self.read_entry(partition, &key) {
      self.spawn_revalidation(request, partition, &key);
      return Ok(entry.into_response());
    }

    let response = self.fetcher.fetch(request).await?;
    if response.is_success() {
      write_through(self.store.as_ref(), partition, &key, &response);
    }
    Ok(response)
  }

  /// Fire-and-forget background refresh. The caller already has a response,
  /// so every failure path here is swallowed by contract.
  fn spawn_revalidation(&self, request: &Request, partition: &str, key: &str) {
    let fetch = self.fetcher.fetch(request);
    let store = Arc::clone(&self.store);
    let partition = partition.to_string();
    let key = key.to_string();

    tokio::spawn(async move {
      match fetch.await {
        Ok(response) if response.is_success() => {
          write_through(store.as_ref(), &partition, &key, &response);
        }
        Ok(response) => {
          debug!(partition, status = response.status, "revalidation returned non-success");
        }
        Err(error) => {
          debug!(partition, %error, "revalidation failed");
        }
      }
    });
  }

  /// Partition read that treats store failures as misses so a broken store
  /// degrades to a failed fetch rather than a crash.
  fn read_entry(&self, partition: &str, key: &str) -> Option<StoredResponse> {
    match self.store.read(partition, key) {
      Ok(entry) => entry,
      Err(error) => {
        warn!(partition, %error, "cache read failed");
        None
      }
    }
  }
}

/// Write a successful response into the partition; failures are logged, the
/// response is served regardless.
fn write_through<S: PartitionStore + ?Sized>(
  store: &S,
  partition: &str,
  key: &str,
  response: &Response,
) {
  if let Err(error) = store.write(partition, key, &StoredResponse::snapshot(response)) {
    warn!(partition, %error, "cache write failed");
  }
}
