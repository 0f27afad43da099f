//! Partition store trait and the stored response snapshot.

use chrono::{DateTime, Utc};
use color_eyre::Result;
use std::collections::HashMap;

use crate::fetch::Response;

/// A response snapshot as it lives inside a partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredResponse {
  pub status: u16,
  pub headers: HashMap<String, String>,
  pub body: Vec<u8>,
  /// When the snapshot was written; consulted by the network-first strategy
  /// to bound how stale a fallback may be.
  pub stored_at: DateTime<Utc>,
}

impl StoredResponse {
  /// Snapshot a network response with the current time as insertion timestamp.
  pub fn snapshot(response: &Response) -> Self {
    Self {
      status: response.status,
      headers: response.headers.clone(),
      body: response.body.clone(),
      stored_at: Utc::now(),
    }
  }

  pub fn into_response(self) -> Response {
    Response {
      status: self.status,
      headers: self.headers,
      body: self.body,
    }
  }
}

/// Trait for partition store backends.
///
/// Per-key reads and writes are atomic; there are no cross-key transactions.
/// Partitions come into existence on first write and are only ever removed
/// wholesale via `delete_partition`.
pub trait PartitionStore: Send + Sync {
  /// Read the entry for `key` in `partition`. Absence is a miss, not an error.
  fn read(&self, partition: &str, key: &str) -> Result<Option<StoredResponse>>;

  /// Insert or overwrite the entry for `key` in `partition` (last writer wins).
  fn write(&self, partition: &str, key: &str, entry: &StoredResponse) -> Result<()>;

  /// Names of all partitions currently in durable storage.
  fn partitions(&self) -> Result<Vec<String>>;

  /// Delete a partition and everything in it. Returns whether it existed.
  fn delete_partition(&self, partition: &str) -> Result<bool>;

  /// Number of entries in a partition (zero if it does not exist).
  fn entry_count(&self, partition: &str) -> Result<usize>;
}
