//! In-memory partition store.
//!
//! Not durable; used by tests and as a stand-in when persistence is disabled.

use color_eyre::{eyre::eyre, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::traits::{PartitionStore, StoredResponse};

/// Partition store backed by nested in-process maps.
///
/// Clones share the same underlying maps, so a test can keep a handle and
/// assert on the store's contents after handing a clone to the worker.
#[derive(Clone, Default)]
pub struct MemoryStore {
  partitions: Arc<Mutex<HashMap<String, HashMap<String, StoredResponse>>>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }
}

impl PartitionStore for MemoryStore {
  fn read(&self, partition: &str, key: &str) -> Result<Option<StoredResponse>> {
    let partitions = self
      .partitions
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(
      partitions
        .get(partition)
        .and_then(|entries| entries.get(key))
        .cloned(),
    )
  }

  fn write(&self, partition: &str, key: &str, entry: &StoredResponse) -> Result<()> {
    let mut partitions = self
      .partitions
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    partitions
      .entry(partition.to_string())
      .or_default()
      .insert(key.to_string(), entry.clone());
    Ok(())
  }

  fn partitions(&self) -> Result<Vec<String>> {
    let partitions = self
      .partitions
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(partitions.keys().cloned().collect())
  }

  fn delete_partition(&self, partition: &str) -> Result<bool> {
    let mut partitions = self
      .partitions
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(partitions.remove(partition).is_some())
  }

  fn entry_count(&self, partition: &str) -> Result<usize> {
    let partitions = self
      .partitions
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(partitions.get(partition).map_or(0, HashMap::len))
  }
}
