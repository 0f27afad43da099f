//! Versioned partition naming and stale-partition reclamation.

use color_eyre::Result;
use std::collections::HashSet;
use tracing::{info, warn};

use super::classify::Role;
use crate::store::PartitionStore;

/// Owns the mapping from roles to versioned partition names.
///
/// Bumping the version identifier changes every partition name, which forces
/// wholesale cache replacement on the next install/activate cycle.
#[derive(Debug, Clone)]
pub struct PartitionManager {
  version: String,
}

impl PartitionManager {
  pub fn new(version: impl Into<String>) -> Self {
    Self {
      version: version.into(),
    }
  }

  pub fn version(&self) -> &str {
    &self.version
  }

  /// Current partition name for a role, e.g. `static-v1.0.0`.
  pub fn partition_name(&self, role: Role) -> String {
    format!("{}-{}", role.as_str(), self.version)
  }

  /// Partition names referenced by the classifier at the current version.
  pub fn current_set(&self) -> HashSet<String> {
    Role::ALL.iter().map(|role| self.partition_name(*role)).collect()
  }

  /// Delete every durable partition that is not current.
  ///
  /// Single pass, best effort: an individual deletion failure is logged and
  /// does not abort the sweep. Returns the number of partitions deleted.
  pub fn reclaim<S: PartitionStore + ?Sized>(&self, store: &S) -> Result<usize> {
    let current = self.current_set();
    let mut deleted = 0;

    for name in store.partitions()? {
      if current.contains(&name) {
        continue;
      }
      match store.delete_partition(&name) {
        Ok(true) => {
          info!(partition = %name, "reclaimed stale partition");
          deleted += 1;
        }
        Ok(false) => {}
        Err(e) => {
          warn!(partition = %name, error = %e, "failed to reclaim stale partition");
        }
      }
    }

    Ok(deleted)
  }
}
