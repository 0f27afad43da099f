//! Durable partition stores.
//!
//! A partition is a named key-value container holding response snapshots for
//! one resource role at one version. The store is injected into the worker so
//! tests can substitute the in-memory implementation.

mod memory;
mod sqlite;
mod traits;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{PartitionStore, StoredResponse};
