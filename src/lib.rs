//! Offline-capable request caching layer.
//!
//! Sits between an application and the network, serving every outbound
//! request through versioned cache partitions and one of three strategies
//! (cache-first, network-first with timeout, stale-while-revalidate) so the
//! application keeps working, in a previously-seen form, without
//! connectivity.

pub mod config;
pub mod fetch;
pub mod store;
pub mod worker;

pub use config::Config;
pub use fetch::{Fetcher, HttpFetcher, Request, Response};
pub use store::{MemoryStore, PartitionStore, SqliteStore};
pub use worker::{Worker, WorkerConfig, WorkerEvent, WorkerMessage, WorkerState};
