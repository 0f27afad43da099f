//! The caching worker: lifecycle, event dispatch, and per-request flow.
//!
//! The worker sits between the application and the network. Every outbound
//! request is classified, served through the strategy bound to its role's
//! partition, and, for navigations, backed by the offline fallback document.
//! Install and activate are separate lifecycle steps that never run as part
//! of request handling.

pub mod classify;
pub mod fallback;
pub mod precache;
pub mod strategy;
pub mod versions;

use color_eyre::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use crate::fetch::{Destination, FetchError, Fetcher, Request, Response};
use crate::store::PartitionStore;
use classify::{classify, Classification, Role};
use precache::ManifestEntry;
use strategy::StrategyRunner;
use versions::PartitionManager;

/// Lifecycle states of one worker version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
  /// Registered, nothing run yet
  Parsed,
  /// Precaching the manifest
  Installing,
  /// Precache complete, waiting to take over
  Installed,
  /// Reclaiming stale partitions
  Activating,
  /// Controlling requests
  Activated,
  /// Installation failed; this version will never serve
  Redundant,
}

impl std::fmt::Display for WorkerState {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let s = match self {
      WorkerState::Parsed => "parsed",
      WorkerState::Installing => "installing",
      WorkerState::Installed => "installed",
      WorkerState::Activating => "activating",
      WorkerState::Activated => "activated",
      WorkerState::Redundant => "redundant",
    };
    f.write_str(s)
  }
}

/// Events the worker consumes, one dispatch entry point per kind.
#[derive(Debug)]
pub enum WorkerEvent {
  /// New version deployed; precache the manifest
  Install,
  /// This version takes over; reclaim stale partitions and claim clients
  Activate,
  /// An intercepted outbound request
  Fetch(Request),
  /// Application message
  Message(WorkerMessage),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerMessage {
  /// Activate a waiting version immediately instead of waiting for all
  /// clients to close.
  SkipWaiting,
}

/// Worker configuration: the single version identifier plus the small fixed
/// set of knobs the layer exposes.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
  /// Process-wide version identifier; bumping it forces full cache replacement
  pub version: String,
  /// Critical assets fetched and stored at install time
  pub precache_manifest: Vec<ManifestEntry>,
  /// Path prefix identifying API requests
  pub api_prefix: String,
  /// Precached document served when a navigation cannot be satisfied
  pub offline_url: Url,
  /// How long network-first waits for the network
  pub network_timeout: Duration,
  /// Maximum age of a cached API entry eligible as network-first fallback
  pub api_max_age: chrono::Duration,
}

/// Summary row for one durable partition.
#[derive(Debug, Clone)]
pub struct PartitionInfo {
  pub name: String,
  pub entries: usize,
  /// Whether the classifier references this partition at the current version
  pub current: bool,
}

/// The offline caching worker.
pub struct Worker<S, F> {
  store: Arc<S>,
  fetcher: Arc<F>,
  manager: PartitionManager,
  runner: StrategyRunner<S, F>,
  config: WorkerConfig,
  state: WorkerState,
  controlling: bool,
}

impl<S, F> Worker<S, F>
where
  S: PartitionStore + 'static,
  F: Fetcher,
{
  pub fn new(store: S, fetcher: F, config: WorkerConfig) -> Self {
    let store = Arc::new(store);
    let fetcher = Arc::new(fetcher);
    let runner = StrategyRunner::new(
      Arc::clone(&store),
      Arc::clone(&fetcher),
      config.network_timeout,
      config.api_max_age,
    );
    let manager = PartitionManager::new(config.version.clone());

    Self {
      store,
      fetcher,
      manager,
      runner,
      config,
      state: WorkerState::Parsed,
      controlling: false,
    }
  }

  pub fn state(&self) -> WorkerState {
    self.state
  }

  /// Whether this worker controls already-open clients.
  pub fn is_controlling(&self) -> bool {
    self.controlling
  }

  /// Handle one event. Only fetch events produce a response.
  pub async fn dispatch(&mut self, event: WorkerEvent) -> Result<Option<Response>> {
    match event {
      WorkerEvent::Install => {
        self.install().await?;
        Ok(None)
      }
      WorkerEvent::Activate => {
        self.activate()?;
        Ok(None)
      }
      WorkerEvent::Fetch(request) => Ok(Some(self.handle_fetch(&request).await?)),
      WorkerEvent::Message(WorkerMessage::SkipWaiting) => {
        self.skip_waiting()?;
        Ok(None)
      }
    }
  }

  /// Install this version: precache the manifest into the static partition.
  ///
  /// All-or-nothing; on failure this version becomes redundant and the
  /// previous version keeps serving.
  pub async fn install(&mut self) -> Result<()> {
    self.state = WorkerState::Installing;
    let partition = self.manager.partition_name(Role::Static);

    match precache::precache(
      self.store.as_ref(),
      self.fetcher.as_ref(),
      &partition,
      &self.config.precache_manifest,
    )
    .await
    {
      Ok(()) => {
        self.state = WorkerState::Installed;
        info!(version = %self.manager.version(), "installed");
        Ok(())
      }
      Err(error) => {
        self.state = WorkerState::Redundant;
        Err(error)
      }
    }
  }

  /// Activate this version: reclaim stale partitions, then immediately claim
  /// already-open clients rather than waiting for them to navigate.
  pub fn activate(&mut self) -> Result<()> {
    self.state = WorkerState::Activating;
    let deleted = self.manager.reclaim(self.store.as_ref())?;
    self.state = WorkerState::Activated;
    self.controlling = true;
    info!(version = %self.manager.version(), deleted, "activated and claimed clients");
    Ok(())
  }

  /// Promote an installed-but-waiting version straight to activation.
  fn skip_waiting(&mut self) -> Result<()> {
    if self.state == WorkerState::Installed {
      info!(version = %self.manager.version(), "skip-waiting requested");
      return self.activate();
    }
    debug!(state = %self.state, "skip-waiting ignored outside the installed state");
    Ok(())
  }

  /// Serve one intercepted request.
  pub async fn handle_fetch(&self, request: &Request) -> Result<Response, FetchError> {
    match classify(request, &self.config.api_prefix) {
      Classification::Passthrough => self.fetcher.fetch(request).await,
      Classification::Cached { role, strategy } => {
        let partition = self.manager.partition_name(role);
        match self.runner.execute(strategy, request, &partition).await {
          Ok(response) => Ok(response),
          Err(error) if is_navigation(request) => {
            debug!(url = %request.url, %error, "navigation exhausted, serving offline fallback");
            let static_partition = self.manager.partition_name(Role::Static);
            Ok(fallback::offline_fallback(
              self.store.as_ref(),
              &static_partition,
              &self.config.offline_url,
            ))
          }
          Err(error) => Err(error),
        }
      }
    }
  }

  /// Durable partitions with entry counts, current ones marked.
  pub fn partition_summary(&self) -> Result<Vec<PartitionInfo>> {
    let current = self.manager.current_set();
    let mut rows = Vec::new();
    for name in self.store.partitions()? {
      rows.push(PartitionInfo {
        entries: self.store.entry_count(&name)?,
        current: current.contains(&name),
        name,
      });
    }
    rows.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(rows)
  }
}

fn is_navigation(request: &Request) -> bool {
  request.navigation || request.destination == Destination::Document
}
