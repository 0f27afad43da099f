use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::worker::precache::ManifestEntry;
use crate::worker::WorkerConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub cache: CacheConfig,
  /// Critical assets precached at install time
  #[serde(default)]
  pub precache: Vec<ManifestEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// Version identifier; bumping it forces full cache replacement
  pub version: String,
  /// Base URL of the application; relative precache and offline URLs are
  /// resolved against it
  pub origin: String,
  /// Path prefix identifying API requests
  #[serde(default = "default_api_prefix")]
  pub api_prefix: String,
  /// Offline fallback document, absolute or relative to `origin`
  #[serde(default = "default_offline_url")]
  pub offline_url: String,
  /// Maximum age in seconds for a cached API entry to serve as fallback
  #[serde(default = "default_api_max_age_secs")]
  pub api_max_age_secs: u64,
  /// Network-first timeout in seconds
  #[serde(default = "default_network_timeout_secs")]
  pub network_timeout_secs: u64,
}

fn default_api_prefix() -> String {
  "/api/".to_string()
}

fn default_offline_url() -> String {
  "/offline.html".to_string()
}

fn default_api_max_age_secs() -> u64 {
  24 * 60 * 60
}

fn default_network_timeout_secs() -> u64 {
  10
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./offcache.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/offcache/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/offcache/config.yaml"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("offcache.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("offcache").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }

  /// Resolve the file configuration into the worker's runtime configuration,
  /// joining relative URLs against the origin.
  pub fn worker_config(&self) -> Result<WorkerConfig> {
    let origin = Url::parse(&self.cache.origin)
      .map_err(|e| eyre!("Invalid origin {}: {}", self.cache.origin, e))?;

    let offline_url = origin
      .join(&self.cache.offline_url)
      .map_err(|e| eyre!("Invalid offline URL {}: {}", self.cache.offline_url, e))?;

    let precache_manifest = self
      .precache
      .iter()
      .map(|entry| {
        let url = origin
          .join(&entry.url)
          .map_err(|e| eyre!("Invalid precache URL {}: {}", entry.url, e))?;
        Ok(ManifestEntry {
          url: url.to_string(),
          revision: entry.revision.clone(),
        })
      })
      .collect::<Result<Vec<_>>>()?;

    Ok(WorkerConfig {
      version: self.cache.version.clone(),
      precache_manifest,
      api_prefix: self.cache.api_prefix.clone(),
      offline_url,
      network_timeout: Duration::from_secs(self.cache.network_timeout_secs),
      api_max_age: chrono::Duration::seconds(self.cache.api_max_age_secs as i64),
    })
  }
}
