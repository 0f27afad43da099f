use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use url::Url;

use offcache::config::Config;
use offcache::fetch::{HttpFetcher, Request};
use offcache::store::SqliteStore;
use offcache::worker::{Worker, WorkerEvent, WorkerMessage};

#[derive(Parser, Debug)]
#[command(name = "offcache")]
#[command(about = "Offline-capable request cache with versioned partitions")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/offcache/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Precache the manifest into the current version's static partition
  Install,
  /// Reclaim stale partitions and start controlling requests
  Activate,
  /// Install, then force-activate without waiting
  Update,
  /// Fetch a URL through the caching layer
  Fetch {
    url: String,
    /// Treat the request as a top-level navigation
    #[arg(long)]
    navigate: bool,
  },
  /// List durable partitions
  Status,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;
  let _log_guard = init_tracing()?;

  let args = Args::parse();
  let config = Config::load(args.config.as_deref())?;

  let store = SqliteStore::open()?;
  let fetcher = HttpFetcher::new();
  let mut worker = Worker::new(store, fetcher, config.worker_config()?);

  match args.command {
    Command::Install => {
      worker.dispatch(WorkerEvent::Install).await?;
      println!("installed version {}", config.cache.version);
    }
    Command::Activate => {
      worker.dispatch(WorkerEvent::Activate).await?;
      println!("activated version {}", config.cache.version);
    }
    Command::Update => {
      worker.dispatch(WorkerEvent::Install).await?;
      worker
        .dispatch(WorkerEvent::Message(WorkerMessage::SkipWaiting))
        .await?;
      println!("updated to version {}", config.cache.version);
    }
    Command::Fetch { url, navigate } => {
      let url = Url::parse(&url).map_err(|e| eyre!("Invalid URL {}: {}", url, e))?;
      let request = if navigate {
        Request::navigate(url)
      } else {
        Request::get(url)
      };

      let response = worker
        .dispatch(WorkerEvent::Fetch(request))
        .await?
        .ok_or_else(|| eyre!("Fetch produced no response"))?;
      println!("{} ({} bytes)", response.status, response.body.len());
    }
    Command::Status => {
      for partition in worker.partition_summary()? {
        let marker = if partition.current { "*" } else { " " };
        println!("{} {:<24} {} entries", marker, partition.name, partition.entries);
      }
    }
  }

  Ok(())
}

/// Send diagnostics to a log file; stdout is for command output.
fn init_tracing() -> Result<tracing_appender::non_blocking::WorkerGuard> {
  let log_dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| eyre!("Could not determine data directory"))?
    .join("offcache");
  std::fs::create_dir_all(&log_dir)
    .map_err(|e| eyre!("Failed to create log directory: {}", e))?;

  let appender = tracing_appender::rolling::never(log_dir, "offcache.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);

  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(writer)
    .with_ansi(false)
    .init();

  Ok(guard)
}
