use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use reqwest::Method;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use offgrid::cache::{CacheStorage, MemoryStorage, SqliteStorage};
use offgrid::config::{Config, StorageBackend};
use offgrid::http::InterceptedRequest;
use offgrid::logging;
use offgrid::network::{Fetch, HttpFetcher};
use offgrid::{Router, RouterSettings};

#[derive(Parser, Debug)]
#[command(name = "offgrid")]
#[command(about = "An offline-first caching request interceptor")]
#[command(version)]
struct Args {
  /// Path to config file (default: ./offgrid.yaml or $XDG_CONFIG_HOME/offgrid/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Store every manifest asset in the current cache version
  Install,
  /// Delete every cache version except the current one
  Activate,
  /// Install, then activate
  Start,
  /// Resolve one request through the interceptor and print the body
  Get {
    /// Path or URL, resolved against the configured scope
    path: String,
    /// Treat the request as a page navigation
    #[arg(long)]
    navigate: bool,
    /// Accept header to send
    #[arg(long)]
    accept: Option<String>,
    /// HTTP method
    #[arg(long, default_value = "GET")]
    method: String,
  },
  /// List stored cache versions
  Versions,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;
  let _log_guard = logging::init();

  let args = Args::parse();

  // Load configuration
  let config = Config::load(args.config.as_deref())?;
  let settings = RouterSettings::from_config(&config)?;
  let fetcher = Arc::new(HttpFetcher::new(config.network.timeout())?);

  match config.storage.backend {
    StorageBackend::Sqlite => {
      let path = match &config.storage.path {
        Some(path) => path.clone(),
        None => SqliteStorage::default_path()?,
      };
      let storage = Arc::new(SqliteStorage::open_at(&path)?);
      run(Router::new(storage, fetcher, settings), args.command).await
    }
    StorageBackend::Memory => {
      let storage = Arc::new(MemoryStorage::new());
      run(Router::new(storage, fetcher, settings), args.command).await
    }
  }
}

async fn run<S, F>(router: Router<S, F>, command: Command) -> Result<()>
where
  S: CacheStorage + 'static,
  F: Fetch + 'static,
{
  match command {
    Command::Install => install(&router).await,
    Command::Activate => activate(&router).await,
    Command::Start => {
      install(&router).await?;
      activate(&router).await
    }
    Command::Get {
      path,
      navigate,
      accept,
      method,
    } => get(&router, &path, navigate, accept.as_deref(), &method).await,
    Command::Versions => versions(&router),
  }
}

async fn install<S, F>(router: &Router<S, F>) -> Result<()>
where
  S: CacheStorage + 'static,
  F: Fetch + 'static,
{
  router.on_install().await?;
  println!("Installed {}", router.cache_version());
  Ok(())
}

async fn activate<S, F>(router: &Router<S, F>) -> Result<()>
where
  S: CacheStorage + 'static,
  F: Fetch + 'static,
{
  let deleted = router.on_activate().await?;
  if deleted.is_empty() {
    println!("Activated {} (nothing to prune)", router.cache_version());
  } else {
    println!(
      "Activated {} (deleted {})",
      router.cache_version(),
      deleted.join(", ")
    );
  }
  Ok(())
}

async fn get<S, F>(
  router: &Router<S, F>,
  path: &str,
  navigate: bool,
  accept: Option<&str>,
  method: &str,
) -> Result<()>
where
  S: CacheStorage + 'static,
  F: Fetch + 'static,
{
  let url = router
    .scope()
    .join(path)
    .map_err(|e| eyre!("Invalid path '{}': {}", path, e))?;
  let method = Method::from_bytes(method.to_uppercase().as_bytes())
    .map_err(|e| eyre!("Invalid method '{}': {}", method, e))?;

  let request = if navigate {
    InterceptedRequest::navigate(url)
  } else {
    InterceptedRequest::get(url)
  }
  .with_method(method);
  let request = match accept {
    Some(accept) => request.with_accept(accept),
    None => request,
  };

  let served = router.handle(&request).await?;
  // Let background revalidations finish before the runtime goes away
  router.settle().await;

  match served {
    Some(served) => {
      eprintln!("{} ({})", served.response.status, served.source);
      std::io::stdout().write_all(&served.response.body)?;
      Ok(())
    }
    None => Err(eyre!(
      "{} is outside {}; not intercepted",
      request.url,
      router.scope().origin().ascii_serialization()
    )),
  }
}

fn versions<S, F>(router: &Router<S, F>) -> Result<()>
where
  S: CacheStorage + 'static,
  F: Fetch + 'static,
{
  let versions = router.versions()?;
  if versions.is_empty() {
    println!("No cache versions stored");
    return Ok(());
  }

  for info in versions {
    let marker = if info.version == router.cache_version() {
      "*"
    } else {
      " "
    };
    println!(
      "{} {}  {} entries  created {}",
      marker,
      info.version,
      info.entries,
      info.created_at.format("%Y-%m-%d %H:%M:%S")
    );
  }
  Ok(())
}
