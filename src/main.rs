mod cache;
mod config;
mod http;
mod lifecycle;
mod net;
mod route;
mod router;
#[cfg(test)]
mod testing;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use url::Url;

use crate::cache::{CacheStorage, MemoryStorage, SqliteStorage};
use crate::http::{Method, Request, Response};
use crate::lifecycle::ServiceWorker;
use crate::net::{Fetcher, HttpFetcher};
use crate::router::Dispatch;

#[derive(Parser, Debug)]
#[command(name = "trip-sw")]
#[command(about = "Offline cache and request router for the Kyoto trip page")]
#[command(version)]
struct Args {
  /// Path to config file (default: ./trip-sw.yaml or $XDG_CONFIG_HOME/trip-sw/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Pre-cache the page and take over immediately (install + activate)
  Install {
    /// Dry run: pre-cache into memory and discard it on exit
    #[arg(long)]
    memory: bool,
  },
  /// Delete stores left behind by older versions
  Activate,
  /// Send a request through the router, as the page would
  Fetch {
    url: Url,
    #[arg(short = 'X', long, default_value = "GET")]
    method: Method,
    /// Extra request header, "Name: value"
    #[arg(short = 'H', long = "header")]
    headers: Vec<String>,
    /// Print the response body
    #[arg(long)]
    body: bool,
  },
  /// List stores and their entry counts
  Stores,
}

/// Initialize the tracing subscriber.
///
/// Logs go to stderr, or to `trip-sw.log` under `log_dir` when configured.
/// RUST_LOG overrides the default `info` level.
fn init_tracing(log_dir: Option<&std::path::Path>) -> Option<WorkerGuard> {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

  match log_dir {
    Some(dir) => {
      let appender = tracing_appender::rolling::never(dir, "trip-sw.log");
      let (writer, guard) = tracing_appender::non_blocking(appender);
      tracing_subscriber::registry()
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .with(filter)
        .init();
      Some(guard)
    }
    None => {
      tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
      None
    }
  }
}

fn parse_header(raw: &str) -> Result<(String, String)> {
  let (name, value) = raw
    .split_once(':')
    .ok_or_else(|| eyre!("Invalid header '{}', expected 'Name: value'", raw))?;
  Ok((name.trim().to_string(), value.trim().to_string()))
}

fn body_summary(response: &Response) -> String {
  match response.header("content-type") {
    Some(content_type) => format!("[{} bytes, {}]", response.body.len(), content_type),
    None => format!("[{} bytes]", response.body.len()),
  }
}

fn print_response(response: &Response, origin: &str, with_body: bool) {
  println!("{} ({})", response.status, origin);
  for (name, value) in &response.headers {
    println!("{}: {}", name, value);
  }
  if with_body {
    println!();
    println!("{}", response.text());
  } else {
    println!("{}", body_summary(response));
  }
}

async fn run_fetch<S: CacheStorage, F: Fetcher>(
  worker: &ServiceWorker<S, F>,
  fetcher: &F,
  request: Request,
  with_body: bool,
) -> Result<()> {
  match worker.handle_fetch(request).await {
    Dispatch::Respond(served) => {
      let origin = format!("{} via {:?}", served.route.name(), served.source);
      print_response(&served.response, &origin, with_body);
      // The process is about to exit; let opportunistic writes land
      worker.router().drain_writes().await;
    }
    Dispatch::Bypass(request) => {
      // Not intercepted: the host sends it itself, errors and all
      let response = fetcher.fetch(&request).await?;
      print_response(&response, "bypass", with_body);
    }
  }
  Ok(())
}

async fn run<S: CacheStorage>(
  command: Command,
  config: &config::Config,
  storage: Arc<S>,
) -> Result<()> {
  let origin = config.origin_url()?;
  let fetcher = Arc::new(HttpFetcher::new(config.timeout())?);

  match command {
    Command::Install { .. } => {
      let mut worker = ServiceWorker::new(Arc::clone(&storage), Arc::clone(&fetcher), &origin)?;
      let installed = worker.install().await?;
      println!("installed {} ({} entries)", worker.version(), installed.cached);
      if installed.skip_waiting {
        let activated = worker.activate().await?;
        println!("activated {}, removed {:?}", worker.version(), activated.deleted);
      }
    }
    Command::Activate => {
      let mut worker = ServiceWorker::resume(Arc::clone(&storage), Arc::clone(&fetcher), &origin)?;
      let activated = worker.activate().await?;
      println!("activated {}, removed {:?}", worker.version(), activated.deleted);
    }
    Command::Fetch {
      url,
      method,
      headers,
      body,
    } => {
      let mut request = Request::new(method, url);
      for raw in &headers {
        let (name, value) = parse_header(raw)?;
        request = request.with_header(name, value);
      }
      let worker = ServiceWorker::resume(Arc::clone(&storage), Arc::clone(&fetcher), &origin)?;
      info!(state = ?worker.state(), "worker resumed");
      run_fetch(&worker, fetcher.as_ref(), request, body).await?;
    }
    Command::Stores => {
      for name in storage.keys()? {
        let marker = if name == lifecycle::CACHE_VERSION {
          "*"
        } else {
          " "
        };
        println!("{} {} ({} entries)", marker, name, storage.entry_count(&name)?);
      }
    }
  }

  Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let config = config::Config::load(args.config.as_deref())?;
  let _log_guard = init_tracing(config.log_dir.as_deref());

  if matches!(args.command, Command::Install { memory: true }) {
    run(args.command, &config, Arc::new(MemoryStorage::new())).await
  } else {
    let storage = SqliteStorage::open(config.database.as_deref())?;
    run(args.command, &config, Arc::new(storage)).await
  }
}
