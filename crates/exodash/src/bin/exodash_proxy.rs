//! ML proxy server
//!
//! Forwards `/api/ml-proxy/*` to the ML service with a fixed timeout and keeps
//! a JSONL log of every request.

use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use exodash::config::Config;
use exodash::proxy::start_server;

#[derive(Parser)]
#[command(name = "exodash_proxy")]
#[command(about = "Reverse proxy in front of the exoplanet ML service")]
#[command(version)]
struct Args {
  /// Config file (default: $EXODASH_CONFIG or ~/.exodash/config.yaml)
  #[arg(long)]
  config: Option<PathBuf>,

  /// Bind address, overrides config
  #[arg(long)]
  bind: Option<SocketAddr>,

  /// Upstream ML service URL, overrides config
  #[arg(long)]
  upstream: Option<String>,

  /// Seconds to wait for the upstream before answering 504
  #[arg(long)]
  timeout: Option<u64>,

  /// Enable verbose logging
  #[arg(short, long)]
  verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
  let args = Args::parse();

  let filter = if args.verbose {
    EnvFilter::new("exodash=debug,tower_http=debug,info")
  } else {
    EnvFilter::new("exodash=info,tower_http=info,warn")
  };
  tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

  let mut config = match &args.config {
    Some(path) => {
      let mut config = Config::load_from_file(path)?;
      config.apply_env()?;
      config
    }
    None => Config::load()?,
  };
  if let Some(bind) = args.bind {
    config.proxy.bind = bind;
  }
  if let Some(upstream) = args.upstream {
    config.proxy.upstream = upstream;
  }
  if let Some(timeout) = args.timeout {
    config.proxy.timeout_secs = timeout;
  }

  exolog::info!(&format!("Starting exodash proxy v{}", env!("CARGO_PKG_VERSION")));
  start_server(&config).await
}
