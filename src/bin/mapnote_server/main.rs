use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser as CliParser;
use mapnote::config::Config;
use mapnote::remote::{DocumentStore, serve};
use tracing_subscriber::EnvFilter;

#[derive(clap::Parser, Debug)]
#[command(author, version, about = "Stores map documents per user", long_about = None)]
struct Args {
  /// Port to listen on. Overrides the config.
  #[arg(short, long)]
  port: Option<u16>,

  /// Directory the documents are stored in. Overrides the config.
  #[arg(short, long)]
  documents_dir: Option<PathBuf>,

  /// Listens on all interfaces instead of localhost only.
  #[arg(long)]
  public: bool,
}

async fn shutdown_signal() {
  let ctrl_c = async {
    if let Err(e) = tokio::signal::ctrl_c().await {
      tracing::error!("Failed to install Ctrl+C handler: {e}");
      std::future::pending::<()>().await;
    }
  };

  #[cfg(unix)]
  let terminate = async {
    match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
      Ok(mut signal) => {
        signal.recv().await;
      }
      Err(e) => {
        tracing::error!("Failed to install signal handler: {e}");
        std::future::pending::<()>().await;
      }
    }
  };

  #[cfg(not(unix))]
  let terminate = std::future::pending::<()>();

  tokio::select! {
      () = ctrl_c => {},
      () = terminate => {},
  }
  tracing::info!("Shutting down");
}

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_target(false)
    .with_env_filter(EnvFilter::from_default_env())
    .compact()
    .init();

  let args = Args::parse();
  let config = Config::new();

  let documents_dir = args
    .documents_dir
    .or(config.documents_dir)
    .context("no documents directory configured")?;
  let port = args.port.unwrap_or(config.port);
  let ip = if args.public {
    [0, 0, 0, 0]
  } else {
    [127, 0, 0, 1]
  };

  let listener = tokio::net::TcpListener::bind(SocketAddr::from((ip, port)))
    .await
    .with_context(|| format!("cannot bind port {port}"))?;
  serve(listener, DocumentStore::new(documents_dir), shutdown_signal()).await?;
  Ok(())
}
