use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use parking_lot::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use arcus::config::ServerConfig;
use arcus::server::Server;

#[derive(Parser)]
#[command(name = "arcus-game", about = "Example Arcus game server harness", version)]
struct Args {
  #[arg(short, long, env = "ARCUS_SERVER_PORT")]
  port: Option<u16>,
  #[arg(long, env = "ARCUS_SERVER_HOST")]
  host: Option<String>,
  #[arg(short, long)]
  config: Option<String>,
  #[arg(long, env = "ARCUS_SERVER_LOG_LEVEL")]
  log_level: Option<String>,
}

fn main() -> Result<(), anyhow::Error> {
  let args = Args::parse();

  let mut config = if let Some(path) = &args.config {
    ServerConfig::from_file(path)?
  } else {
    ServerConfig::find_and_load()?
  };

  if let Some(port) = args.port {
    config.network.port = port;
  }
  if let Some(host) = args.host {
    config.network.host = host;
  }
  if let Some(level) = args.log_level {
    config.logging.level = level;
  }

  tracing_subscriber::registry()
    .with(
      tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.clone().into()),
    )
    .with(tracing_subscriber::fmt::layer())
    .init();

  let server = Arc::new(Server::new(config));
  server.listen()?;

  let stop_deadline: Arc<Mutex<Option<Instant>>> = Arc::new(Mutex::new(None));

  let live_state_server = server.clone();
  server.on_live_state_request(move |_payload| {
    tracing::debug!("live state requested");
    live_state_server
      .respond_live_state(0, 16, "arcus-game", "demo-map", "deathmatch", env!("CARGO_PKG_VERSION"))
      .ok();
  });

  let host_info_server = server.clone();
  server.on_host_information_request(move |_payload| {
    tracing::debug!("host information requested");
    host_info_server.respond_host_information("arcus-game-1", "host-1").ok();
  });

  let stop_deadline_writer = stop_deadline.clone();
  server.on_soft_stop(move |payload| {
    let timeout = payload.get_int("timeout_seconds").unwrap_or(10).max(0) as u64;
    tracing::info!(timeout_seconds = timeout, "soft stop requested, will exit after grace period");
    *stop_deadline_writer.lock() = Some(Instant::now() + Duration::from_secs(timeout));
  });

  loop {
    if let Err(e) = server.update() {
      tracing::warn!(error = %e, "update failed, server keeps running and awaits a new peer");
    }
    if let Some(deadline) = *stop_deadline.lock() {
      if Instant::now() >= deadline {
        tracing::info!("grace period elapsed, exiting");
        break;
      }
    }
    std::thread::sleep(Duration::from_millis(50));
  }

  Ok(())
}
