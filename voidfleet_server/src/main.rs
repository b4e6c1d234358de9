//! Standalone server binary.
//!
//! Usage:
//!   cargo run -p voidfleet_server -- [--config server.json] [--addr 127.0.0.1:40000]
//!       [--tick-hz 30] [--max-clients 16] [--heartbeat-ms 1000]
//!
//! Command-line flags override values from the config file.

use std::env;

use anyhow::Context;
use tracing::info;
use voidfleet_server::GameServer;
use voidfleet_shared::config::ServerConfig;

fn parse_args() -> anyhow::Result<ServerConfig> {
    let args: Vec<String> = env::args().collect();

    let mut cfg = match args.iter().position(|a| a == "--config") {
        Some(i) => {
            let path = args.get(i + 1).context("--config needs a path")?;
            ServerConfig::load(path)?
        }
        None => ServerConfig::default(),
    };

    let mut i = 1;
    while i < args.len() {
        let value = args.get(i + 1);
        match (args[i].as_str(), value) {
            ("--addr", Some(v)) => cfg.listen_addr = v.clone(),
            ("--tick-hz", Some(v)) => cfg.tick_hz = v.parse().context("--tick-hz")?,
            ("--max-clients", Some(v)) => cfg.max_clients = v.parse().context("--max-clients")?,
            ("--heartbeat-ms", Some(v)) => cfg.heartbeat_interval_ms = v.parse().context("--heartbeat-ms")?,
            ("--config", Some(_)) => {}
            _ => {
                i += 1;
                continue;
            }
        }
        i += 2;
    }
    Ok(cfg)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cfg = parse_args()?;
    info!(addr = %cfg.listen_addr, tick_hz = cfg.tick_hz, max_clients = cfg.max_clients, "Starting server");

    let server = GameServer::bind(cfg).await.context("create server")?;
    info!(local = %server.local_addr(), "Server listening");

    server.run().await
}
