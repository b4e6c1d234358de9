//! Standalone client binary.
//!
//! Usage:
//!   cargo run -p voidfleet_client -- [--config client.json] [--url ws://127.0.0.1:40000] [--name Ace]
//!
//! The client joins the server, flies on autopilot and renders through a
//! headless backend, logging what it sees.

use std::{env, time::Duration};

use anyhow::Context;
use tracing::info;
use voidfleet_client::{
    client::{ClientState, GameClient},
    input::Autopilot,
    render::NullRenderer,
};
use voidfleet_shared::{components::Transform, config::ClientConfig};

fn parse_args() -> anyhow::Result<ClientConfig> {
    let args: Vec<String> = env::args().collect();
    let mut cfg = match args.iter().position(|a| a == "--config") {
        Some(i) => {
            let path = args.get(i + 1).context("--config needs a path")?;
            ClientConfig::load(path)?
        }
        None => ClientConfig::default(),
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--url" if i + 1 < args.len() => {
                cfg.server_url = args[i + 1].clone();
                i += 2;
            }
            "--name" if i + 1 < args.len() => {
                cfg.player_name = args[i + 1].clone();
                i += 2;
            }
            "--render-hz" if i + 1 < args.len() => {
                cfg.render_hz = args[i + 1].parse().context("--render-hz")?;
                i += 2;
            }
            _ => i += 1,
        }
    }
    Ok(cfg)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cfg = parse_args()?;
    let mut client = GameClient::connect(&cfg, Box::new(NullRenderer))
        .await
        .context("connect")?;
    info!(entity = ?client.player(), "Joined");

    let autopilot = Autopilot;
    let mut interval = tokio::time::interval(cfg.render_interval());
    let mut frames: u64 = 0;

    while client.state != ClientState::Disconnected {
        interval.tick().await;
        client.send_input(autopilot.sample(client.elapsed())).await?;
        client.pump(Duration::ZERO).await?;
        client.frame();

        frames += 1;
        if frames % (u64::from(cfg.render_hz.max(1)) * 5) == 0 {
            let position = client
                .player_entity()
                .and_then(|e| client.world.get::<Transform>(e))
                .map(|t| t.position);
            info!(frames, entities = client.replicated_count(), ?position, "Status");
        }
    }

    info!("Disconnected from server");
    Ok(())
}
