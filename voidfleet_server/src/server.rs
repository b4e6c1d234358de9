//! Server implementation.
//!
//! An authoritative fixed-tick loop. Socket tasks and the heartbeat task run
//! beside it and only talk to the simulation through the connection manager's
//! queues; everything that touches the `World` happens inside `step`.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use tokio::{net::TcpListener, task::JoinHandle, time::Instant};
use tracing::{error, info};
use voidfleet_shared::{config::ServerConfig, ecs::World, physics::PhysicsConfig};

use crate::{
    connection::ConnectionManager,
    spawner,
    systems::{self, Pipeline},
    transport,
};

/// Game server.
pub struct GameServer {
    pub cfg: ServerConfig,
    world: World,
    manager: Arc<ConnectionManager>,
    local_addr: SocketAddr,
    tasks: Vec<JoinHandle<()>>,
    started: Instant,
    last_step: Option<Instant>,
}

impl GameServer {
    /// Binds the listener, starts the transport tasks and builds the world.
    pub async fn bind(cfg: ServerConfig) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(&cfg.listen_addr)
            .await
            .with_context(|| format!("bind {}", cfg.listen_addr))?;
        let local_addr = listener.local_addr().context("local addr")?;

        let (manager, events) = ConnectionManager::new(cfg.max_clients);

        let mut world = World::new();
        systems::install(
            &mut world,
            Pipeline {
                manager: manager.clone(),
                events,
                tick_rate: cfg.tick_hz,
                seed: cfg.seed,
                physics: PhysicsConfig::default(),
            },
        );
        spawner::asteroid_field(&mut world, cfg.asteroids);

        let accept = tokio::spawn({
            let manager = manager.clone();
            let write_timeout = cfg.heartbeat_interval();
            async move {
                if let Err(e) = transport::serve(listener, manager, write_timeout).await {
                    error!(error = %e, "listener stopped");
                }
            }
        });
        let heartbeat = tokio::spawn(transport::heartbeat(manager.clone(), cfg.heartbeat_interval()));

        info!(
            %local_addr,
            tick_hz = cfg.tick_hz,
            max_clients = cfg.max_clients,
            heartbeat_ms = cfg.heartbeat_interval_ms,
            systems = world.system_count(),
            "server bound"
        );

        Ok(Self {
            cfg,
            world,
            manager,
            local_addr,
            tasks: vec![accept, heartbeat],
            started: Instant::now(),
            last_step: None,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn manager(&self) -> &Arc<ConnectionManager> {
        &self.manager
    }

    /// Number of completed ticks.
    pub fn tick(&self) -> u64 {
        self.world.time().tick
    }

    /// Executes one simulation step with the wall-clock time since the last.
    ///
    /// The first step uses the nominal tick interval.
    pub fn step(&mut self) {
        let now = Instant::now();
        let delta = self
            .last_step
            .map_or(self.cfg.tick_interval(), |last| now.duration_since(last));
        self.last_step = Some(now);
        self.step_by(delta);
    }

    /// Executes one simulation step of exactly `delta`.
    pub fn step_by(&mut self, delta: Duration) {
        let now = self.started.elapsed().as_secs_f64();
        self.world.execute(delta.as_secs_f32(), now);
    }

    /// Runs the fixed-tick loop forever. Late ticks are skipped, not replayed.
    pub async fn run(mut self) -> anyhow::Result<()> {
        let mut ticker = tokio::time::interval(self.cfg.tick_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            self.step();
        }
    }

    /// Runs the server for a number of ticks.
    pub async fn run_for_ticks(&mut self, ticks: u32) {
        let mut ticker = tokio::time::interval(self.cfg.tick_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        for _ in 0..ticks {
            ticker.tick().await;
            self.step();
        }
    }
}

impl Drop for GameServer {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
        self.manager.close_all();
    }
}

/// Helper for tests: bind to an ephemeral port.
pub async fn bind_ephemeral(tick_hz: u32) -> anyhow::Result<(GameServer, ServerConfig)> {
    let cfg = ServerConfig {
        listen_addr: "127.0.0.1:0".to_string(),
        tick_hz,
        asteroids: 0,
        ..ServerConfig::default()
    };
    let server = GameServer::bind(cfg).await?;
    let mut cfg = server.cfg.clone();
    cfg.listen_addr = server.local_addr().to_string();
    Ok((server, cfg))
}
