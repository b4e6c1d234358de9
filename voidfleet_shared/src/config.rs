//! Configuration system.
//!
//! Loads server and client configuration from JSON strings or files. Every
//! field has a default, so a config file only needs the values it changes.

use std::{path::Path, time::Duration};

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Server process configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address, e.g. `127.0.0.1:40000`.
    pub listen_addr: String,
    /// Fixed simulation tick rate.
    pub tick_hz: u32,
    /// Connection slots; further clients are refused.
    pub max_clients: usize,
    /// Liveness sweep period. A client silent for a whole period is dropped.
    pub heartbeat_interval_ms: u64,
    /// Seed for spawn placement.
    pub seed: u64,
    /// Number of asteroids placed at startup.
    pub asteroids: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:40000".to_string(),
            tick_hz: 30,
            max_clients: 16,
            heartbeat_interval_ms: 1000,
            seed: 5,
            asteroids: 40,
        }
    }
}

impl ServerConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        Self::from_json_str(&text).with_context(|| format!("parse config {}", path.display()))
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.tick_hz.max(1)))
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms.max(1))
    }
}

/// Client process configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// WebSocket URL of the server.
    pub server_url: String,
    /// Name sent in `HELLO`.
    pub player_name: String,
    /// Render loop rate; independent of the server tick.
    pub render_hz: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "ws://127.0.0.1:40000".to_string(),
            player_name: "Player".to_string(),
            render_hz: 60,
        }
    }
}

impl ClientConfig {
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        Self::from_json_str(&text).with_context(|| format!("parse config {}", path.display()))
    }

    pub fn render_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.render_hz.max(1)))
    }
}
