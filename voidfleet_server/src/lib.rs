//! `voidfleet_server`
//!
//! Server-side systems:
//! - Fixed timestep simulation loop
//! - Connection slots with heartbeat eviction
//! - Receives `HELLO` / `INPUT`
//! - Replicates with `SPAWN` / `UPDATE` / `DESPAWN` / `EFFECT`
//!
//! Networking model:
//! - WebSocket, one JSON text frame per message
//! - One task per socket; the simulation only sees per-connection queues

pub mod components;
pub mod connection;
pub mod server;
pub mod spawner;
pub mod systems;
pub mod transport;

pub use connection::{ConnectionEvent, ConnectionId, ConnectionManager, DisconnectReason};
pub use server::{bind_ephemeral, GameServer};
