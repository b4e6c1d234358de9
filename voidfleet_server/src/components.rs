//! Server-only components.

use std::net::SocketAddr;

use voidfleet_shared::ecs::EntityId;

use crate::connection::{ConnectionHandle, ConnectionId};

/// Network endpoint attached to a connection entity.
#[derive(Debug)]
pub struct Connection {
    pub handle: ConnectionHandle,
    pub peer: SocketAddr,
    /// Simulation time of the last decoded message.
    pub last_message_at: Option<f64>,
}

impl Connection {
    pub fn id(&self) -> ConnectionId {
        self.handle.id
    }
}

/// Added to a connection entity by `HELLO`.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub name: String,
    /// Ship controlled by this session, if one is alive.
    pub ship: Option<EntityId>,
    /// Whether the client has received the full replicated state.
    pub synced: bool,
}

/// Back-reference from a ship to the connection flying it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pilot {
    pub connection: ConnectionId,
}
