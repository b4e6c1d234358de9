//! Error types shared by client and server.
//!
//! Library code returns these typed errors; binaries and setup paths wrap
//! them in `anyhow` with context.

use thiserror::Error;

use crate::ecs::EntityId;

/// Failures of strict world operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EcsError {
    #[error("entity {0} does not exist")]
    NoSuchEntity(EntityId),

    #[error("entity {entity} already has a {component}")]
    DuplicateComponent {
        entity: EntityId,
        component: &'static str,
    },

    #[error("entity {entity} has no {component}")]
    MissingComponent {
        entity: EntityId,
        component: &'static str,
    },
}

/// Failures decoding or encoding wire messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame is not a `{type, data}` object, or `data` does not fit the type.
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Well-formed envelope carrying a type this side does not handle.
    #[error("unrecognized message type {0:?}")]
    UnrecognizedMessage(String),

    /// Frame kind the protocol does not use (binary payloads).
    #[error("unsupported frame")]
    UnsupportedFrame,
}

/// Connection-level failures. Never fatal to the simulation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NetError {
    #[error("connection rejected: all {max_clients} slots are in use")]
    ConnectionRejected { max_clients: usize },

    #[error("connection lost: {0}")]
    ConnectionLost(String),
}
