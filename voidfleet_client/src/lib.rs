//! `voidfleet_client`
//!
//! Client-side systems:
//! - WebSocket session (`HELLO` / `WELCOME` handshake, JSON frames)
//! - Input sampling and deduplicated `INPUT` messages
//! - A mirrored world fed by server replication
//! - Interpolation between server ticks for rendering
//! - Rendering abstraction with per-kind instance buffers

pub mod client;
pub mod input;
pub mod interp;
pub mod render;
pub mod systems;

pub use client::{ClientState, GameClient};
