//! `voidfleet_shared`
//!
//! Shared libraries used by both client and server.
//!
//! Design goals:
//! - One explicitly owned `World` per process; no ambient globals.
//! - Systems act on component sets, never on entity identity.
//! - Clear separation of concerns (ecs, components, protocol, net, math).
//! - No `unsafe`.

pub mod components;
pub mod config;
pub mod ecs;
pub mod error;
pub mod event;
pub mod math;
pub mod net;
pub mod physics;
pub mod protocol;
pub mod resources;

pub mod prelude {
    //! Commonly used exports.

    pub use crate::components::*;
    pub use crate::config::*;
    pub use crate::ecs::*;
    pub use crate::error::*;
    pub use crate::event::*;
    pub use crate::math::*;
    pub use crate::protocol::Message;
    pub use crate::resources::*;
}
