//! Client-side systems and the resources they share.
//!
//! The client mirrors the replicated part of the server world. Server ids are
//! mapped to local entities, so local ids stay dense and can address
//! instance slots directly.

mod network;
mod render;

use std::collections::{HashMap, VecDeque};

use voidfleet_shared::{ecs::{EntityId, World}, protocol::Message};

use crate::{interp::SnapshotClock, render::RenderBackend};

pub use network::NetworkReceive;
pub use render::RenderSystem;

pub mod priority {
    pub const NETWORK_RECEIVE: i32 = 0;
    pub const RENDER: i32 = 10;
}

/// Server id of a mirrored entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Replicated {
    pub server_id: EntityId,
}

/// Messages received since the last frame, in arrival order.
#[derive(Debug, Default)]
pub struct Inbox {
    pub messages: VecDeque<Message>,
}

/// Server id to local entity.
#[derive(Debug, Default)]
pub struct ReplicaIndex {
    pub local: HashMap<EntityId, EntityId>,
}

/// The entity this client controls, once `WELCOME` arrived.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocalPlayer {
    pub server_id: Option<EntityId>,
    pub name: String,
}

impl LocalPlayer {
    /// Local mirror of the controlled ship, if it is currently replicated.
    pub fn entity(&self, index: &ReplicaIndex) -> Option<EntityId> {
        self.server_id.and_then(|id| index.local.get(&id).copied())
    }
}

/// Builds a client world that renders through `renderer`.
pub fn build_world(renderer: Box<dyn RenderBackend>) -> World {
    let mut world = World::new();
    world.resources.insert(Inbox::default());
    world.resources.insert(ReplicaIndex::default());
    world.resources.insert(LocalPlayer::default());
    world.resources.insert(SnapshotClock::default());
    world.register_system(NetworkReceive, priority::NETWORK_RECEIVE);
    world.register_system(RenderSystem::new(renderer), priority::RENDER);
    world
}
