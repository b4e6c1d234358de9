//! The simulation pipeline.
//!
//! One system per stage, run in ascending priority by `World::execute`:
//!
//! | priority | system | stage |
//! |---|---|---|
//! | 0 | `TransformHistory` | tick boundary, `prev_*` snapshot |
//! | 1 | `NetworkInbound` | connection events, `HELLO`, `INPUT` |
//! | 2 | `ShipControl` | input to thrust and torque |
//! | 3 | `Motion` | integration |
//! | 4 | `WeaponFiring` | projectile spawns |
//! | 5 | `Collision` | raycasts and body overlap, damage events |
//! | 6 | `Lifecycle` | damage, timeouts, destruction |
//! | 7 | `NetworkOutbound` | replication to clients |

mod collision;
mod control;
mod history;
mod inbound;
mod lifecycle;
mod motion;
mod outbound;
mod weapons;

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;
use voidfleet_shared::{ecs::{EntityId, World}, physics::PhysicsConfig};

use crate::{
    connection::{ConnectionEvent, ConnectionManager},
    spawner::Spawner,
};

pub use collision::Collision;
pub use control::ShipControl;
pub use history::TransformHistory;
pub use inbound::NetworkInbound;
pub use lifecycle::Lifecycle;
pub use motion::Motion;
pub use outbound::NetworkOutbound;
pub use weapons::WeaponFiring;

pub mod priority {
    pub const HISTORY: i32 = 0;
    pub const NETWORK_INBOUND: i32 = 1;
    pub const SHIP_CONTROL: i32 = 2;
    pub const MOTION: i32 = 3;
    pub const WEAPONS: i32 = 4;
    pub const COLLISION: i32 = 5;
    pub const LIFECYCLE: i32 = 6;
    pub const NETWORK_OUTBOUND: i32 = 7;
}

/// Health loss produced by the collision stage, applied by `Lifecycle`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Damage {
    pub target: EntityId,
    pub amount: f32,
    pub source: Option<EntityId>,
}

/// Inputs for `install`.
pub struct Pipeline {
    pub manager: Arc<ConnectionManager>,
    pub events: UnboundedReceiver<ConnectionEvent>,
    pub tick_rate: u32,
    pub seed: u64,
    pub physics: PhysicsConfig,
}

/// Registers every stage and the resources they share.
pub fn install(world: &mut World, pipeline: Pipeline) {
    world.resources.insert(pipeline.manager);
    world.resources.insert(Spawner::new(pipeline.seed));

    world.register_system(TransformHistory::default(), priority::HISTORY);
    world.register_system(NetworkInbound::new(pipeline.events, pipeline.tick_rate), priority::NETWORK_INBOUND);
    world.register_system(ShipControl::default(), priority::SHIP_CONTROL);
    world.register_system(Motion::new(pipeline.physics), priority::MOTION);
    world.register_system(WeaponFiring::default(), priority::WEAPONS);
    world.register_system(Collision::default(), priority::COLLISION);
    world.register_system(Lifecycle::default(), priority::LIFECYCLE);
    world.register_system(NetworkOutbound::default(), priority::NETWORK_OUTBOUND);
}
