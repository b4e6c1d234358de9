//! Server messages applied to the mirror world.

use tracing::{debug, info};
use voidfleet_shared::{
    components::{Kind, Transform},
    ecs::{System, World},
    protocol::{EntitySpawn, Message, Update},
};

use super::{Inbox, LocalPlayer, ReplicaIndex, Replicated};
use crate::interp::SnapshotClock;

/// Applies server messages to the mirrored world.
///
/// `UPDATE` shifts each pose into `prev_*` and stores the new one, then
/// restarts the interpolation clock.
pub struct NetworkReceive;

impl NetworkReceive {
    fn spawn(world: &mut World, index: &mut ReplicaIndex, spawn: EntitySpawn) {
        let transform = Transform {
            scale: spawn.scale,
            ..Transform::new(spawn.position, spawn.rotation)
        };
        if let Some(&local) = index.local.get(&spawn.id) {
            // Already known: a full resync after respawn. Snap, don't blend.
            world.insert(local, transform);
            world.insert(local, Kind::new(spawn.kind));
            return;
        }
        let local = world.spawn();
        world.insert(local, transform);
        world.insert(local, Kind::new(spawn.kind));
        world.insert(local, Replicated { server_id: spawn.id });
        index.local.insert(spawn.id, local);
    }

    fn update(world: &mut World, index: &ReplicaIndex, update: &Update) {
        for pose in &update.entities {
            let Some(&local) = index.local.get(&pose.id) else {
                debug!(server_id = %pose.id, "update for unknown entity");
                continue;
            };
            if let Some(t) = world.get_mut::<Transform>(local) {
                t.snapshot();
                t.position = pose.position;
                t.rotation = pose.rotation;
            }
        }
        let now = world.time().now;
        if let Some(clock) = world.resources.get_mut::<SnapshotClock>() {
            clock.last_tick_at = now;
            clock.server_tick = update.tick;
        }
    }
}

impl System for NetworkReceive {
    fn name(&self) -> &'static str {
        "network_receive"
    }

    fn run(&mut self, world: &mut World) {
        let messages = match world.resources.get_mut::<Inbox>() {
            Some(inbox) => std::mem::take(&mut inbox.messages),
            None => return,
        };
        let Some(mut index) = world.resources.remove::<ReplicaIndex>() else {
            return;
        };

        for msg in messages {
            match msg {
                Message::Welcome(welcome) => {
                    info!(entity = %welcome.entity_id, name = %welcome.name, tick_rate = welcome.tick_rate, "welcomed");
                    if let Some(clock) = world.resources.get_mut::<SnapshotClock>() {
                        clock.tick_interval = 1.0 / f64::from(welcome.tick_rate.max(1));
                    }
                    world.resources.insert(LocalPlayer {
                        server_id: Some(welcome.entity_id),
                        name: welcome.name,
                    });
                }
                Message::Spawn(spawn) => {
                    for entity in spawn.entities {
                        Self::spawn(world, &mut index, entity);
                    }
                }
                Message::Update(update) => Self::update(world, &index, &update),
                Message::Despawn(despawn) => {
                    for id in despawn.ids {
                        if let Some(local) = index.local.remove(&id) {
                            world.despawn(local);
                        }
                    }
                }
                Message::Effect(effect) => world.events.push(effect),
                other => debug!(kind = other.kind(), "client-bound message ignored"),
            }
        }

        world.resources.insert(index);
    }
}
