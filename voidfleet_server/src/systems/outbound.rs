//! Network outbound: replication to joined sessions.

use std::sync::Arc;

use voidfleet_shared::{
    components::{Kind, Transform},
    ecs::{EntityId, QueryId, QuerySpec, System, World},
    protocol::{Despawn, Effect, EntityPose, EntitySpawn, Message, Spawn, Update},
};

use crate::{
    components::{Connection, Session},
    connection::{ConnectionId, ConnectionManager},
};

/// Replicates the world to every session that completed `HELLO`.
///
/// Visibility follows the `[Transform, Kind]` query: entities entering it are
/// announced with `SPAWN`, entities leaving it with `DESPAWN`. A session that
/// has not been synced yet gets the whole set instead of the diff. Poses go
/// out as `UPDATE` every tick.
#[derive(Default)]
pub struct NetworkOutbound {
    replicated: Option<QueryId>,
    sessions: Option<QueryId>,
}

fn describe(world: &World, e: EntityId) -> Option<EntitySpawn> {
    let t = world.get::<Transform>(e)?;
    let kind = world.get::<Kind>(e)?;
    Some(EntitySpawn {
        id: e,
        kind: kind.tag,
        position: t.position,
        rotation: t.rotation,
        scale: t.scale,
    })
}

impl System for NetworkOutbound {
    fn name(&self) -> &'static str {
        "network_outbound"
    }

    fn init(&mut self, world: &mut World) {
        self.replicated = Some(world.register_query(QuerySpec::new().with::<Transform>().with::<Kind>()));
        self.sessions = Some(world.register_query(QuerySpec::new().with::<Connection>().with::<Session>()));
    }

    fn run(&mut self, world: &mut World) {
        let (Some(replicated), Some(sessions)) = (self.replicated, self.sessions) else {
            return;
        };
        let effects = world.events.drain::<Effect>();
        let Some(manager) = world.resources.get::<Arc<ConnectionManager>>().cloned() else {
            return;
        };

        let view = world.query(replicated);

        let mut fresh = Vec::new();
        let mut synced = Vec::new();
        for e in world.results(sessions) {
            let (Some(conn), Some(session)) = (world.get::<Connection>(e), world.get::<Session>(e)) else {
                continue;
            };
            if session.synced {
                synced.push(conn.id());
            } else {
                fresh.push((e, conn.id()));
            }
        }

        if !fresh.is_empty() {
            let full = Message::Spawn(Spawn {
                entities: view.results.iter().filter_map(|e| describe(world, *e)).collect(),
            });
            let ids: Vec<ConnectionId> = fresh.iter().map(|(_, id)| *id).collect();
            manager.multicast(&ids, &full);
            for (e, _) in &fresh {
                if let Some(session) = world.get_mut::<Session>(*e) {
                    session.synced = true;
                }
            }
        }

        if !view.added.is_empty() {
            let spawn = Message::Spawn(Spawn {
                entities: view.added.iter().filter_map(|e| describe(world, *e)).collect(),
            });
            manager.multicast(&synced, &spawn);
        }
        if !view.removed.is_empty() {
            manager.multicast(&synced, &Message::Despawn(Despawn { ids: view.removed.clone() }));
        }

        let everyone: Vec<ConnectionId> = synced.into_iter().chain(fresh.into_iter().map(|(_, id)| id)).collect();
        for effect in effects {
            manager.multicast(&everyone, &Message::Effect(effect));
        }

        let update = Message::Update(Update {
            tick: world.time().tick,
            entities: view
                .results
                .iter()
                .filter_map(|e| {
                    let t = world.get::<Transform>(*e)?;
                    Some(EntityPose {
                        id: *e,
                        position: t.position,
                        rotation: t.rotation,
                    })
                })
                .collect(),
        });
        manager.multicast(&everyone, &update);
    }
}
