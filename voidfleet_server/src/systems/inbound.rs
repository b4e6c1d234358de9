//! Network inbound.
//!
//! Turns connection events into connection entities and drains each
//! connection's queue: `HELLO` binds a ship, `INPUT` replaces its controls.

use std::{collections::HashMap, sync::Arc};

use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};
use voidfleet_shared::{
    components::Input,
    ecs::{EntityId, QueryId, QuerySpec, System, World},
    error::ProtocolError,
    protocol::{Hello, Message, Welcome},
};

use crate::{
    components::{Connection, Session},
    connection::{ConnectionEvent, ConnectionId, ConnectionManager, Inbound},
    spawner,
};

/// Applies connection lifecycle events and drains every connection's inbox.
///
/// Each inbox is emptied completely, in arrival order, so later stages see the
/// last `INPUT` received before the tick.
pub struct NetworkInbound {
    events: UnboundedReceiver<ConnectionEvent>,
    entities: HashMap<ConnectionId, EntityId>,
    tick_rate: u32,
    query: Option<QueryId>,
}

impl NetworkInbound {
    pub fn new(events: UnboundedReceiver<ConnectionEvent>, tick_rate: u32) -> Self {
        Self {
            events,
            entities: HashMap::new(),
            tick_rate,
            query: None,
        }
    }

    fn apply_events(&mut self, world: &mut World) {
        while let Ok(event) = self.events.try_recv() {
            match event {
                ConnectionEvent::Connected { handle, peer } => {
                    let id = handle.id;
                    let e = world.spawn();
                    world.insert(
                        e,
                        Connection {
                            handle,
                            peer,
                            last_message_at: None,
                        },
                    );
                    self.entities.insert(id, e);
                    debug!(connection = %id, entity = %e, "connection entity spawned");
                }
                ConnectionEvent::Disconnected { id, reason } => {
                    let Some(e) = self.entities.remove(&id) else { continue };
                    let idle = world
                        .get::<Connection>(e)
                        .and_then(|conn| conn.last_message_at)
                        .map(|at| world.time().now - at);
                    if let Some(ship) = world.get::<Session>(e).and_then(|s| s.ship) {
                        world.despawn(ship);
                    }
                    world.despawn(e);
                    debug!(connection = %id, entity = %e, %reason, ?idle, "connection entity despawned");
                }
            }
        }
    }

    fn on_hello(&self, world: &mut World, e: EntityId, id: ConnectionId, hello: &Hello) {
        let name = hello.sanitized_name();
        let (live_ship, synced) = match world.get::<Session>(e) {
            Some(session) => (session.ship.filter(|ship| world.is_alive(*ship)), session.synced),
            None => (None, false),
        };

        let ship = match live_ship {
            Some(ship) => ship,
            None => {
                let ship = spawner::ship(world, id);
                info!(connection = %id, %name, %ship, "ship spawned");
                ship
            }
        };
        world.insert(
            e,
            Session {
                name: name.clone(),
                ship: Some(ship),
                synced,
            },
        );

        let welcome = Message::Welcome(Welcome {
            entity_id: ship,
            name,
            tick_rate: self.tick_rate,
        });
        if let Some(manager) = world.resources.get::<Arc<ConnectionManager>>() {
            manager.send(id, &welcome);
        }
    }

    fn on_input(world: &mut World, e: EntityId, input: Input) {
        let Some(ship) = world.get::<Session>(e).and_then(|s| s.ship) else {
            debug!(entity = %e, "input before hello ignored");
            return;
        };
        if let Some(slot) = world.get_mut::<Input>(ship) {
            *slot = input;
        }
    }
}

impl System for NetworkInbound {
    fn name(&self) -> &'static str {
        "network_inbound"
    }

    fn init(&mut self, world: &mut World) {
        self.query = Some(world.register_query(QuerySpec::new().with::<Connection>()));
    }

    fn run(&mut self, world: &mut World) {
        self.apply_events(world);

        let Some(q) = self.query else { return };
        let now = world.time().now;
        for e in world.results(q) {
            let Some(conn) = world.get_mut::<Connection>(e) else { continue };
            let id = conn.id();
            let mut inbox: Vec<Inbound> = Vec::new();
            while let Ok(item) = conn.handle.inbound.try_recv() {
                inbox.push(item);
            }
            if inbox.is_empty() {
                continue;
            }
            conn.last_message_at = Some(now);

            for item in inbox {
                match item {
                    Ok(Message::Hello(hello)) => self.on_hello(world, e, id, &hello),
                    Ok(Message::Input(input)) => Self::on_input(world, e, input),
                    Ok(other) => debug!(connection = %id, kind = other.kind(), "server-bound message ignored"),
                    Err(ProtocolError::UnrecognizedMessage(kind)) => {
                        warn!(connection = %id, %kind, "unrecognized message dropped");
                    }
                    Err(error) => warn!(connection = %id, %error, "malformed message dropped"),
                }
            }
        }
    }
}
