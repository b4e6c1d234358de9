//! Event and messaging system.
//!
//! A small typed event bus owned by the `World`.
//! - Server: damage, destruction effects, connection lifecycle.
//! - Client: effect spawns forwarded to the renderer.
//!
//! Events live until drained; producers and consumers meet at system order,
//! not at a callback.

use std::{
    any::{Any, TypeId},
    collections::HashMap,
};

/// Typed event bus.
#[derive(Default)]
pub struct EventBus {
    queues: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl EventBus {
    /// Pushes an event into the queue.
    pub fn push<E: 'static + Send + Sync>(&mut self, e: E) {
        let q = self
            .queues
            .entry(TypeId::of::<E>())
            .or_insert_with(|| Box::new(Vec::<E>::new()));
        let q = q.downcast_mut::<Vec<E>>().expect("queue type mismatch");
        q.push(e);
    }

    /// Drains all queued events of a type, in push order.
    pub fn drain<E: 'static + Send + Sync>(&mut self) -> Vec<E> {
        self.queues
            .remove(&TypeId::of::<E>())
            .and_then(|boxed| boxed.downcast::<Vec<E>>().ok())
            .map(|boxed| *boxed)
            .unwrap_or_default()
    }

    /// Number of pending events of a type.
    pub fn len<E: 'static + Send + Sync>(&self) -> usize {
        self.queues
            .get(&TypeId::of::<E>())
            .and_then(|boxed| boxed.downcast_ref::<Vec<E>>())
            .map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Hit(u32);

    #[test]
    fn drain_returns_events_in_order_and_empties_queue() {
        let mut bus = EventBus::default();
        bus.push(Hit(1));
        bus.push(Hit(2));
        bus.push("unrelated");
        assert_eq!(bus.len::<Hit>(), 2);
        assert_eq!(bus.drain::<Hit>(), vec![Hit(1), Hit(2)]);
        assert!(bus.drain::<Hit>().is_empty());
        assert_eq!(bus.len::<&str>(), 1);
    }
}
