//! Damage, expiry and destruction.

use tracing::debug;
use voidfleet_shared::{
    components::{Destroyed, Health, ParticleEffectOnDestroy, Timeout, Transform, Weapon, Weapons},
    ecs::{QueryId, QuerySpec, System, World},
    protocol::Effect,
};

use super::Damage;

/// Applies damage, expires timeouts and removes destroyed entities.
///
/// An entity is marked `Destroyed` at most once and despawned in the same
/// pass, so its destruction effect is emitted exactly once no matter how many
/// lethal hits it took.
#[derive(Default)]
pub struct Lifecycle {
    health: Option<QueryId>,
    timeouts: Option<QueryId>,
    weapons: Option<QueryId>,
    destroyed: Option<QueryId>,
}

impl System for Lifecycle {
    fn name(&self) -> &'static str {
        "lifecycle"
    }

    fn init(&mut self, world: &mut World) {
        self.health = Some(world.register_query(QuerySpec::new().with::<Health>()));
        self.timeouts = Some(world.register_query(QuerySpec::new().with::<Timeout>()));
        self.weapons = Some(world.register_query(QuerySpec::new().with::<Weapon>()));
        self.destroyed = Some(world.register_query(QuerySpec::new().with::<Destroyed>()));
    }

    fn run(&mut self, world: &mut World) {
        let (Some(health), Some(timeouts), Some(weapons), Some(destroyed)) =
            (self.health, self.timeouts, self.weapons, self.destroyed)
        else {
            return;
        };
        let now = world.time().now;

        for hit in world.events.drain::<Damage>() {
            if world.has::<Destroyed>(hit.target) {
                continue;
            }
            if let Some(h) = world.get_mut::<Health>(hit.target) {
                h.value -= hit.amount;
            }
        }

        let mut doomed: Vec<_> = world
            .results(health)
            .into_iter()
            .filter(|e| world.get::<Health>(*e).is_some_and(|h| h.value <= 0.0))
            .collect();
        doomed.extend(
            world
                .results(timeouts)
                .into_iter()
                .filter(|e| world.get::<Timeout>(*e).is_some_and(|t| now >= t.expires_at)),
        );
        for e in doomed {
            if !world.has::<Destroyed>(e) {
                world.insert(e, Destroyed);
            }
        }

        for e in world.results(destroyed) {
            let effect = world.get::<ParticleEffectOnDestroy>(e).zip(world.get::<Transform>(e)).map(|(on_destroy, t)| Effect {
                effect: on_destroy.effect,
                position: t.position,
            });
            if let Some(effect) = effect {
                world.events.push(effect);
            }
            if let Some(mounted) = world.get::<Weapons>(e).map(|w| w.primary.clone()) {
                for weapon in mounted {
                    world.despawn(weapon);
                }
            }
            world.despawn(e);
            debug!(entity = %e, "destroyed");
        }

        // Weapons whose parent left by another path (disconnect).
        for e in world.results(weapons) {
            let orphaned = world.get::<Weapon>(e).is_some_and(|w| !world.is_alive(w.parent));
            if orphaned {
                world.despawn(e);
            }
        }
    }
}
