//! Weapon firing.

use voidfleet_shared::{
    components::{Input, Physics, Transform, Weapon},
    ecs::{EntityId, QueryId, QuerySpec, System, World},
    math::{Quat, Vec3},
};

use crate::spawner::{self, BULLET_SPEED};

/// Fires every ready weapon whose parent holds the primary trigger.
#[derive(Default)]
pub struct WeaponFiring {
    query: Option<QueryId>,
}

struct Shot {
    weapon: EntityId,
    owner: EntityId,
    origin: Vec3,
    rotation: Quat,
    velocity: Vec3,
}

impl System for WeaponFiring {
    fn name(&self) -> &'static str {
        "weapon_firing"
    }

    fn init(&mut self, world: &mut World) {
        self.query = Some(world.register_query(QuerySpec::new().with::<Weapon>()));
    }

    fn run(&mut self, world: &mut World) {
        let Some(q) = self.query else { return };
        let now = world.time().now;

        let mut shots = Vec::new();
        for e in world.results(q) {
            let Some(weapon) = world.get::<Weapon>(e) else { continue };
            if !weapon.ready(now) {
                continue;
            }
            let parent = weapon.parent;
            if !world.get::<Input>(parent).is_some_and(|i| i.weapon_primary) {
                continue;
            }
            let Some(t) = world.get::<Transform>(parent) else { continue };
            let inherited = world.get::<Physics>(parent).map_or(Vec3::ZERO, |p| p.velocity);
            shots.push(Shot {
                weapon: e,
                owner: parent,
                origin: t.to_world(weapon.offset),
                rotation: t.rotation,
                velocity: inherited + t.forward() * BULLET_SPEED,
            });
        }

        for shot in shots {
            spawner::bullet(world, shot.origin, shot.rotation, shot.velocity, shot.owner, now);
            if let Some(weapon) = world.get_mut::<Weapon>(shot.weapon) {
                weapon.last_fired_at = Some(now);
            }
        }
    }
}
