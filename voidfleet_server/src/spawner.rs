//! Entity templates.
//!
//! Every gameplay entity is assembled here, so the component sets systems
//! match on are defined in one place.

use rand::{rngs::StdRng, Rng, SeedableRng};
use voidfleet_shared::{
    components::{
        EntityKind, Health, Input, Kind, ParticleEffect, ParticleEffectOnDestroy, Physics, Raycaster,
        RaycasterReceiver, SphereCollider, Timeout, Transform, Weapon, WeaponKind, Weapons,
    },
    ecs::{EntityId, World},
    math::{Quat, Vec3},
};

use crate::{components::Pilot, connection::ConnectionId};

pub const SHIP_HEALTH: f32 = 100.0;
pub const SHIP_RADIUS: f32 = 1.0;
/// Muzzles relative to the ship, left and right of the nose.
pub const SHIP_GUN_OFFSETS: [Vec3; 2] = [Vec3::new(-0.5, 0.0, 0.5), Vec3::new(0.5, 0.0, 0.5)];
pub const GUN_FIRE_INTERVAL: f64 = 0.1;

pub const BULLET_SPEED: f32 = 150.0;
pub const BULLET_DAMAGE: f32 = 10.0;
pub const BULLET_LIFETIME: f64 = 1.5;

pub const ASTEROID_MIN_RADIUS: f32 = 2.0;
pub const ASTEROID_MAX_RADIUS: f32 = 6.0;
pub const ASTEROID_HEALTH_PER_RADIUS: f32 = 40.0;

/// Seeded placement source, stored as a world resource.
pub struct Spawner {
    rng: StdRng,
    /// Half-extent of the cube entities are placed in.
    pub field_radius: f32,
}

impl Spawner {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            field_radius: 200.0,
        }
    }

    fn position(&mut self) -> Vec3 {
        let r = self.field_radius;
        Vec3::new(
            self.rng.gen_range(-r..r),
            self.rng.gen_range(-r..r),
            self.rng.gen_range(-r..r),
        )
    }

    fn rotation(&mut self) -> Quat {
        let axis = Vec3::new(
            self.rng.gen_range(-1.0..1.0),
            self.rng.gen_range(-1.0..1.0),
            self.rng.gen_range(-1.0..1.0),
        );
        Quat::from_axis_angle(axis, self.rng.gen_range(0.0..std::f32::consts::TAU))
    }
}

impl Default for Spawner {
    fn default() -> Self {
        Self::new(0)
    }
}

fn place(world: &mut World, f: impl FnOnce(&mut Spawner) -> (Vec3, Quat)) -> (Vec3, Quat) {
    world
        .resource_scope(|_, spawner: &mut Spawner| f(spawner))
        .unwrap_or((Vec3::ZERO, Quat::IDENTITY))
}

/// A player ship with its two guns, controlled through `Input`.
pub fn ship(world: &mut World, pilot: ConnectionId) -> EntityId {
    let (position, _) = place(world, |s| (s.position(), Quat::IDENTITY));

    let ship = world.spawn();
    world.insert(ship, Transform::new(position, Quat::IDENTITY));
    world.insert(ship, Physics::default());
    world.insert(ship, SphereCollider { radius: SHIP_RADIUS });
    world.insert(ship, Health { value: SHIP_HEALTH });
    world.insert(ship, RaycasterReceiver);
    world.insert(
        ship,
        ParticleEffectOnDestroy {
            effect: ParticleEffect::Explosion,
        },
    );
    world.insert(ship, Kind::new(EntityKind::Ship));
    world.insert(ship, Input::default());
    world.insert(ship, Pilot { connection: pilot });

    let primary = SHIP_GUN_OFFSETS.iter().map(|offset| gun(world, ship, *offset)).collect();
    world.insert(ship, Weapons { primary });
    ship
}

fn gun(world: &mut World, parent: EntityId, offset: Vec3) -> EntityId {
    let e = world.spawn();
    world.insert(
        e,
        Weapon {
            kind: WeaponKind::Gun,
            offset,
            fire_interval: GUN_FIRE_INTERVAL,
            last_fired_at: None,
            parent,
        },
    );
    e
}

/// A projectile. It damages the first receiver its motion segment crosses.
pub fn bullet(world: &mut World, position: Vec3, rotation: Quat, velocity: Vec3, owner: EntityId, now: f64) -> EntityId {
    let e = world.spawn();
    world.insert(e, Transform::new(position, rotation));
    world.insert(
        e,
        Physics {
            velocity,
            angular_velocity: Vec3::ZERO,
            damping: 1.0,
        },
    );
    world.insert(e, Kind::new(EntityKind::Bullet));
    world.insert(
        e,
        Timeout {
            expires_at: now + BULLET_LIFETIME,
        },
    );
    world.insert(
        e,
        Raycaster {
            damage: BULLET_DAMAGE,
            owner: Some(owner),
        },
    );
    e
}

pub fn asteroid(world: &mut World) -> EntityId {
    let (position, rotation) = place(world, |s| (s.position(), s.rotation()));
    let (radius, spin) = world
        .resource_scope(|_, s: &mut Spawner| {
            let radius = s.rng.gen_range(ASTEROID_MIN_RADIUS..ASTEROID_MAX_RADIUS);
            let spin = Vec3::new(s.rng.gen_range(-0.2..0.2), s.rng.gen_range(-0.2..0.2), 0.0);
            (radius, spin)
        })
        .unwrap_or((ASTEROID_MIN_RADIUS, Vec3::ZERO));

    let e = world.spawn();
    world.insert(e, Transform::new(position, rotation).with_scale(radius));
    world.insert(
        e,
        Physics {
            velocity: Vec3::ZERO,
            angular_velocity: spin,
            damping: 1.0,
        },
    );
    world.insert(e, SphereCollider { radius });
    world.insert(
        e,
        Health {
            value: radius * ASTEROID_HEALTH_PER_RADIUS,
        },
    );
    world.insert(e, RaycasterReceiver);
    world.insert(
        e,
        ParticleEffectOnDestroy {
            effect: ParticleEffect::Explosion,
        },
    );
    world.insert(e, Kind::new(EntityKind::Asteroid));
    e
}

pub fn asteroid_field(world: &mut World, count: usize) {
    for _ in 0..count {
        asteroid(world);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionManager;

    #[test]
    fn ship_carries_two_guns_pointing_back_at_it() {
        let mut world = World::new();
        world.resources.insert(Spawner::new(1));
        let (manager, _events) = ConnectionManager::new(1);
        let side = manager.accept(([127, 0, 0, 1], 1).into()).unwrap();

        let ship = ship(&mut world, side.id);
        let guns = &world.get::<Weapons>(ship).unwrap().primary;
        assert_eq!(guns.len(), 2);
        for gun in guns {
            let weapon = world.get::<Weapon>(*gun).unwrap();
            assert_eq!(weapon.parent, ship);
            assert_eq!(weapon.fire_interval, GUN_FIRE_INTERVAL);
        }
        assert_eq!(world.get::<Health>(ship).unwrap().value, SHIP_HEALTH);
        assert!(world.has::<Input>(ship));
    }

    #[test]
    fn placement_is_seeded() {
        let mut a = World::new();
        a.resources.insert(Spawner::new(7));
        let mut b = World::new();
        b.resources.insert(Spawner::new(7));

        let ea = asteroid(&mut a);
        let eb = asteroid(&mut b);
        assert_eq!(a.get::<Transform>(ea), b.get::<Transform>(eb));
    }
}
