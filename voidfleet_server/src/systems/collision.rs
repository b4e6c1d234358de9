//! Collision.
//!
//! Bullets trace their last step as a segment against receiver spheres.
//! Overlapping physics bodies are pushed apart.

use voidfleet_shared::{
    components::{Destroyed, ParticleEffect, Physics, Raycaster, RaycasterReceiver, SphereCollider, Transform},
    ecs::{EntityId, QueryId, QuerySpec, System, World},
    math::Vec3,
    physics,
    protocol::Effect,
};

use super::Damage;

/// Projectile raycasts and body overlap.
///
/// A raycaster sweeps the segment it travelled this tick (`prev_position` to
/// `position`) and is consumed by the nearest receiver it crosses. Overlapping
/// bodies are pushed apart along the contact normal. Damage is only reported
/// here; `Lifecycle` applies it.
#[derive(Default)]
pub struct Collision {
    rays: Option<QueryId>,
    receivers: Option<QueryId>,
    bodies: Option<QueryId>,
}

struct Target {
    entity: EntityId,
    center: Vec3,
    radius: f32,
}

impl Collision {
    fn raycasts(&self, world: &mut World, rays: QueryId, receivers: QueryId) {
        let targets: Vec<Target> = world
            .results(receivers)
            .into_iter()
            .filter(|e| !world.has::<Destroyed>(*e))
            .filter_map(|e| {
                Some(Target {
                    entity: e,
                    center: world.get::<Transform>(e)?.position,
                    radius: world.get::<SphereCollider>(e)?.radius,
                })
            })
            .collect();

        for ray in world.results(rays) {
            if world.has::<Destroyed>(ray) {
                continue;
            }
            let (Some(t), Some(caster)) = (world.get::<Transform>(ray), world.get::<Raycaster>(ray).copied())
            else {
                continue;
            };
            let (start, end) = (t.prev_position, t.position);

            let hit = targets
                .iter()
                .filter(|target| target.entity != ray && Some(target.entity) != caster.owner)
                .filter_map(|target| {
                    physics::segment_sphere(start, end, target.center, target.radius).map(|frac| (frac, target))
                })
                .min_by(|a, b| a.0.total_cmp(&b.0));

            if let Some((frac, target)) = hit {
                world.events.push(Damage {
                    target: target.entity,
                    amount: caster.damage,
                    source: caster.owner,
                });
                world.events.push(Effect {
                    effect: ParticleEffect::Spark,
                    position: start.lerp(end, frac),
                });
                world.insert(ray, Destroyed);
            }
        }
    }

    fn separate(world: &mut World, bodies: QueryId) {
        let spheres: Vec<(EntityId, f32)> = world
            .results(bodies)
            .into_iter()
            .filter_map(|e| Some((e, world.get::<SphereCollider>(e)?.radius)))
            .collect();

        for (i, &(a, ra)) in spheres.iter().enumerate() {
            for &(b, rb) in &spheres[i + 1..] {
                let (Some(pa), Some(pb)) = (
                    world.get::<Transform>(a).map(|t| t.position),
                    world.get::<Transform>(b).map(|t| t.position),
                ) else {
                    continue;
                };
                let Some(contact) = physics::sphere_sphere(pa, ra, pb, rb) else { continue };

                let push = contact.normal * (contact.depth * 0.5);
                if let Some(t) = world.get_mut::<Transform>(a) {
                    t.position += -push;
                }
                if let Some(t) = world.get_mut::<Transform>(b) {
                    t.position += push;
                }

                // Cancel the approaching component of each velocity.
                if let Some(body) = world.get_mut::<Physics>(a) {
                    let closing = body.velocity.dot(contact.normal);
                    if closing > 0.0 {
                        body.velocity += -(contact.normal * closing);
                    }
                }
                if let Some(body) = world.get_mut::<Physics>(b) {
                    let closing = body.velocity.dot(contact.normal);
                    if closing < 0.0 {
                        body.velocity += -(contact.normal * closing);
                    }
                }
            }
        }
    }
}

impl System for Collision {
    fn name(&self) -> &'static str {
        "collision"
    }

    fn init(&mut self, world: &mut World) {
        self.rays = Some(world.register_query(QuerySpec::new().with::<Transform>().with::<Raycaster>()));
        self.receivers = Some(world.register_query(
            QuerySpec::new()
                .with::<Transform>()
                .with::<SphereCollider>()
                .with::<RaycasterReceiver>(),
        ));
        self.bodies = Some(world.register_query(
            QuerySpec::new()
                .with::<Transform>()
                .with::<Physics>()
                .with::<SphereCollider>(),
        ));
    }

    fn run(&mut self, world: &mut World) {
        if let (Some(rays), Some(receivers)) = (self.rays, self.receivers) {
            self.raycasts(world, rays, receivers);
        }
        if let Some(bodies) = self.bodies {
            Self::separate(world, bodies);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voidfleet_shared::math::Quat;

    fn target(world: &mut World, at: Vec3) -> EntityId {
        let e = world.spawn();
        world.insert(e, Transform::new(at, Quat::IDENTITY));
        world.insert(e, SphereCollider { radius: 1.0 });
        world.insert(e, RaycasterReceiver);
        e
    }

    fn projectile(world: &mut World, from: Vec3, to: Vec3, owner: Option<EntityId>) -> EntityId {
        let e = world.spawn();
        let mut t = Transform::new(from, Quat::IDENTITY);
        t.position = to;
        world.insert(e, t);
        world.insert(e, Raycaster { damage: 10.0, owner });
        e
    }

    #[test]
    fn projectile_hits_nearest_target_on_its_path() {
        let mut world = World::new();
        world.register_system(Collision::default(), 0);
        let far = target(&mut world, Vec3::new(0.0, 0.0, 8.0));
        let near = target(&mut world, Vec3::new(0.0, 0.0, 4.0));
        let ray = projectile(&mut world, Vec3::ZERO, Vec3::new(0.0, 0.0, 10.0), None);

        world.execute(0.033, 0.0);
        let hits = world.events.drain::<Damage>();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].target, near);
        assert_ne!(hits[0].target, far);
        assert!(world.has::<Destroyed>(ray));
        assert_eq!(world.events.drain::<Effect>().len(), 1);
    }

    #[test]
    fn projectile_ignores_its_owner() {
        let mut world = World::new();
        world.register_system(Collision::default(), 0);
        let owner = target(&mut world, Vec3::ZERO);
        let ray = projectile(&mut world, Vec3::ZERO, Vec3::new(0.0, 0.0, 0.5), Some(owner));

        world.execute(0.033, 0.0);
        assert!(world.events.drain::<Damage>().is_empty());
        assert!(!world.has::<Destroyed>(ray));
    }

    #[test]
    fn overlapping_bodies_are_separated() {
        let mut world = World::new();
        world.register_system(Collision::default(), 0);
        let mut body = |x: f32, vx: f32| {
            let e = world.spawn();
            world.insert(e, Transform::new(Vec3::new(x, 0.0, 0.0), Quat::IDENTITY));
            world.insert(
                e,
                Physics {
                    velocity: Vec3::new(vx, 0.0, 0.0),
                    ..Physics::default()
                },
            );
            world.insert(e, SphereCollider { radius: 1.0 });
            e
        };
        let a = body(0.0, 1.0);
        let b = body(1.0, -1.0);

        world.execute(0.033, 0.0);
        let pa = world.get::<Transform>(a).unwrap().position;
        let pb = world.get::<Transform>(b).unwrap().position;
        assert!((pb.x - pa.x - 2.0).abs() < 1e-5);
        assert_eq!(world.get::<Physics>(a).unwrap().velocity, Vec3::ZERO);
        assert_eq!(world.get::<Physics>(b).unwrap().velocity, Vec3::ZERO);
    }
}
