//! Motion integration.

use voidfleet_shared::{
    components::{Physics, Transform},
    ecs::{QueryId, QuerySpec, System, World},
    physics::{self, PhysicsConfig},
};

/// Integrates every body by the clamped tick delta.
pub struct Motion {
    config: PhysicsConfig,
    query: Option<QueryId>,
}

impl Motion {
    pub fn new(config: PhysicsConfig) -> Self {
        Self { config, query: None }
    }
}

impl System for Motion {
    fn name(&self) -> &'static str {
        "motion"
    }

    fn init(&mut self, world: &mut World) {
        self.query = Some(world.register_query(QuerySpec::new().with::<Transform>().with::<Physics>()));
    }

    fn run(&mut self, world: &mut World) {
        let Some(q) = self.query else { return };
        let dt = world.time().delta;
        for e in world.results(q) {
            let (Some(mut transform), Some(mut body)) =
                (world.get::<Transform>(e).copied(), world.get::<Physics>(e).copied())
            else {
                continue;
            };
            physics::integrate(&mut transform, &mut body, &self.config, dt);
            world.insert(e, transform);
            world.insert(e, body);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voidfleet_shared::math::{Quat, Vec3};

    #[test]
    fn stalled_tick_moves_by_at_most_a_quarter_second() {
        let mut world = World::new();
        world.register_system(Motion::new(PhysicsConfig::default()), 0);
        let e = world.spawn();
        world.insert(e, Transform::new(Vec3::ZERO, Quat::IDENTITY));
        world.insert(
            e,
            Physics {
                velocity: Vec3::new(10.0, 0.0, 0.0),
                damping: 1.0,
                ..Physics::default()
            },
        );

        world.execute(5.0, 5.0);
        assert_eq!(world.get::<Transform>(e).unwrap().position, Vec3::new(2.5, 0.0, 0.0));
    }
}
