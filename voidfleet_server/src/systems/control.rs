//! Ship control: `Input` to thrust and torque.

use voidfleet_shared::{
    components::{Input, Physics, Transform},
    ecs::{QueryId, QuerySpec, System, World},
};

/// Linear acceleration from thrusters, units per second squared.
pub const THRUST: f32 = 40.0;
pub const BOOST_FACTOR: f32 = 2.5;
/// Angular speed at full stick, radians per second.
pub const TURN_RATE: f32 = 2.0;
/// Turning is damped while aiming, for precision.
pub const AIM_TURN_FACTOR: f32 = 0.4;

/// Turns the latest `Input` into acceleration and spin.
#[derive(Default)]
pub struct ShipControl {
    query: Option<QueryId>,
}

impl System for ShipControl {
    fn name(&self) -> &'static str {
        "ship_control"
    }

    fn init(&mut self, world: &mut World) {
        self.query = Some(
            world.register_query(QuerySpec::new().with::<Transform>().with::<Physics>().with::<Input>()),
        );
    }

    fn run(&mut self, world: &mut World) {
        let Some(q) = self.query else { return };
        let dt = world.time().delta;
        for e in world.results(q) {
            let (Some(input), Some(rotation)) = (
                world.get::<Input>(e).copied(),
                world.get::<Transform>(e).map(|t| t.rotation),
            ) else {
                continue;
            };
            let Some(body) = world.get_mut::<Physics>(e) else { continue };

            let accel = if input.boost { THRUST * BOOST_FACTOR } else { THRUST };
            body.velocity += rotation.rotate(input.thrust().normalize_or_zero()) * (accel * dt);

            let turn = if input.aim { TURN_RATE * AIM_TURN_FACTOR } else { TURN_RATE };
            body.angular_velocity = input.torque() * turn;
        }
    }
}
