//! Transform history: the tick boundary for interpolation.

use voidfleet_shared::{
    components::Transform,
    ecs::{QueryId, QuerySpec, System, World},
};

/// Copies every pose into `prev_*` before anything moves this tick.
///
/// This is the only writer of `prev_*`, so the pair a renderer blends is always
/// (pose at the previous boundary, pose at this one).
#[derive(Default)]
pub struct TransformHistory {
    query: Option<QueryId>,
}

impl System for TransformHistory {
    fn name(&self) -> &'static str {
        "transform_history"
    }

    fn init(&mut self, world: &mut World) {
        self.query = Some(world.register_query(QuerySpec::new().with::<Transform>()));
    }

    fn run(&mut self, world: &mut World) {
        let Some(q) = self.query else { return };
        for e in world.results(q) {
            if let Some(t) = world.get_mut::<Transform>(e) {
                t.snapshot();
            }
        }
    }
}
