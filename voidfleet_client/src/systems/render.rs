//! Rendering of the mirror world.

use std::collections::HashMap;

use voidfleet_shared::{
    components::{EntityKind, Kind, Transform},
    ecs::{QueryId, QuerySpec, System, World},
    math::Mat4,
    protocol::Effect,
};

use super::{LocalPlayer, ReplicaIndex, Replicated};
use crate::{
    interp::{render_pose, InstanceBuffer, SnapshotClock},
    render::RenderBackend,
};

/// Instances per instanced mesh.
pub const INSTANCE_CAPACITY: usize = 4096;

/// Draws the mirrored world at the interpolated pose.
///
/// Visuals follow the query diffs: entities entering `[Transform, Kind,
/// Replicated]` are attached (or given an instance slot), entities leaving it
/// are detached. Nothing else creates or destroys visuals.
pub struct RenderSystem {
    renderer: Box<dyn RenderBackend>,
    instances: HashMap<EntityKind, InstanceBuffer>,
    query: Option<QueryId>,
}

impl RenderSystem {
    pub fn new(renderer: Box<dyn RenderBackend>) -> Self {
        Self {
            renderer,
            instances: HashMap::new(),
            query: None,
        }
    }

    fn buffer(&mut self, kind: EntityKind) -> &mut InstanceBuffer {
        self.instances
            .entry(kind)
            .or_insert_with(|| InstanceBuffer::new(INSTANCE_CAPACITY))
    }
}

impl System for RenderSystem {
    fn name(&self) -> &'static str {
        "render"
    }

    fn init(&mut self, world: &mut World) {
        self.query = Some(
            world.register_query(QuerySpec::new().with::<Transform>().with::<Kind>().with::<Replicated>()),
        );
    }

    fn run(&mut self, world: &mut World) {
        let Some(q) = self.query else { return };
        let view = world.query(q);

        for e in &view.removed {
            let Some(kind) = world.removed::<Kind>(*e).map(|k| k.tag) else { continue };
            if kind.is_instanced() {
                if let Some(slot) = self.buffer(kind).clear(*e) {
                    self.renderer.clear_instance(kind, slot);
                }
            } else {
                self.renderer.detach(*e);
            }
        }
        for e in &view.added {
            let (Some(kind), Some(t)) = (world.get::<Kind>(*e), world.get::<Transform>(*e)) else {
                continue;
            };
            if !kind.tag.is_instanced() {
                self.renderer.attach(*e, kind.tag, t.scale);
            }
        }

        let alpha = world
            .resources
            .get::<SnapshotClock>()
            .map_or(1.0, |clock| clock.alpha(world.time().now));

        for e in view.results {
            let (Some(kind), Some(t)) = (world.get::<Kind>(e).map(|k| k.tag), world.get::<Transform>(e)) else {
                continue;
            };
            let (position, rotation) = render_pose(t, alpha);
            if kind.is_instanced() {
                let matrix = Mat4::from_trs(position, rotation, t.scale);
                if let Some(slot) = self.buffer(kind).set(e, matrix) {
                    self.renderer.set_instance(kind, slot, matrix);
                }
            } else {
                self.renderer.set_pose(e, position, rotation);
            }
        }

        let player = world
            .resources
            .get::<LocalPlayer>()
            .zip(world.resources.get::<ReplicaIndex>())
            .and_then(|(player, index)| player.entity(index));
        if let Some(t) = player.and_then(|e| world.get::<Transform>(e)) {
            let (position, rotation) = render_pose(t, alpha);
            self.renderer.set_camera(position, rotation);
        }

        for effect in world.events.drain::<Effect>() {
            self.renderer.spawn_effect(effect.effect, effect.position);
        }

        self.renderer.present();
    }
}
