//! Rendering abstraction.
//!
//! This crate intentionally does not depend on a graphics backend. The render
//! system drives a `RenderBackend`; a real client plugs in a GPU renderer,
//! headless runs use `NullRenderer`.

use std::sync::{Arc, Mutex};

use voidfleet_shared::{
    components::{EntityKind, ParticleEffect},
    ecs::EntityId,
    math::{Mat4, Quat, Vec3},
};

/// The calls a renderer has to answer.
///
/// Individually drawn entities are `attach`ed once and then posed every frame.
/// Instanced kinds bypass that and write matrices into shared slots.
pub trait RenderBackend: Send + Sync {
    /// Creates the visual for a newly visible entity.
    fn attach(&mut self, entity: EntityId, kind: EntityKind, scale: Vec3);
    fn detach(&mut self, entity: EntityId);
    fn set_pose(&mut self, entity: EntityId, position: Vec3, rotation: Quat);
    /// Writes one instance matrix of `kind`'s instanced mesh.
    fn set_instance(&mut self, kind: EntityKind, slot: usize, matrix: Mat4);
    fn clear_instance(&mut self, kind: EntityKind, slot: usize);
    fn set_camera(&mut self, position: Vec3, rotation: Quat);
    fn spawn_effect(&mut self, effect: ParticleEffect, position: Vec3);
    /// Ends the frame.
    fn present(&mut self);
}

/// A no-op renderer useful for headless runs.
#[derive(Default)]
pub struct NullRenderer;

impl RenderBackend for NullRenderer {
    fn attach(&mut self, _entity: EntityId, _kind: EntityKind, _scale: Vec3) {}
    fn detach(&mut self, _entity: EntityId) {}
    fn set_pose(&mut self, _entity: EntityId, _position: Vec3, _rotation: Quat) {}
    fn set_instance(&mut self, _kind: EntityKind, _slot: usize, _matrix: Mat4) {}
    fn clear_instance(&mut self, _kind: EntityKind, _slot: usize) {}
    fn set_camera(&mut self, _position: Vec3, _rotation: Quat) {}
    fn spawn_effect(&mut self, _effect: ParticleEffect, _position: Vec3) {}
    fn present(&mut self) {}
}

#[derive(Debug, Clone, PartialEq)]
pub enum RenderCall {
    Attach(EntityId, EntityKind),
    Detach(EntityId),
    Pose(EntityId, Vec3),
    Instance(EntityKind, usize, Vec3),
    ClearInstance(EntityKind, usize),
    Camera(Vec3),
    Effect(ParticleEffect, Vec3),
    Present,
}

/// Records every call into a shared log. The log handle outlives the
/// renderer, which the world owns.
#[derive(Default, Clone)]
pub struct RecordingRenderer {
    pub log: Arc<Mutex<Vec<RenderCall>>>,
}

impl RecordingRenderer {
    fn push(&self, call: RenderCall) {
        if let Ok(mut log) = self.log.lock() {
            log.push(call);
        }
    }

    /// Takes the calls recorded so far.
    pub fn take(&self) -> Vec<RenderCall> {
        self.log.lock().map(|mut log| std::mem::take(&mut *log)).unwrap_or_default()
    }
}

impl RenderBackend for RecordingRenderer {
    fn attach(&mut self, entity: EntityId, kind: EntityKind, _scale: Vec3) {
        self.push(RenderCall::Attach(entity, kind));
    }
    fn detach(&mut self, entity: EntityId) {
        self.push(RenderCall::Detach(entity));
    }
    fn set_pose(&mut self, entity: EntityId, position: Vec3, _rotation: Quat) {
        self.push(RenderCall::Pose(entity, position));
    }
    fn set_instance(&mut self, kind: EntityKind, slot: usize, matrix: Mat4) {
        self.push(RenderCall::Instance(kind, slot, matrix.translation()));
    }
    fn clear_instance(&mut self, kind: EntityKind, slot: usize) {
        self.push(RenderCall::ClearInstance(kind, slot));
    }
    fn set_camera(&mut self, position: Vec3, _rotation: Quat) {
        self.push(RenderCall::Camera(position));
    }
    fn spawn_effect(&mut self, effect: ParticleEffect, position: Vec3) {
        self.push(RenderCall::Effect(effect, position));
    }
    fn present(&mut self) {
        self.push(RenderCall::Present);
    }
}
