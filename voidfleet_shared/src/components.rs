//! Component kinds used by both the server simulation and the client.
//!
//! Plain data. Which systems act on an entity is decided solely by which of
//! these it carries.

use serde::{Deserialize, Serialize};

use crate::{
    ecs::EntityId,
    math::{Quat, Vec3},
    protocol::lenient,
};

/// Pose plus the pose at the previous tick boundary.
///
/// `prev_*` is written only by `snapshot`, once per tick, so anything reading
/// between ticks sees a stable `(prev, current)` pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
    pub prev_position: Vec3,
    pub prev_rotation: Quat,
}

impl Default for Transform {
    fn default() -> Self {
        Self::new(Vec3::ZERO, Quat::IDENTITY)
    }
}

impl Transform {
    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self {
            position,
            rotation,
            scale: Vec3::ONE,
            prev_position: position,
            prev_rotation: rotation,
        }
    }

    pub fn with_scale(mut self, scale: f32) -> Self {
        self.scale = Vec3::splat(scale);
        self
    }

    /// Copies the current pose into `prev_*`.
    pub fn snapshot(&mut self) {
        self.prev_position = self.position;
        self.prev_rotation = self.rotation;
    }

    /// Moves without leaving an interpolation trail.
    pub fn teleport(&mut self, position: Vec3, rotation: Quat) {
        self.position = position;
        self.rotation = rotation;
        self.snapshot();
    }

    /// Local +Z in world space.
    pub fn forward(&self) -> Vec3 {
        self.rotation.rotate(Vec3::Z)
    }

    /// Maps a point from this transform's local space to world space (scale ignored).
    pub fn to_world(&self, local: Vec3) -> Vec3 {
        self.position + self.rotation.rotate(local)
    }
}

/// Latest intent of a controllable entity. Overwritten wholesale by `INPUT`.
///
/// Booleans accept any JSON value and use its truthiness; axes are clamped
/// to `[-1, 1]`. Missing fields default to off.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Input {
    #[serde(deserialize_with = "lenient::flag")]
    pub forward: bool,
    #[serde(deserialize_with = "lenient::flag")]
    pub backward: bool,
    #[serde(deserialize_with = "lenient::flag")]
    pub roll_left: bool,
    #[serde(deserialize_with = "lenient::flag")]
    pub roll_right: bool,
    #[serde(deserialize_with = "lenient::flag")]
    pub strafe_left: bool,
    #[serde(deserialize_with = "lenient::flag")]
    pub strafe_right: bool,
    #[serde(deserialize_with = "lenient::flag")]
    pub strafe_up: bool,
    #[serde(deserialize_with = "lenient::flag")]
    pub strafe_down: bool,
    #[serde(deserialize_with = "lenient::flag")]
    pub boost: bool,
    #[serde(deserialize_with = "lenient::flag")]
    pub weapon_primary: bool,
    #[serde(deserialize_with = "lenient::flag")]
    pub aim: bool,
    /// Turn rate request around local Y, from pointer motion.
    #[serde(deserialize_with = "lenient::axis")]
    pub yaw: f32,
    /// Turn rate request around local X, from pointer motion.
    #[serde(deserialize_with = "lenient::axis")]
    pub pitch: f32,
}

impl Input {
    /// Requested linear thrust direction in local space, unnormalized.
    pub fn thrust(&self) -> Vec3 {
        fn axis(pos: bool, neg: bool) -> f32 {
            f32::from(u8::from(pos)) - f32::from(u8::from(neg))
        }
        Vec3::new(
            axis(self.strafe_right, self.strafe_left),
            axis(self.strafe_up, self.strafe_down),
            axis(self.forward, self.backward),
        )
    }

    /// Requested angular velocity direction in local space: (pitch, yaw, roll).
    pub fn torque(&self) -> Vec3 {
        let roll = f32::from(u8::from(self.roll_left)) - f32::from(u8::from(self.roll_right));
        Vec3::new(self.pitch, self.yaw, roll)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Health {
    pub value: f32,
}

/// Render/behaviour variant of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityKind {
    Ship,
    Bullet,
    Asteroid,
}

impl EntityKind {
    /// Kinds spawned in numbers large enough to need instanced rendering.
    pub fn is_instanced(self) -> bool {
        matches!(self, Self::Bullet)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Kind {
    pub tag: EntityKind,
}

impl Kind {
    pub const fn new(tag: EntityKind) -> Self {
        Self { tag }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WeaponKind {
    Gun,
}

/// A hardpoint on `parent`. Fires when the parent's `Input.weapon_primary` is set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Weapon {
    pub kind: WeaponKind,
    /// Muzzle position in the parent's local space.
    pub offset: Vec3,
    /// Seconds between shots.
    pub fire_interval: f64,
    pub last_fired_at: Option<f64>,
    pub parent: EntityId,
}

impl Weapon {
    pub fn ready(&self, now: f64) -> bool {
        self.last_fired_at
            .map_or(true, |last| now - last >= self.fire_interval)
    }
}

/// Weapon entities mounted on a ship.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Weapons {
    pub primary: Vec<EntityId>,
}

/// Linear and angular motion state. Angular velocity is in local space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Physics {
    pub velocity: Vec3,
    pub angular_velocity: Vec3,
    /// Fraction of velocity kept per second, in `[0, 1]`.
    pub damping: f32,
}

impl Default for Physics {
    fn default() -> Self {
        Self {
            velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            damping: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SphereCollider {
    pub radius: f32,
}

/// Casts a ray along the entity's motion each tick and damages what it crosses.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Raycaster {
    pub damage: f32,
    /// Entity that must never be hit (the shooter).
    pub owner: Option<EntityId>,
}

/// Marks an entity as a valid raycast target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RaycasterReceiver;

/// Destroys the entity once `now >= expires_at`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timeout {
    pub expires_at: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParticleEffect {
    Explosion,
    Spark,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParticleEffectOnDestroy {
    pub effect: ParticleEffect,
}

/// Terminal marker. The destroy step despawns every entity carrying it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Destroyed;
