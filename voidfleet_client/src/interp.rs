//! Interpolation.
//!
//! The server sends discrete poses at tick boundaries. The client renders at
//! its own rate and blends each entity's previous and current pose by how far
//! the render clock has advanced into the current tick interval.

use voidfleet_shared::{
    components::Transform,
    ecs::EntityId,
    math::{Mat4, Quat, Vec3},
};

/// When the last server tick arrived, and how long ticks last.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SnapshotClock {
    /// Local time (seconds) the latest `UPDATE` was applied.
    pub last_tick_at: f64,
    /// Seconds between server ticks.
    pub tick_interval: f64,
    /// Server tick number of the latest `UPDATE`.
    pub server_tick: u64,
}

impl Default for SnapshotClock {
    fn default() -> Self {
        Self {
            last_tick_at: 0.0,
            tick_interval: 1.0 / 30.0,
            server_tick: 0,
        }
    }
}

impl SnapshotClock {
    pub fn alpha(&self, now: f64) -> f32 {
        alpha(now, self.last_tick_at, self.tick_interval)
    }
}

/// `clamp((now - last_tick) / tick_interval, 0, 1)`. A non-positive interval
/// snaps straight to the current pose.
pub fn alpha(now: f64, last_tick_at: f64, tick_interval: f64) -> f32 {
    if !(tick_interval > 0.0) {
        return 1.0;
    }
    let a = ((now - last_tick_at) / tick_interval) as f32;
    if a.is_finite() {
        a.clamp(0.0, 1.0)
    } else {
        1.0
    }
}

/// Pose to draw: `prev` blended towards current by `alpha`.
pub fn render_pose(t: &Transform, alpha: f32) -> (Vec3, Quat) {
    (
        t.prev_position.lerp(t.position, alpha),
        t.prev_rotation.slerp(t.rotation, alpha),
    )
}

/// Instance matrices for one instanced mesh, addressed by entity index.
///
/// Each slot remembers the full id that wrote it, so a stale handle whose
/// index was recycled can neither read nor clear the new owner's slot.
#[derive(Debug, Clone)]
pub struct InstanceBuffer {
    matrices: Vec<Mat4>,
    owners: Vec<Option<EntityId>>,
    capacity: usize,
}

impl InstanceBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            matrices: Vec::new(),
            owners: Vec::new(),
            capacity,
        }
    }

    /// Slot an entity writes to.
    pub fn slot(entity: EntityId) -> usize {
        entity.index() as usize
    }

    /// Writes the entity's matrix. Returns its slot, or `None` past capacity.
    pub fn set(&mut self, entity: EntityId, matrix: Mat4) -> Option<usize> {
        let slot = Self::slot(entity);
        if slot >= self.capacity {
            return None;
        }
        if slot >= self.owners.len() {
            self.owners.resize(slot + 1, None);
            self.matrices.resize(slot + 1, Mat4::IDENTITY);
        }
        self.owners[slot] = Some(entity);
        self.matrices[slot] = matrix;
        Some(slot)
    }

    pub fn get(&self, entity: EntityId) -> Option<&Mat4> {
        let slot = Self::slot(entity);
        match self.owners.get(slot) {
            Some(Some(owner)) if *owner == entity => self.matrices.get(slot),
            _ => None,
        }
    }

    /// Frees the entity's slot if it still owns it.
    pub fn clear(&mut self, entity: EntityId) -> Option<usize> {
        let slot = Self::slot(entity);
        match self.owners.get_mut(slot) {
            Some(owner) if *owner == Some(entity) => {
                *owner = None;
                Some(slot)
            }
            _ => None,
        }
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.owners.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn moving() -> Transform {
        let mut t = Transform::new(Vec3::ZERO, Quat::IDENTITY);
        t.position = Vec3::new(10.0, 0.0, 0.0);
        t
    }

    #[test]
    fn midpoint_and_endpoints() {
        let t = moving();
        assert_eq!(render_pose(&t, 0.5).0, Vec3::new(5.0, 0.0, 0.0));
        assert_eq!(render_pose(&t, 0.0).0, Vec3::ZERO);
        assert_eq!(render_pose(&t, 1.0).0, Vec3::new(10.0, 0.0, 0.0));
    }

    #[test]
    fn alpha_is_clamped() {
        let interval = 1.0 / 30.0;
        assert_eq!(alpha(1.0, 1.0, interval), 0.0);
        assert!((alpha(1.0 + interval / 2.0, 1.0, interval) - 0.5).abs() < 1e-5);
        assert_eq!(alpha(5.0, 1.0, interval), 1.0);
        assert_eq!(alpha(0.5, 1.0, interval), 0.0);
        assert_eq!(alpha(1.0, 1.0, 0.0), 1.0);
    }

    #[test]
    fn rotation_blends_along_shortest_arc() {
        let mut t = Transform::new(Vec3::ZERO, Quat::IDENTITY);
        t.rotation = Quat::from_axis_angle(Vec3::Y, std::f32::consts::FRAC_PI_2);
        let (_, mid) = render_pose(&t, 0.5);
        let expected = Quat::from_axis_angle(Vec3::Y, std::f32::consts::FRAC_PI_4);
        assert!(mid.dot(expected).abs() > 0.9999);
    }

    #[test]
    fn stale_handle_cannot_touch_recycled_slot() {
        let mut buf = InstanceBuffer::new(64);
        let old = EntityId::new(3, 0);
        let new = EntityId::new(3, 1);

        assert_eq!(buf.set(old, Mat4::IDENTITY), Some(3));
        assert_eq!(buf.set(new, Mat4::from_trs(Vec3::X, Quat::IDENTITY, Vec3::ONE)), Some(3));

        assert!(buf.get(old).is_none());
        assert_eq!(buf.clear(old), None);
        assert_eq!(buf.get(new).map(Mat4::translation), Some(Vec3::X));
        assert_eq!(buf.clear(new), Some(3));
        assert!(buf.is_empty());
    }

    #[test]
    fn capacity_is_enforced() {
        let mut buf = InstanceBuffer::new(2);
        assert_eq!(buf.set(EntityId::new(5, 0), Mat4::IDENTITY), None);
        assert!(buf.is_empty());
    }
}
