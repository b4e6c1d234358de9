//! Physics helpers.
//!
//! Explicit Euler integration plus the two narrow-phase tests the collision
//! step needs: segment vs sphere (projectiles) and sphere vs sphere (bodies).

use crate::{
    components::{Physics, Transform},
    math::{Quat, Vec3},
};

/// Limits applied during integration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhysicsConfig {
    /// Linear speed cap, units per second.
    pub max_speed: f32,
    /// Angular speed cap, radians per second.
    pub max_angular_speed: f32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            max_speed: 250.0,
            max_angular_speed: 4.0,
        }
    }
}

/// Advances a body by `dt` seconds.
pub fn integrate(transform: &mut Transform, body: &mut Physics, cfg: &PhysicsConfig, dt: f32) {
    if dt <= 0.0 {
        return;
    }

    let keep = body.damping.clamp(0.0, 1.0).powf(dt);
    body.velocity = cap(body.velocity * keep, cfg.max_speed);
    body.angular_velocity = cap(body.angular_velocity * keep, cfg.max_angular_speed);

    transform.position += body.velocity * dt;

    let spin = body.angular_velocity.len() * dt;
    if spin > f32::EPSILON {
        // Angular velocity is local, so the increment is applied on the right.
        let delta = Quat::from_axis_angle(body.angular_velocity, spin);
        transform.rotation = (transform.rotation * delta).normalize();
    }
}

fn cap(v: Vec3, max: f32) -> Vec3 {
    let len = v.len();
    if len > max {
        v * (max / len)
    } else {
        v
    }
}

/// First intersection of segment `start..end` with a sphere, as a fraction of
/// the segment in `[0, 1]`. A start point inside the sphere hits at 0.
pub fn segment_sphere(start: Vec3, end: Vec3, center: Vec3, radius: f32) -> Option<f32> {
    let f = start - center;
    let c = f.len_sq() - radius * radius;
    if c <= 0.0 {
        return Some(0.0);
    }

    let d = end - start;
    let a = d.len_sq();
    if a <= f32::EPSILON {
        return None;
    }
    let b = 2.0 * f.dot(d);
    let disc = b * b - 4.0 * a * c;
    if disc < 0.0 {
        return None;
    }

    let t = (-b - disc.sqrt()) / (2.0 * a);
    (0.0..=1.0).contains(&t).then_some(t)
}

/// Penetration between two spheres.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contact {
    /// Unit vector from `a` towards `b`.
    pub normal: Vec3,
    pub depth: f32,
}

pub fn sphere_sphere(a: Vec3, ra: f32, b: Vec3, rb: f32) -> Option<Contact> {
    let offset = b - a;
    let dist_sq = offset.len_sq();
    let reach = ra + rb;
    if dist_sq >= reach * reach {
        return None;
    }
    let dist = dist_sq.sqrt();
    let normal = if dist > f32::EPSILON { offset * (1.0 / dist) } else { Vec3::Y };
    Some(Contact {
        normal,
        depth: reach - dist,
    })
}
