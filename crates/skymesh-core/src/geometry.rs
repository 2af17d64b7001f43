//! ECEF geometry primitives.
//!
//! All coordinates here are kilometres in an Earth-Centred Earth-Fixed frame.
//! The Earth is a sphere of radius 6371 km; the approximation is intentional
//! and part of the contract.

use serde::{Deserialize, Serialize};

/// Spherical Earth radius in kilometres, used by every occlusion check.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// A 3-vector in kilometres.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Vec3 { x, y, z }
    }

    pub fn dot(self, other: Vec3) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn norm_sq(self) -> f64 {
        self.dot(self)
    }

    pub fn norm(self) -> f64 {
        self.norm_sq().sqrt()
    }

    pub fn scale(self, k: f64) -> Vec3 {
        Vec3::new(self.x * k, self.y * k, self.z * k)
    }

    pub fn distance(self, other: Vec3) -> f64 {
        (other - self).norm()
    }
}

impl std::ops::Add for Vec3 {
    type Output = Vec3;
    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl std::ops::Sub for Vec3 {
    type Output = Vec3;
    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

/// Whether the straight segment between two points clears the Earth sphere.
///
/// The closest point of the segment `p1 + t·(p2−p1)` to the origin is at
/// `t* = −p1·(p2−p1)/|p2−p1|²`, clamped to `[0, 1]`. Line-of-sight holds iff
/// that closest point is strictly outside the sphere. Two coincident points
/// have line-of-sight iff the point itself lies outside Earth.
pub fn has_line_of_sight(p1: Vec3, p2: Vec3) -> bool {
    let d = p2 - p1;
    let len_sq = d.norm_sq();
    if len_sq == 0.0 {
        return p1.norm_sq() > EARTH_RADIUS_KM * EARTH_RADIUS_KM;
    }
    let t = (-p1.dot(d) / len_sq).clamp(0.0, 1.0);
    let closest = p1 + d.scale(t);
    closest.norm_sq() > EARTH_RADIUS_KM * EARTH_RADIUS_KM
}

/// Elevation of `target` above the observer's local horizon, in degrees.
///
/// The observer's zenith is its normalised position vector; the result is
/// `90° − zenith angle`. The cosine is clamped to `[−1, 1]` to tolerate
/// floating-point drift on near-collinear geometry.
pub fn elevation_degrees(observer: Vec3, target: Vec3) -> f64 {
    let zenith_norm = observer.norm();
    let to_target = target - observer;
    let target_norm = to_target.norm();
    if zenith_norm == 0.0 || target_norm == 0.0 {
        return 0.0;
    }
    let cos_zenith = (observer.dot(to_target) / (zenith_norm * target_norm)).clamp(-1.0, 1.0);
    90.0 - cos_zenith.acos().to_degrees()
}
