//! Vector type aliases for body-frame telemetry
//!
//! Keeps nalgebra out of signatures elsewhere in the crate.

use nalgebra::{Vector2, Vector3};

// ===== Body-frame vectors =====
pub type BodyVelocity = Vector2<f64>; // (vx, vy) m/s
pub type BodyAccel = Vector3<f64>;    // (ax, ay, az) m/s²

// ===== World-frame vectors =====
pub type WorldAccel = Vector2<f64>;   // (east, north) m/s²

/// Planar magnitude, ignoring any vertical component
pub fn planar_norm(x: f64, y: f64) -> f64 {
    Vector2::new(x, y).norm()
}
