pub mod linalg;

pub use linalg::*;

use serde::{Deserialize, Serialize};

/// WGS84 position in degrees
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// (0, 0) is what the sensor reports before the GPS has a lock
    pub fn is_no_fix(&self) -> bool {
        self.latitude == 0.0 && self.longitude == 0.0
    }
}

impl Default for GeoPoint {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

/// Local planar position in meters (x east, y south / screen-down)
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectedPoint {
    pub x: f64,
    pub y: f64,
}

impl ProjectedPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &ProjectedPoint) -> f64 {
        planar_norm(other.x - self.x, other.y - self.y)
    }
}

/// One telemetry observation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub position: GeoPoint,
    /// Milliseconds since the session (or log) started
    pub timestamp_ms: u64,
    pub velocity_body: BodyVelocity,
    pub acceleration_body: BodyAccel,
    /// World-frame acceleration, when the source reports one separately
    pub acceleration_world: Option<WorldAccel>,
    /// |velocity_body|, computed once when the sample is built
    pub speed_imu: f64,
    /// |(ax, ay)|, computed once when the sample is built
    pub accel_magnitude: f64,
    /// Position-delta speed against the previous sample, filled in by the trajectory store
    pub speed_from_displacement: Option<f64>,
}

impl Sample {
    pub fn new(
        position: GeoPoint,
        timestamp_ms: u64,
        velocity_body: BodyVelocity,
        acceleration_body: BodyAccel,
    ) -> Self {
        let speed_imu = velocity_body.norm();
        let accel_magnitude = planar_norm(acceleration_body.x, acceleration_body.y);
        Self {
            position,
            timestamp_ms,
            velocity_body,
            acceleration_body,
            acceleration_world: None,
            speed_imu,
            accel_magnitude,
            speed_from_displacement: None,
        }
    }

    pub fn with_world_accel(mut self, accel: WorldAccel) -> Self {
        self.acceleration_world = Some(accel);
        self
    }

    /// Position and IMU speed are usable numbers
    pub fn is_finite(&self) -> bool {
        self.position.latitude.is_finite()
            && self.position.longitude.is_finite()
            && self.speed_imu.is_finite()
    }

    pub fn latitude(&self) -> f64 {
        self.position.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.position.longitude
    }

    pub fn has_fix(&self) -> bool {
        !self.position.is_no_fix()
    }

    /// Speed shown to the user. The IMU-integrated value is authoritative.
    pub fn display_speed(&self) -> f64 {
        self.speed_imu
    }
}
