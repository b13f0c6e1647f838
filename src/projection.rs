use crate::types::{GeoPoint, ProjectedPoint};

/// Meters per degree of latitude used for the flat-earth approximation
pub const METERS_PER_DEGREE_LAT: f64 = 111_320.0;

/// Flat-earth projection around a fixed anchor
///
/// Valid for a single local patch (tens of kilometers). Output y grows
/// southward so points can be handed straight to a screen-space renderer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeoProjector {
    anchor: GeoPoint,
    meters_per_degree_lon: f64,
}

impl GeoProjector {
    pub fn new(anchor: GeoPoint) -> Self {
        let meters_per_degree_lon = METERS_PER_DEGREE_LAT * anchor.latitude.to_radians().cos();
        Self {
            anchor,
            meters_per_degree_lon,
        }
    }

    pub fn anchor(&self) -> GeoPoint {
        self.anchor
    }

    pub fn meters_per_degree_lon(&self) -> f64 {
        self.meters_per_degree_lon
    }

    pub fn project(&self, point: &GeoPoint) -> ProjectedPoint {
        let x = (point.longitude - self.anchor.longitude) * self.meters_per_degree_lon;
        let y = -(point.latitude - self.anchor.latitude) * METERS_PER_DEGREE_LAT;
        ProjectedPoint { x, y }
    }

    /// Inverse of `project`
    pub fn unproject(&self, point: &ProjectedPoint) -> GeoPoint {
        let longitude = if self.meters_per_degree_lon == 0.0 {
            self.anchor.longitude
        } else {
            self.anchor.longitude + point.x / self.meters_per_degree_lon
        };
        let latitude = self.anchor.latitude - point.y / METERS_PER_DEGREE_LAT;
        GeoPoint {
            latitude,
            longitude,
        }
    }

    /// Place a north-up (east, north) offset in meters relative to the anchor
    pub fn offset(&self, east_m: f64, north_m: f64) -> GeoPoint {
        self.unproject(&ProjectedPoint::new(east_m, -north_m))
    }

    /// Planar distance in meters between two geographic points
    pub fn distance(&self, a: &GeoPoint, b: &GeoPoint) -> f64 {
        self.project(a).distance_to(&self.project(b))
    }
}
