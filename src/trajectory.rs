use serde::Serialize;

use crate::projection::GeoProjector;
use crate::types::{GeoPoint, ProjectedPoint, Sample};

/// What happened to a sample offered to the trajectory
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum AppendOutcome {
    Appended,
    /// (0, 0) position, the sensor had no GPS lock
    NoFix,
    /// Position or speed is NaN or infinite
    NonFinite,
    /// Timestamp earlier than the last stored sample
    OutOfOrder,
}

/// Ordered, append-only sequence of valid samples for one session or log
///
/// The first accepted sample becomes the projection anchor and stays the
/// anchor until the trajectory is dropped.
#[derive(Clone, Debug, Default)]
pub struct Trajectory {
    samples: Vec<Sample>,
    projector: Option<GeoProjector>,
    max_speed: f64,
}

impl Trajectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: Vec::with_capacity(capacity),
            ..Self::default()
        }
    }

    pub fn push(&mut self, mut sample: Sample) -> AppendOutcome {
        if !sample.has_fix() {
            return AppendOutcome::NoFix;
        }
        if !sample.is_finite() {
            return AppendOutcome::NonFinite;
        }

        match self.samples.last() {
            Some(prev) if sample.timestamp_ms < prev.timestamp_ms => {
                return AppendOutcome::OutOfOrder;
            }
            Some(prev) => {
                let dt_ms = sample.timestamp_ms - prev.timestamp_ms;
                sample.speed_from_displacement = self.projector.and_then(|projector| {
                    if dt_ms == 0 {
                        None
                    } else {
                        let meters = projector.distance(&prev.position, &sample.position);
                        Some(meters / (dt_ms as f64 / 1000.0))
                    }
                });
            }
            None => {
                self.projector = Some(GeoProjector::new(sample.position));
                sample.speed_from_displacement = None;
            }
        }

        if sample.speed_imu > self.max_speed {
            self.max_speed = sample.speed_imu;
        }
        self.samples.push(sample);
        AppendOutcome::Appended
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Sample> {
        self.samples.get(index)
    }

    pub fn last(&self) -> Option<&Sample> {
        self.samples.last()
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn anchor(&self) -> Option<GeoPoint> {
        self.projector.map(|p| p.anchor())
    }

    pub fn projector(&self) -> Option<&GeoProjector> {
        self.projector.as_ref()
    }

    /// Project the sample at `index` against this trajectory's anchor
    pub fn project(&self, index: usize) -> Option<ProjectedPoint> {
        let projector = self.projector.as_ref()?;
        self.samples.get(index).map(|s| projector.project(&s.position))
    }

    /// Highest IMU speed of any stored sample
    pub fn max_speed(&self) -> f64 {
        self.max_speed
    }

    pub fn duration_ms(&self) -> u64 {
        match (self.samples.first(), self.samples.last()) {
            (Some(first), Some(last)) => last.timestamp_ms - first.timestamp_ms,
            _ => 0,
        }
    }
}
