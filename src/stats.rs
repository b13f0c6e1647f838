use serde::{Deserialize, Serialize};

use crate::config::StatsConfig;
use crate::trajectory::Trajectory;
use crate::types::BodyAccel;

/// Mean body-frame acceleration over a run, i.e. the sensor's mounting bias
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AccelOffsets {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl AccelOffsets {
    pub fn estimate(trajectory: &Trajectory) -> Self {
        let samples = trajectory.samples();
        if samples.is_empty() {
            return Self::default();
        }
        let sum = samples
            .iter()
            .fold(BodyAccel::zeros(), |acc, s| acc + s.acceleration_body);
        let mean = sum / samples.len() as f64;
        Self {
            x: mean.x,
            y: mean.y,
            z: mean.z,
        }
    }

    pub fn as_vector(&self) -> BodyAccel {
        BodyAccel::new(self.x, self.y, self.z)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Braking,
    Acceleration,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DrivingEvent {
    pub timestamp_ms: u64,
    pub kind: EventKind,
    /// Body-x acceleration (m/s²) on the sample that crossed the threshold
    pub magnitude: f64,
    pub speed: f64,
    pub latitude: f64,
    pub longitude: f64,
}

/// Summary of one run
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    pub samples: usize,
    pub max_speed: f64,
    pub avg_speed: f64,
    pub total_distance_m: f64,
    pub total_time_s: f64,
    pub peak_accel: f64,
    pub avg_accel: f64,
    pub offsets: AccelOffsets,
    pub braking_events: usize,
    pub acceleration_events: usize,
    pub events: Vec<DrivingEvent>,
}

impl RunStats {
    pub fn from_trajectory(trajectory: &Trajectory, config: &StatsConfig) -> Self {
        let samples = trajectory.samples();
        if samples.is_empty() {
            return Self::default();
        }

        let offsets = if config.remove_dc_offset {
            AccelOffsets::estimate(trajectory)
        } else {
            AccelOffsets::default()
        };
        let bias = offsets.as_vector();

        let mut stats = RunStats {
            samples: samples.len(),
            total_time_s: trajectory.duration_ms() as f64 / 1000.0,
            offsets,
            ..Self::default()
        };

        let mut speed_sum = 0.0;
        let mut accel_sum = 0.0;
        let mut braking = false;
        let mut accelerating = false;

        for (i, sample) in samples.iter().enumerate() {
            speed_sum += sample.speed_imu;
            stats.max_speed = stats.max_speed.max(sample.speed_imu);

            let accel = sample.acceleration_body - bias;
            let magnitude = accel.norm();
            accel_sum += magnitude;
            stats.peak_accel = stats.peak_accel.max(magnitude);

            if i > 0 {
                if let (Some(a), Some(b)) = (trajectory.project(i - 1), trajectory.project(i)) {
                    stats.total_distance_m += a.distance_to(&b);
                }
            }

            // Count on the rising edge only, so a long stop is one event
            let now_braking = accel.x < -config.event_threshold;
            let now_accelerating = accel.x > config.event_threshold;
            let kind = if now_braking && !braking {
                Some(EventKind::Braking)
            } else if now_accelerating && !accelerating {
                Some(EventKind::Acceleration)
            } else {
                None
            };
            braking = now_braking;
            accelerating = now_accelerating;

            if let Some(kind) = kind {
                match kind {
                    EventKind::Braking => stats.braking_events += 1,
                    EventKind::Acceleration => stats.acceleration_events += 1,
                }
                stats.events.push(DrivingEvent {
                    timestamp_ms: sample.timestamp_ms,
                    kind,
                    magnitude: accel.x,
                    speed: sample.speed_imu,
                    latitude: sample.latitude(),
                    longitude: sample.longitude(),
                });
            }
        }

        let n = samples.len() as f64;
        stats.avg_speed = speed_sum / n;
        stats.avg_accel = accel_sum / n;
        stats
    }
}
