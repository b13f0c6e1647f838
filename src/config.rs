//! Runtime configuration
//!
//! Every section has defaults, so a config file only needs the keys it changes.
//! Durations are in milliseconds.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TraceError};
use crate::path_cache::{Rgb, SpeedBuckets};
use crate::types::GeoPoint;

// ===== Sections =====

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BucketConfig {
    pub min_speed: f64,
    pub max_speed: f64,
    pub count: usize,
    /// Optional per-bucket colors; missing entries use the default gradient
    pub colors: Vec<Rgb>,
}

impl Default for BucketConfig {
    fn default() -> Self {
        let defaults = SpeedBuckets::default();
        Self {
            min_speed: defaults.min_speed,
            max_speed: defaults.max_speed,
            count: defaults.count,
            colors: Vec::new(),
        }
    }
}

impl BucketConfig {
    pub fn speed_buckets(&self) -> SpeedBuckets {
        SpeedBuckets::new(self.min_speed, self.max_speed, self.count)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    pub tick_interval_ms: u64,
    /// Samples advanced per tick (IMU rows per GPS update)
    pub step_size: usize,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 50,
            step_size: 10,
        }
    }
}

impl PlaybackConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    /// Case-insensitive substring of the advertised device name
    pub device_name: String,
    pub discovery_window_ms: u64,
    pub poll_interval_ms: u64,
    pub read_timeout_ms: u64,
    /// Geographic origin of the sensor's fused (east, north) position.
    /// Required for live sessions; (0, 0) is rejected as the no-fix sentinel.
    pub reference: Option<GeoPoint>,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            device_name: "car_go_vroom".to_string(),
            discovery_window_ms: 5_000,
            poll_interval_ms: 500,
            read_timeout_ms: 2_000,
            reference: None,
        }
    }
}

impl LiveConfig {
    pub fn discovery_window(&self) -> Duration {
        Duration::from_millis(self.discovery_window_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// The reference point, if it is set and not the no-fix sentinel
    pub fn require_reference(&self) -> Result<GeoPoint> {
        match self.reference {
            Some(point) if !point.is_no_fix() => Ok(point),
            Some(_) => Err(TraceError::Config(
                "live.reference cannot be (0, 0), the no-fix sentinel".into(),
            )),
            None => Err(TraceError::Config(
                "live.reference must be set for a live session".into(),
            )),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    /// Body-x acceleration (m/s²) beyond which a braking / acceleration event starts
    pub event_threshold: f64,
    /// Subtract the mean body acceleration before computing magnitudes
    pub remove_dc_offset: bool,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            event_threshold: 3.0,
            remove_dc_offset: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    /// Minimum time between status file rewrites
    pub save_interval_ms: u64,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            save_interval_ms: 2_000,
        }
    }
}

impl StatusConfig {
    pub fn save_interval(&self) -> Duration {
        Duration::from_millis(self.save_interval_ms)
    }
}

// ===== Top level =====

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceConfig {
    pub buckets: BucketConfig,
    pub playback: PlaybackConfig,
    pub live: LiveConfig,
    pub stats: StatsConfig,
    pub status: StatusConfig,
}

impl TraceConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        let config: TraceConfig =
            serde_json::from_str(text).map_err(|e| TraceError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.buckets.count == 0 {
            return Err(TraceError::Config("buckets.count must be at least 1".into()));
        }
        if !(self.buckets.max_speed > self.buckets.min_speed) {
            return Err(TraceError::Config(format!(
                "buckets.max_speed ({}) must exceed buckets.min_speed ({})",
                self.buckets.max_speed, self.buckets.min_speed
            )));
        }
        if self.playback.step_size == 0 {
            return Err(TraceError::Config("playback.step_size must be at least 1".into()));
        }
        if self.playback.tick_interval_ms == 0
            || self.live.poll_interval_ms == 0
            || self.status.save_interval_ms == 0
        {
            return Err(TraceError::Config("intervals must be non-zero".into()));
        }
        if let Some(reference) = self.live.reference {
            if reference.is_no_fix() {
                return Err(TraceError::Config(
                    "live.reference cannot be (0, 0), the no-fix sentinel".into(),
                ));
            }
        }
        Ok(())
    }
}
