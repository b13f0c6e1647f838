use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::Instant;

use crate::ingest::IngestSummary;
use crate::playback::PlaybackState;
use crate::session::{SessionMode, TraceSession};

/// Point-in-time view of a session, written as JSON for external dashboards
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct StatusSnapshot {
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub mode: String,
    pub generation: u64,
    pub samples: usize,
    pub summary: IngestSummary,
    pub playback: String,
    pub max_speed: f64,
    pub path_points: usize,
    // Latest sample
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub speed: Option<f64>,
    pub accel_magnitude: Option<f64>,
    // Live link
    pub live_polls: u64,
    pub live_malformed: u64,
}

impl StatusSnapshot {
    pub fn capture(session: &TraceSession, started: DateTime<Utc>) -> Self {
        let now = Utc::now();
        let current = session.current_sample();
        let live = session.live_stats().unwrap_or_default();
        Self {
            timestamp: now,
            uptime_seconds: (now - started).num_seconds().max(0) as u64,
            mode: mode_name(session.mode()).to_string(),
            generation: session.generation(),
            samples: session.trajectory().len(),
            summary: session.summary(),
            playback: playback_name(session.playback_state()).to_string(),
            max_speed: session.cache().max_speed(),
            path_points: session.cache().total_points(),
            lat: current.map(|s| s.latitude()),
            lon: current.map(|s| s.longitude()),
            speed: current.map(|s| s.display_speed()),
            accel_magnitude: current.map(|s| s.accel_magnitude),
            live_polls: live.polls,
            live_malformed: live.malformed,
        }
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

/// Rewrites the status file at most once per interval
#[derive(Clone, Debug)]
pub struct StatusWriter {
    path: PathBuf,
    interval: Duration,
    started: DateTime<Utc>,
    last_saved: Option<Instant>,
    saves: u64,
}

impl StatusWriter {
    pub fn new(path: impl Into<PathBuf>, interval: Duration) -> Self {
        Self {
            path: path.into(),
            interval,
            started: Utc::now(),
            last_saved: None,
            saves: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn saves(&self) -> u64 {
        self.saves
    }

    /// Save if nothing has been written yet or the interval has passed.
    /// Returns whether the file was written.
    pub fn maybe_save(&mut self, session: &TraceSession) -> std::io::Result<bool> {
        let due = match self.last_saved {
            Some(at) => at.elapsed() >= self.interval,
            None => true,
        };
        if due {
            self.save_now(session)?;
        }
        Ok(due)
    }

    pub fn save_now(&mut self, session: &TraceSession) -> std::io::Result<()> {
        StatusSnapshot::capture(session, self.started).save(&self.path)?;
        self.last_saved = Some(Instant::now());
        self.saves += 1;
        Ok(())
    }
}

fn mode_name(mode: SessionMode) -> &'static str {
    match mode {
        SessionMode::Idle => "idle",
        SessionMode::Replay => "replay",
        SessionMode::Live => "live",
    }
}

fn playback_name(state: PlaybackState) -> &'static str {
    match state {
        PlaybackState::Stopped => "stopped",
        PlaybackState::Running => "running",
        PlaybackState::Finished => "finished",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TraceConfig;
    use crate::live::{LiveSession, SimulatedTransport};
    use crate::types::GeoPoint;
    use tokio::sync::watch;
    use tokio::time::sleep;

    fn scratch(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("daq_trace_{}_{}.json", name, std::process::id()))
    }

    #[test]
    fn test_capture_and_save() {
        let mut config = TraceConfig::default();
        config.playback.step_size = 1;
        let mut session = TraceSession::new(config);
        session
            .load_reader("lat,lon,millis,vx_imu,vy_imu,ax_w,ay_w\n1,2,0,3,4,0,0\n".as_bytes())
            .unwrap();
        session.play();
        session.tick_playback();

        let status = StatusSnapshot::capture(&session, Utc::now());
        assert_eq!(status.mode, "replay");
        assert_eq!(status.playback, "running");
        assert_eq!(status.samples, 1);
        assert_eq!(status.path_points, 1);
        assert_eq!(status.speed, Some(5.0));

        let path = scratch("status");
        status.save(&path).unwrap();
        let back: StatusSnapshot = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back.generation, 1);
        assert_eq!(back.lat, Some(1.0));
        let _ = fs::remove_file(&path);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_rewritten_during_live_run() {
        let mut config = TraceConfig::default();
        config.live.reference = Some(GeoPoint::new(43.0, -79.0));
        config.status.save_interval_ms = 1_000;

        let mut live = LiveSession::connect(SimulatedTransport::new("car_go_vroom"), config.live.clone())
            .await
            .unwrap();
        let path = scratch("status_live");
        let mut session = TraceSession::new(config.clone());
        session.set_status_writer(StatusWriter::new(&path, config.status.save_interval()));
        let (tx, rx) = watch::channel(false);

        let (stats, _) = tokio::join!(live.run(&mut session, rx), async {
            sleep(Duration::from_millis(2_250)).await;
            let _ = tx.send(true);
        });
        assert_eq!(stats.unwrap().polls, 5);

        // Written after the polls at 0, 1000 and 2000 ms
        let writer = session.take_status_writer().unwrap();
        assert_eq!(writer.saves(), 3);
        let back: StatusSnapshot = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back.mode, "live");
        assert_eq!(back.live_polls, 5);
        assert_eq!(back.samples, 5);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_write_failure_is_reported() {
        let session = TraceSession::new(TraceConfig::default());
        let mut writer = StatusWriter::new(
            std::env::temp_dir().join("daq_trace_no_such_dir").join("status.json"),
            Duration::from_secs(2),
        );
        assert!(writer.maybe_save(&session).is_err());
        assert_eq!(writer.saves(), 0);
    }
}
