//! Single-writer owner of the active trajectory and its path cache
//!
//! Whoever is producing samples (file replay or the live link) holds the
//! session mutably. Renderers only see events and snapshots, so a new load
//! replaces the trajectory and cache together in one assignment and no
//! observer can catch a cache that mixes two trajectories.

use std::io::Read;
use std::path::Path;
use std::time::Duration;

use log::{info, warn};
use serde::Serialize;
use tokio::sync::mpsc;

use crate::config::{BucketConfig, TraceConfig};
use crate::error::Result;
use crate::ingest::{self, IngestSummary, Ingested};
use crate::live::LiveStats;
use crate::path_cache::{BucketPath, PathCache};
use crate::playback::{PlaybackClock, PlaybackFrame, PlaybackState};
use crate::status::StatusWriter;
use crate::trajectory::{AppendOutcome, Trajectory};
use crate::types::{ProjectedPoint, Sample};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum SessionMode {
    Idle,
    Replay,
    Live,
}

/// Messages for renderers. Every event carries the generation of the
/// trajectory it belongs to; anything older than the latest
/// `TraceReplaced` can be dropped.
#[derive(Clone, Debug)]
pub enum SessionEvent {
    TraceReplaced {
        generation: u64,
        mode: SessionMode,
        summary: IngestSummary,
    },
    SampleReady {
        generation: u64,
        sample: Sample,
        point: ProjectedPoint,
        speed: f64,
    },
    BucketUpdated {
        generation: u64,
        bucket: usize,
        point: ProjectedPoint,
    },
    PlaybackChanged {
        generation: u64,
        state: PlaybackState,
    },
    Status(String),
}

/// Trajectory plus the geometry built from it. Always replaced as a pair.
#[derive(Clone, Debug)]
pub struct TraceState {
    pub trajectory: Trajectory,
    pub cache: PathCache,
}

impl TraceState {
    fn empty(buckets: &BucketConfig) -> Self {
        Self::from_trajectory(Trajectory::new(), buckets)
    }

    fn from_trajectory(trajectory: Trajectory, buckets: &BucketConfig) -> Self {
        Self {
            trajectory,
            cache: PathCache::with_colors(buckets.speed_buckets(), buckets.colors.clone()),
        }
    }
}

/// Everything a renderer needs to draw one frame
#[derive(Clone, Debug, Serialize)]
pub struct RenderSnapshot {
    pub generation: u64,
    pub mode: SessionMode,
    pub paths: Vec<BucketPath>,
    pub current: Option<Sample>,
    pub max_speed: f64,
    pub summary: IngestSummary,
    pub playback: PlaybackState,
}

pub struct TraceSession {
    config: TraceConfig,
    generation: u64,
    mode: SessionMode,
    state: TraceState,
    playback: PlaybackClock,
    summary: IngestSummary,
    current: Option<Sample>,
    live: Option<LiveStats>,
    status: Option<StatusWriter>,
    events: Option<mpsc::UnboundedSender<SessionEvent>>,
}

impl TraceSession {
    pub fn new(config: TraceConfig) -> Self {
        let state = TraceState::empty(&config.buckets);
        let playback = PlaybackClock::new(config.playback.step_size);
        Self {
            config,
            generation: 0,
            mode: SessionMode::Idle,
            state,
            playback,
            summary: IngestSummary::default(),
            current: None,
            live: None,
            status: None,
            events: None,
        }
    }

    /// Route session events to a new receiver, replacing any previous subscriber
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<SessionEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.events = Some(tx);
        rx
    }

    /// Drop the event sender so the subscriber's stream ends
    pub fn unsubscribe(&mut self) {
        self.events = None;
    }

    pub fn config(&self) -> &TraceConfig {
        &self.config
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    pub fn trajectory(&self) -> &Trajectory {
        &self.state.trajectory
    }

    pub fn cache(&self) -> &PathCache {
        &self.state.cache
    }

    pub fn summary(&self) -> IngestSummary {
        self.summary
    }

    pub fn current_sample(&self) -> Option<&Sample> {
        self.current.as_ref()
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.playback.state()
    }

    pub fn playback_interval(&self) -> Duration {
        self.config.playback.tick_interval()
    }

    /// Counters from the live link, while a live trajectory is active
    pub fn live_stats(&self) -> Option<LiveStats> {
        self.live
    }

    /// Keep a status file up to date as samples arrive
    pub fn set_status_writer(&mut self, writer: StatusWriter) {
        self.status = Some(writer);
    }

    pub fn take_status_writer(&mut self) -> Option<StatusWriter> {
        self.status.take()
    }

    // ===== Loading =====

    /// Load a CSV log from disk and make it the active trajectory
    ///
    /// On failure the active trajectory is replaced by an empty one and the
    /// error is returned for the caller to report.
    pub fn load_file(&mut self, path: &Path) -> Result<IngestSummary> {
        let result = ingest::ingest_path(path);
        self.finish_load(result, &path.display().to_string())
    }

    pub fn load_reader<R: Read>(&mut self, reader: R) -> Result<IngestSummary> {
        let result = ingest::ingest_reader(reader);
        self.finish_load(result, "stream")
    }

    fn finish_load(&mut self, result: Result<Ingested>, source: &str) -> Result<IngestSummary> {
        match result {
            Ok(ingested) => {
                let summary = ingested.summary;
                self.install(SessionMode::Replay, ingested.trajectory, summary);
                self.emit_status(format!("Loaded {}: {}", source, summary));
                Ok(summary)
            }
            Err(e) => {
                warn!("Failed to load {}: {}", source, e);
                self.install(SessionMode::Idle, Trajectory::new(), IngestSummary::default());
                self.emit_status(format!("Failed to load {}: {}", source, e));
                Err(e)
            }
        }
    }

    /// Discard the current trajectory and prepare for a new live connection
    pub fn start_live(&mut self) {
        self.install(SessionMode::Live, Trajectory::new(), IngestSummary::default());
        self.emit_status("Live session started".to_string());
    }

    fn install(&mut self, mode: SessionMode, trajectory: Trajectory, summary: IngestSummary) {
        self.state = TraceState::from_trajectory(trajectory, &self.config.buckets);
        self.generation += 1;
        self.mode = mode;
        self.summary = summary;
        self.current = None;
        self.live = (mode == SessionMode::Live).then(LiveStats::default);
        self.playback.reset();
        info!(
            "Trajectory replaced (generation {}, {:?}, {} samples)",
            self.generation,
            mode,
            self.state.trajectory.len()
        );
        self.emit(SessionEvent::TraceReplaced {
            generation: self.generation,
            mode,
            summary,
        });
    }

    // ===== Live =====

    /// Append one live sample and draw it straight into the cache
    pub fn push_live(&mut self, sample: Sample) -> AppendOutcome {
        let outcome = self.state.trajectory.push(sample);
        match outcome {
            AppendOutcome::Appended => self.summary.kept += 1,
            AppendOutcome::NoFix => self.summary.no_fix += 1,
            AppendOutcome::NonFinite => self.summary.malformed += 1,
            AppendOutcome::OutOfOrder => self.summary.out_of_order += 1,
        }
        if outcome != AppendOutcome::Appended {
            return outcome;
        }

        let index = self.state.trajectory.len() - 1;
        if let (Some(sample), Some(point)) = (
            self.state.trajectory.get(index).cloned(),
            self.state.trajectory.project(index),
        ) {
            let speed = sample.display_speed();
            let bucket = self.state.cache.push(point, speed);
            self.publish_sample(sample, point, bucket, speed);
        }
        outcome
    }

    /// Latest counters from the live driver; may rewrite the status file
    pub fn record_live_stats(&mut self, stats: LiveStats) {
        if self.mode == SessionMode::Live {
            self.live = Some(stats);
        }
        self.status_tick();
    }

    // ===== Playback =====

    /// Start or resume replay. Ignored unless a file is loaded.
    pub fn play(&mut self) {
        if self.mode != SessionMode::Replay {
            return;
        }
        let before = self.playback.state();
        self.playback.play();
        self.emit_playback_change(before);
    }

    pub fn pause(&mut self) {
        let before = self.playback.state();
        self.playback.pause();
        self.emit_playback_change(before);
    }

    pub fn tick_playback(&mut self) -> Option<PlaybackFrame> {
        let before = self.playback.state();
        let frame = self
            .playback
            .tick(&self.state.trajectory, &mut self.state.cache);
        if let Some(frame) = &frame {
            self.publish_sample(frame.sample.clone(), frame.point, frame.bucket, frame.speed);
        }
        self.emit_playback_change(before);
        self.status_tick();
        frame
    }

    pub fn snapshot(&self) -> RenderSnapshot {
        RenderSnapshot {
            generation: self.generation,
            mode: self.mode,
            paths: self.state.cache.paths().to_vec(),
            current: self.current.clone(),
            max_speed: self.state.cache.max_speed(),
            summary: self.summary,
            playback: self.playback.state(),
        }
    }

    // ===== Events =====

    fn status_tick(&mut self) {
        if let Some(mut writer) = self.status.take() {
            if let Err(e) = writer.maybe_save(self) {
                warn!("Failed to write {}: {}", writer.path().display(), e);
            }
            self.status = Some(writer);
        }
    }

    fn publish_sample(&mut self, sample: Sample, point: ProjectedPoint, bucket: usize, speed: f64) {
        self.current = Some(sample.clone());
        self.emit(SessionEvent::SampleReady {
            generation: self.generation,
            sample,
            point,
            speed,
        });
        self.emit(SessionEvent::BucketUpdated {
            generation: self.generation,
            bucket,
            point,
        });
    }

    fn emit_playback_change(&self, before: PlaybackState) {
        let state = self.playback.state();
        if state != before {
            info!("Playback {:?} -> {:?} at index {}", before, state, self.playback.index());
            self.emit(SessionEvent::PlaybackChanged {
                generation: self.generation,
                state,
            });
        }
    }

    fn emit_status(&self, message: String) {
        info!("{}", message);
        self.emit(SessionEvent::Status(message));
    }

    fn emit(&self, event: SessionEvent) {
        if let Some(tx) = &self.events {
            // A renderer that went away is not an error for the producer
            let _ = tx.send(event);
        }
    }
}
