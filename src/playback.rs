//! Fixed-rate replay of a recorded trajectory
//!
//! Each tick renders the sample under the cursor, then moves the cursor
//! `step_size` samples ahead. Stepping by more than one sample matches the
//! recorded IMU rate (many rows per GPS update) to what the live link shows.

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, MissedTickBehavior};

use crate::path_cache::PathCache;
use crate::session::TraceSession;
use crate::trajectory::Trajectory;
use crate::types::{ProjectedPoint, Sample};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaybackState {
    Stopped,
    Running,
    /// Cursor ran off the end of the trajectory. Only `reset` leaves this state.
    Finished,
}

/// The sample rendered by one tick
#[derive(Clone, Debug, PartialEq)]
pub struct PlaybackFrame {
    pub index: usize,
    pub sample: Sample,
    pub point: ProjectedPoint,
    pub bucket: usize,
    pub speed: f64,
}

#[derive(Clone, Debug)]
pub struct PlaybackClock {
    index: usize,
    step_size: usize,
    state: PlaybackState,
}

impl PlaybackClock {
    pub fn new(step_size: usize) -> Self {
        Self {
            index: 0,
            step_size: step_size.max(1),
            state: PlaybackState::Stopped,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn step_size(&self) -> usize {
        self.step_size
    }

    /// Stopped → Running. A finished clock stays finished.
    pub fn play(&mut self) {
        if self.state == PlaybackState::Stopped {
            self.state = PlaybackState::Running;
        }
    }

    /// Running → Stopped
    pub fn pause(&mut self) {
        if self.state == PlaybackState::Running {
            self.state = PlaybackState::Stopped;
        }
    }

    /// Back to index 0, stopped. Called whenever a new trajectory is loaded.
    pub fn reset(&mut self) {
        self.index = 0;
        self.state = PlaybackState::Stopped;
    }

    /// Advance one tick, feeding the rendered sample into `cache`
    ///
    /// The cursor moving past the end does not finish the clock by itself; the
    /// next tick notices and transitions to `Finished` without rendering.
    pub fn tick(&mut self, trajectory: &Trajectory, cache: &mut PathCache) -> Option<PlaybackFrame> {
        if self.state != PlaybackState::Running {
            return None;
        }

        let (sample, point) = match (trajectory.get(self.index), trajectory.project(self.index)) {
            (Some(sample), Some(point)) => (sample.clone(), point),
            _ => {
                self.state = PlaybackState::Finished;
                return None;
            }
        };

        let speed = sample.display_speed();
        let bucket = cache.push(point, speed);
        let frame = PlaybackFrame {
            index: self.index,
            sample,
            point,
            bucket,
            speed,
        };
        self.index = self.index.saturating_add(self.step_size);
        Some(frame)
    }
}

/// Remote control for a running playback driver
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaybackCommand {
    Play,
    Pause,
}

/// Drive `session`'s playback clock on a fixed-interval timer
///
/// Runs until `shutdown` flips to true (or its sender is dropped), until the
/// clock finishes, or until the command channel is closed while the clock is
/// not running. Returns the number of samples rendered.
pub async fn run_playback(
    session: &mut TraceSession,
    mut commands: mpsc::Receiver<PlaybackCommand>,
    mut shutdown: watch::Receiver<bool>,
) -> usize {
    let mut ticker = interval(session.playback_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut commands_open = true;
    let mut rendered = 0usize;

    loop {
        if *shutdown.borrow() {
            break;
        }
        if session.playback_state() == PlaybackState::Finished {
            break;
        }
        if !commands_open && session.playback_state() != PlaybackState::Running {
            break;
        }

        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            command = commands.recv(), if commands_open => match command {
                Some(PlaybackCommand::Play) => session.play(),
                Some(PlaybackCommand::Pause) => session.pause(),
                None => commands_open = false,
            },
            _ = ticker.tick() => {
                if session.tick_playback().is_some() {
                    rendered += 1;
                }
            }
        }
    }

    rendered
}
