//! Live telemetry from the data-acquisition board
//!
//! One poll reads the GPS-status byte, then the IMU frame, and turns the pair
//! into a `Sample`. The board reports its fused position in meters east/north
//! of where it was switched on, so the configured reference point anchors
//! those meters to the globe.

pub mod simulated;
pub mod transport;

use log::{debug, info, warn};
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::{interval, timeout, Instant, MissedTickBehavior};

use crate::codec::{GpsStatus, ImuFrame};
use crate::config::LiveConfig;
use crate::error::{Result, TraceError};
use crate::projection::GeoProjector;
use crate::session::TraceSession;
use crate::trajectory::AppendOutcome;
use crate::types::{BodyAccel, BodyVelocity, GeoPoint, Sample, WorldAccel};

pub use simulated::SimulatedTransport;
pub use transport::{
    select_peripheral, Peripheral, Transport, GPS_STATUS_CHARACTERISTIC, IMU_CHARACTERISTIC,
};

/// Counters for one live connection
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct LiveStats {
    pub polls: u64,
    pub samples: u64,
    pub no_fix: u64,
    pub malformed: u64,
}

pub struct LiveSession<T: Transport> {
    transport: T,
    config: LiveConfig,
    peripheral: Peripheral,
    reference: GeoProjector,
    started: Instant,
    stats: LiveStats,
    has_fix: bool,
}

impl<T: Transport> LiveSession<T> {
    /// Scan for the configured device and connect to the first match
    ///
    /// Fails with `TraceError::Config` before scanning when no usable
    /// reference point is configured.
    pub async fn connect(mut transport: T, config: LiveConfig) -> Result<Self> {
        let reference = GeoProjector::new(config.require_reference()?);
        info!(
            "Scanning {} ms for '{}'",
            config.discovery_window_ms, config.device_name
        );
        let peripherals = transport.discover(config.discovery_window()).await?;
        debug!("Discovered {} peripherals", peripherals.len());

        let peripheral = select_peripheral(&peripherals, &config.device_name)
            .cloned()
            .ok_or_else(|| TraceError::DeviceNotFound {
                identifier: config.device_name.clone(),
            })?;

        match timeout(config.read_timeout(), transport.connect(&peripheral)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(TraceError::link(format!(
                    "connect to {} timed out after {} ms",
                    peripheral.address, config.read_timeout_ms
                )))
            }
        }
        info!(
            "Connected to {} ({})",
            peripheral.name.as_deref().unwrap_or("?"),
            peripheral.address
        );

        Ok(Self {
            transport,
            config,
            peripheral,
            reference,
            started: Instant::now(),
            stats: LiveStats::default(),
            has_fix: false,
        })
    }

    pub fn peripheral(&self) -> &Peripheral {
        &self.peripheral
    }

    pub fn stats(&self) -> LiveStats {
        self.stats
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// One GPS-status read plus one IMU read, decoded into a sample
    ///
    /// Without a fix the sample sits at the (0, 0) sentinel, which the
    /// trajectory store rejects. A frame with a NaN or infinite field is
    /// `NonFiniteField`.
    pub async fn poll_once(&mut self) -> Result<Sample> {
        self.stats.polls += 1;

        let status = GpsStatus::decode(&self.read(GPS_STATUS_CHARACTERISTIC).await?)?;
        let frame = ImuFrame::decode(&self.read(IMU_CHARACTERISTIC).await?)?;
        frame.check_finite()?;

        if status.has_fix != self.has_fix {
            if status.has_fix {
                info!("GPS fix acquired");
            } else {
                warn!("GPS fix lost");
            }
            self.has_fix = status.has_fix;
        }

        Ok(self.build_sample(&frame, status.has_fix))
    }

    fn build_sample(&self, frame: &ImuFrame, has_fix: bool) -> Sample {
        let position = if has_fix {
            self.reference.offset(frame.x_pos as f64, frame.y_pos as f64)
        } else {
            GeoPoint::default()
        };
        Sample::new(
            position,
            self.started.elapsed().as_millis() as u64,
            BodyVelocity::new(frame.vx as f64, frame.vy as f64),
            BodyAccel::new(frame.lx as f64, frame.ly as f64, frame.lz as f64),
        )
        .with_world_accel(WorldAccel::new(frame.ax_w as f64, frame.ay_w as f64))
    }

    async fn read(&mut self, characteristic: &'static str) -> Result<Vec<u8>> {
        let limit = self.config.read_timeout();
        match timeout(limit, self.transport.read(characteristic)).await {
            Ok(result) => result,
            Err(_) => Err(TraceError::link(format!(
                "read of {} timed out after {} ms",
                characteristic,
                limit.as_millis()
            ))),
        }
    }

    /// Poll until shutdown or a link failure, appending into `session`
    ///
    /// The session is switched to a fresh live trajectory first. Malformed
    /// and non-finite frames are counted and skipped; any other error ends
    /// the loop. The transport is disconnected on every exit path.
    pub async fn run(
        &mut self,
        session: &mut TraceSession,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<LiveStats> {
        session.start_live();
        self.started = Instant::now();

        let mut ticker = interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let outcome: Result<()> = loop {
            if *shutdown.borrow() {
                break Ok(());
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break Ok(());
                    }
                    continue;
                }
                _ = ticker.tick() => {}
            }

            let polled = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break Ok(());
                    }
                    continue;
                }
                polled = self.poll_once() => polled,
            };

            match polled {
                Ok(sample) => match session.push_live(sample) {
                    AppendOutcome::Appended => self.stats.samples += 1,
                    AppendOutcome::NoFix => self.stats.no_fix += 1,
                    AppendOutcome::NonFinite => self.stats.malformed += 1,
                    AppendOutcome::OutOfOrder => debug!("Dropped out-of-order live sample"),
                },
                Err(e) if e.is_frame_error() => {
                    warn!("Skipping frame: {}", e);
                    self.stats.malformed += 1;
                }
                Err(e) => break Err(e),
            }
            session.record_live_stats(self.stats);
        };

        self.disconnect().await;
        session.record_live_stats(self.stats);

        match outcome {
            Ok(()) => {
                info!(
                    "Live session ended: {} polls, {} samples, {} without fix, {} malformed",
                    self.stats.polls, self.stats.samples, self.stats.no_fix, self.stats.malformed
                );
                Ok(self.stats)
            }
            Err(e) => {
                warn!("Live session aborted: {}", e);
                Err(e)
            }
        }
    }

    /// Best-effort disconnect; failures are logged, not returned
    pub async fn disconnect(&mut self) {
        match timeout(self.config.read_timeout(), self.transport.disconnect()).await {
            Ok(Ok(())) => info!("Disconnected from {}", self.peripheral.address),
            Ok(Err(e)) => warn!("Disconnect failed: {}", e),
            Err(_) => warn!("Disconnect timed out"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TraceConfig;
    use approx::assert_relative_eq;
    use std::time::Duration;
    use tokio::time::sleep;

    fn live_config() -> LiveConfig {
        LiveConfig {
            reference: Some(GeoPoint::new(43.0, -79.0)),
            ..LiveConfig::default()
        }
    }

    async fn connected(sim: SimulatedTransport) -> LiveSession<SimulatedTransport> {
        LiveSession::connect(sim, live_config()).await.unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_matches_name() {
        let live = connected(SimulatedTransport::new("CAR_GO_VROOM")).await;
        assert_eq!(live.peripheral().address, "24:6F:28:00:00:02");
        assert!(live.transport().is_connected());

        let missing = LiveSession::connect(SimulatedTransport::new("board"), live_config()).await;
        assert!(matches!(missing, Err(TraceError::DeviceNotFound { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_requires_reference() {
        let unset = LiveSession::connect(
            SimulatedTransport::new("car_go_vroom"),
            LiveConfig::default(),
        )
        .await;
        assert!(matches!(unset, Err(TraceError::Config(_))));

        let sentinel = LiveConfig {
            reference: Some(GeoPoint::default()),
            ..LiveConfig::default()
        };
        let result = LiveSession::connect(SimulatedTransport::new("car_go_vroom"), sentinel).await;
        assert!(matches!(result, Err(TraceError::Config(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stationary_fix_at_reference_is_stored() {
        let mut sim = SimulatedTransport::new("car_go_vroom");
        sim.radius_m = 0.0;
        sim.speed_mps = 0.0;
        let mut live = connected(sim).await;
        let mut session = TraceSession::new(TraceConfig::default());
        session.start_live();

        let sample = live.poll_once().await.unwrap();
        assert!(sample.is_finite());
        assert_eq!(sample.position, GeoPoint::new(43.0, -79.0));
        assert_eq!(session.push_live(sample), AppendOutcome::Appended);
        assert_eq!(session.trajectory().anchor(), Some(GeoPoint::new(43.0, -79.0)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_finite_frame_skipped_and_never_anchors() {
        let mut sim = SimulatedTransport::new("car_go_vroom");
        sim.non_finite_at = Some(0);
        let mut live = connected(sim).await;
        let mut session = TraceSession::new(TraceConfig::default());
        let (tx, rx) = watch::channel(false);

        let (stats, _) = tokio::join!(live.run(&mut session, rx), async {
            sleep(Duration::from_millis(1_250)).await;
            let _ = tx.send(true);
        });
        let stats = stats.unwrap();

        assert_eq!(stats.polls, 3);
        assert_eq!(stats.malformed, 1);
        assert_eq!(stats.samples, 2);
        let anchor = session.trajectory().anchor().unwrap();
        assert!(anchor.latitude.is_finite() && anchor.longitude.is_finite());
        assert_eq!(session.trajectory().get(0).unwrap().timestamp_ms, 500);
    }

    #[tokio::test(start_paused = true)]
    async fn test_body_accel_from_linear_fields() {
        let mut live = connected(SimulatedTransport::new("car_go_vroom")).await;
        let sample = live.poll_once().await.unwrap();

        // 15 m/s on a 150 m circle pulls 1.5 m/s² toward the center
        assert_relative_eq!(sample.acceleration_body.x, 0.0);
        assert_relative_eq!(sample.acceleration_body.y, 1.5, epsilon = 1e-5);
        let world = sample.acceleration_world.unwrap();
        assert_relative_eq!(world.x, -1.5, epsilon = 1e-5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_unprojects_fused_position() {
        let mut live = connected(SimulatedTransport::new("car_go_vroom")).await;
        let sample = live.poll_once().await.unwrap();

        let expected = GeoProjector::new(GeoPoint::new(43.0, -79.0)).offset(150.0, 0.0);
        assert_relative_eq!(sample.latitude(), 43.0, epsilon = 1e-9);
        assert_relative_eq!(sample.longitude(), expected.longitude, epsilon = 1e-9);
        assert_relative_eq!(sample.speed_imu, 15.0, epsilon = 1e-4);
        assert_eq!(sample.timestamp_ms, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_until_shutdown() {
        let mut live = connected(SimulatedTransport::new("car_go_vroom")).await;
        let mut session = TraceSession::new(TraceConfig::default());
        let (tx, rx) = watch::channel(false);

        let (stats, _) = tokio::join!(live.run(&mut session, rx), async {
            sleep(Duration::from_millis(2_250)).await;
            let _ = tx.send(true);
        });
        let stats = stats.unwrap();

        // Polls at 0, 500, 1000, 1500, 2000 ms
        assert_eq!(stats.samples, 5);
        assert_eq!(session.trajectory().len(), 5);
        assert_eq!(session.cache().total_points(), 5);
        assert_eq!(session.trajectory().last().unwrap().timestamp_ms, 2_000);
        assert!(!live.transport().is_connected());
        assert_eq!(live.transport().disconnect_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_fix_polls_never_stored() {
        let mut sim = SimulatedTransport::new("car_go_vroom");
        sim.fix_after = 3;
        let mut live = connected(sim).await;
        let mut session = TraceSession::new(TraceConfig::default());
        let (tx, rx) = watch::channel(false);

        let (stats, _) = tokio::join!(live.run(&mut session, rx), async {
            sleep(Duration::from_millis(2_250)).await;
            let _ = tx.send(true);
        });
        let stats = stats.unwrap();

        assert_eq!(stats.no_fix, 3);
        assert_eq!(stats.samples, 2);
        assert!(session.trajectory().samples().iter().all(|s| s.has_fix()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_frame_skipped_then_link_drop_ends_run() {
        let mut sim = SimulatedTransport::new("car_go_vroom");
        sim.malformed_at = Some(1);
        sim.drop_link_at = Some(3);
        let mut live = connected(sim).await;
        let mut session = TraceSession::new(TraceConfig::default());
        let (_tx, rx) = watch::channel(false);

        let result = live.run(&mut session, rx).await;
        assert!(matches!(result, Err(TraceError::Link(_))));

        let stats = live.stats();
        assert_eq!(stats.malformed, 1);
        assert_eq!(stats.samples, 2);
        assert_eq!(session.trajectory().len(), 2);
        assert_eq!(live.transport().disconnect_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_read_times_out() {
        let mut sim = SimulatedTransport::new("car_go_vroom");
        sim.stall_at = Some(2);
        let mut live = connected(sim).await;
        let mut session = TraceSession::new(TraceConfig::default());
        let (_tx, rx) = watch::channel(false);

        match live.run(&mut session, rx).await {
            Err(TraceError::Link(msg)) => assert!(msg.contains("timed out")),
            other => panic!("expected link timeout, got {:?}", other),
        }
        assert_eq!(session.trajectory().len(), 2);
        assert_eq!(live.transport().disconnect_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_before_first_poll() {
        let mut live = connected(SimulatedTransport::new("car_go_vroom")).await;
        let mut session = TraceSession::new(TraceConfig::default());
        let (_tx, rx) = watch::channel(true);

        let stats = live.run(&mut session, rx).await.unwrap();
        assert_eq!(stats.polls, 0);
        assert_eq!(live.transport().disconnect_count(), 1);
    }
}
