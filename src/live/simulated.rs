use std::time::Duration;

use log::debug;

use super::transport::{Peripheral, Transport, GPS_STATUS_CHARACTERISTIC, IMU_CHARACTERISTIC};
use crate::codec::{GpsStatus, ImuFrame};
use crate::error::{Result, TraceError};

/// Stand-in for the real board: drives laps of a circular course
///
/// Fault injection hooks let tests exercise the live session's error paths.
#[derive(Clone, Debug)]
pub struct SimulatedTransport {
    pub device_name: String,
    pub radius_m: f64,
    pub speed_mps: f64,
    /// Seconds of simulated driving between IMU reads
    pub poll_dt: f64,
    /// IMU reads before the GPS reports a fix
    pub fix_after: u64,
    /// IMU read (0-based) answered with a truncated frame
    pub malformed_at: Option<u64>,
    /// IMU read (0-based) whose fused position is NaN
    pub non_finite_at: Option<u64>,
    /// IMU read (0-based) that fails as if the link dropped
    pub drop_link_at: Option<u64>,
    /// IMU read (0-based) that never answers
    pub stall_at: Option<u64>,
    connected: bool,
    imu_reads: u64,
    disconnects: u32,
}

impl SimulatedTransport {
    pub fn new(device_name: &str) -> Self {
        Self {
            device_name: device_name.to_string(),
            radius_m: 150.0,
            speed_mps: 15.0,
            poll_dt: 0.5,
            fix_after: 0,
            malformed_at: None,
            non_finite_at: None,
            drop_link_at: None,
            stall_at: None,
            connected: false,
            imu_reads: 0,
            disconnects: 0,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn disconnect_count(&self) -> u32 {
        self.disconnects
    }

    pub fn imu_reads(&self) -> u64 {
        self.imu_reads
    }

    fn frame_at(&self, step: u64) -> ImuFrame {
        // Zero radius parks the car on the reference point
        let omega = if self.radius_m > 0.0 {
            self.speed_mps / self.radius_m
        } else {
            0.0
        };
        let theta = omega * step as f64 * self.poll_dt;
        let (sin, cos) = theta.sin_cos();
        let centripetal = self.speed_mps * omega;

        ImuFrame {
            ez: theta.to_degrees().rem_euclid(360.0) as f32,
            // Counter-clockwise laps: the center is always to the left
            ly: centripetal as f32,
            ax_w: (-centripetal * cos) as f32,
            ay_w: (-centripetal * sin) as f32,
            vx: (-self.speed_mps * sin) as f32,
            vy: (self.speed_mps * cos) as f32,
            x_pos: (self.radius_m * cos) as f32,
            y_pos: (self.radius_m * sin) as f32,
            ..ImuFrame::default()
        }
    }

    fn read_imu(&mut self) -> Result<Vec<u8>> {
        let step = self.imu_reads;
        self.imu_reads += 1;

        if self.drop_link_at == Some(step) {
            self.connected = false;
            return Err(TraceError::link("simulated link dropped"));
        }
        if self.malformed_at == Some(step) {
            return Ok(self.frame_at(step).encode()[..40].to_vec());
        }
        if self.non_finite_at == Some(step) {
            let frame = ImuFrame {
                x_pos: f32::NAN,
                ..self.frame_at(step)
            };
            return Ok(frame.encode().to_vec());
        }
        Ok(self.frame_at(step).encode().to_vec())
    }
}

impl Transport for SimulatedTransport {
    async fn discover(&mut self, _window: Duration) -> Result<Vec<Peripheral>> {
        Ok(vec![
            Peripheral::new(Some("Living Room TV"), "5C:AA:FD:00:00:01"),
            Peripheral::new(Some(self.device_name.as_str()), "24:6F:28:00:00:02"),
        ])
    }

    async fn connect(&mut self, peripheral: &Peripheral) -> Result<()> {
        debug!("[sim] connected to {}", peripheral.address);
        self.connected = true;
        Ok(())
    }

    async fn read(&mut self, characteristic: &'static str) -> Result<Vec<u8>> {
        if !self.connected {
            return Err(TraceError::link("not connected"));
        }
        match characteristic {
            GPS_STATUS_CHARACTERISTIC => {
                let status = GpsStatus {
                    has_fix: self.imu_reads >= self.fix_after,
                };
                Ok(status.encode().to_vec())
            }
            IMU_CHARACTERISTIC => {
                if self.stall_at == Some(self.imu_reads) {
                    std::future::pending::<()>().await;
                }
                self.read_imu()
            }
            other => Err(TraceError::link(format!("unknown characteristic {}", other))),
        }
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.connected = false;
        self.disconnects += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[tokio::test]
    async fn test_frames_follow_the_circle() {
        let mut sim = SimulatedTransport::new("car_go_vroom");
        let peripherals = sim.discover(Duration::from_secs(1)).await.unwrap();
        sim.connect(&peripherals[1]).await.unwrap();

        let first = ImuFrame::decode(&sim.read(IMU_CHARACTERISTIC).await.unwrap()).unwrap();
        assert_relative_eq!(first.x_pos, 150.0);
        assert_relative_eq!(first.y_pos, 0.0);
        assert_relative_eq!(first.vx.hypot(first.vy), 15.0, epsilon = 1e-4);
    }

    #[tokio::test]
    async fn test_zero_radius_stays_put() {
        let mut sim = SimulatedTransport::new("car_go_vroom");
        sim.radius_m = 0.0;
        sim.speed_mps = 0.0;
        sim.connected = true;

        for _ in 0..3 {
            let frame = ImuFrame::decode(&sim.read(IMU_CHARACTERISTIC).await.unwrap()).unwrap();
            assert!(frame.check_finite().is_ok());
            assert_eq!((frame.x_pos, frame.y_pos), (0.0, 0.0));
        }
    }

    #[tokio::test]
    async fn test_reads_require_connection() {
        let mut sim = SimulatedTransport::new("car_go_vroom");
        assert!(matches!(sim.read(GPS_STATUS_CHARACTERISTIC).await, Err(TraceError::Link(_))));
    }
}
