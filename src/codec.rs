//! Binary payloads read from the sensor's GATT characteristics
//!
//! The IMU characteristic is 12 little-endian f32 values packed back to back.
//! The GPS-status characteristic is a byte payload whose first byte is the fix flag.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TraceError};

pub const IMU_FIELD_COUNT: usize = 12;
pub const IMU_FRAME_LEN: usize = IMU_FIELD_COUNT * 4;

const IMU_FIELD_NAMES: [&str; IMU_FIELD_COUNT] = [
    "ex", "ey", "ez", "lx", "ly", "lz", "ax_w", "ay_w", "vx", "vy", "x_pos", "y_pos",
];

/// Decoded IMU characteristic, fields in wire order
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ImuFrame {
    // Euler angles
    pub ex: f32,
    pub ey: f32,
    pub ez: f32,
    // Linear acceleration, body frame
    pub lx: f32,
    pub ly: f32,
    pub lz: f32,
    // World-frame acceleration
    pub ax_w: f32,
    pub ay_w: f32,
    // Fused velocity
    pub vx: f32,
    pub vy: f32,
    // Fused position, meters east/north of the sensor's origin
    pub x_pos: f32,
    pub y_pos: f32,
}

impl ImuFrame {
    /// Decode exactly 48 bytes. Short or long payloads are rejected, never truncated.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        if payload.len() != IMU_FRAME_LEN {
            return Err(TraceError::MalformedFrame {
                expected: IMU_FRAME_LEN,
                actual: payload.len(),
            });
        }

        let mut fields = [0f32; IMU_FIELD_COUNT];
        for (slot, chunk) in fields.iter_mut().zip(payload.chunks_exact(4)) {
            *slot = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        Ok(Self::from_fields(fields))
    }

    /// First field holding NaN or infinity, if any
    ///
    /// `decode` keeps such values so frames round-trip bit for bit; callers
    /// that turn a frame into a position must check it first.
    pub fn check_finite(&self) -> Result<()> {
        match self.fields().iter().position(|v| !v.is_finite()) {
            Some(i) => Err(TraceError::NonFiniteField {
                field: IMU_FIELD_NAMES[i],
            }),
            None => Ok(()),
        }
    }

    pub fn encode(&self) -> [u8; IMU_FRAME_LEN] {
        let mut out = [0u8; IMU_FRAME_LEN];
        for (chunk, value) in out.chunks_exact_mut(4).zip(self.fields()) {
            chunk.copy_from_slice(&value.to_le_bytes());
        }
        out
    }

    pub fn from_fields(f: [f32; IMU_FIELD_COUNT]) -> Self {
        Self {
            ex: f[0],
            ey: f[1],
            ez: f[2],
            lx: f[3],
            ly: f[4],
            lz: f[5],
            ax_w: f[6],
            ay_w: f[7],
            vx: f[8],
            vy: f[9],
            x_pos: f[10],
            y_pos: f[11],
        }
    }

    pub fn fields(&self) -> [f32; IMU_FIELD_COUNT] {
        [
            self.ex, self.ey, self.ez, self.lx, self.ly, self.lz, self.ax_w, self.ay_w, self.vx,
            self.vy, self.x_pos, self.y_pos,
        ]
    }
}

/// Decoded GPS-status characteristic
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpsStatus {
    pub has_fix: bool,
}

impl GpsStatus {
    pub fn decode(payload: &[u8]) -> Result<Self> {
        match payload.first() {
            Some(&flag) => Ok(Self { has_fix: flag != 0 }),
            None => Err(TraceError::MalformedFrame {
                expected: 1,
                actual: 0,
            }),
        }
    }

    pub fn encode(&self) -> [u8; 1] {
        [u8::from(self.has_fix)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_frame() -> ImuFrame {
        ImuFrame::from_fields([
            0.1, -0.2, 179.5, 0.01, -0.02, 9.81, 1.5, -2.25, 12.0, -0.5, 1234.5, -987.25,
        ])
    }

    #[test]
    fn test_decode_field_order() {
        let mut bytes = Vec::new();
        for i in 0..IMU_FIELD_COUNT {
            bytes.extend_from_slice(&(i as f32).to_le_bytes());
        }
        let frame = ImuFrame::decode(&bytes).unwrap();
        assert_eq!(frame.ex, 0.0);
        assert_eq!(frame.lz, 5.0);
        assert_eq!(frame.ax_w, 6.0);
        assert_eq!(frame.vy, 9.0);
        assert_eq!(frame.y_pos, 11.0);
    }

    #[test]
    fn test_encode_decode_bit_exact() {
        let frame = sample_frame();
        let decoded = ImuFrame::decode(&frame.encode()).unwrap();
        for (a, b) in frame.fields().iter().zip(decoded.fields().iter()) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
    }

    #[test]
    fn test_wrong_length_rejected() {
        let bytes = sample_frame().encode();
        for len in [0, 1, 44, 47] {
            match ImuFrame::decode(&bytes[..len]) {
                Err(TraceError::MalformedFrame { expected, actual }) => {
                    assert_eq!(expected, IMU_FRAME_LEN);
                    assert_eq!(actual, len);
                }
                other => panic!("expected MalformedFrame for {} bytes, got {:?}", len, other),
            }
        }

        let mut long = bytes.to_vec();
        long.push(0);
        assert!(matches!(
            ImuFrame::decode(&long),
            Err(TraceError::MalformedFrame { actual: 49, .. })
        ));
    }

    #[test]
    fn test_non_finite_fields_reported() {
        assert!(sample_frame().check_finite().is_ok());

        let mut frame = sample_frame();
        frame.x_pos = f32::NAN;
        assert!(matches!(
            frame.check_finite(),
            Err(TraceError::NonFiniteField { field: "x_pos" })
        ));

        let mut frame = sample_frame();
        frame.vy = f32::INFINITY;
        let decoded = ImuFrame::decode(&frame.encode()).unwrap();
        assert!(matches!(
            decoded.check_finite(),
            Err(TraceError::NonFiniteField { field: "vy" })
        ));
    }

    #[test]
    fn test_gps_status() {
        assert!(GpsStatus::decode(&[1]).unwrap().has_fix);
        assert!(GpsStatus::decode(&[7, 0, 0]).unwrap().has_fix);
        assert!(!GpsStatus::decode(&[0, 1]).unwrap().has_fix);
        assert!(GpsStatus::decode(&[]).is_err());
        assert_eq!(GpsStatus { has_fix: true }.encode(), [1]);
    }
}
