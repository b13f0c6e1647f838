//! Wireless link to the data-acquisition board
//!
//! The board advertises itself by name and exposes two read-only
//! characteristics: a GPS-status byte and a 48-byte IMU frame. Any radio stack
//! able to scan, connect and read characteristics can drive a live session by
//! implementing `Transport`.

use std::future::Future;
use std::time::Duration;

use crate::error::Result;

pub const GPS_STATUS_CHARACTERISTIC: &str = "d69584e5-5142-414f-a90e-07c271d18575";
pub const IMU_CHARACTERISTIC: &str = "d69584e5-5142-414f-a90e-07c271d18576";

/// A device seen during discovery
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Peripheral {
    pub name: Option<String>,
    pub address: String,
}

impl Peripheral {
    pub fn new(name: Option<&str>, address: &str) -> Self {
        Self {
            name: name.map(str::to_string),
            address: address.to_string(),
        }
    }

    /// Case-insensitive substring match on the advertised name
    pub fn matches(&self, identifier: &str) -> bool {
        let identifier = identifier.to_lowercase();
        self.name
            .as_deref()
            .map(|name| name.to_lowercase().contains(&identifier))
            .unwrap_or(false)
    }
}

pub trait Transport: Send {
    /// Scan for advertising devices for up to `window`
    fn discover(&mut self, window: Duration) -> impl Future<Output = Result<Vec<Peripheral>>> + Send;

    fn connect(&mut self, peripheral: &Peripheral) -> impl Future<Output = Result<()>> + Send;

    /// Read the current value of a characteristic
    fn read(&mut self, characteristic: &'static str) -> impl Future<Output = Result<Vec<u8>>> + Send;

    fn disconnect(&mut self) -> impl Future<Output = Result<()>> + Send;
}

/// First peripheral whose advertised name contains `identifier`
pub fn select_peripheral<'a>(peripherals: &'a [Peripheral], identifier: &str) -> Option<&'a Peripheral> {
    peripherals.iter().find(|p| p.matches(identifier))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_by_name_substring() {
        let found = vec![
            Peripheral::new(None, "00:00:00:00:00:01"),
            Peripheral::new(Some("Headphones"), "00:00:00:00:00:02"),
            Peripheral::new(Some("CAR_GO_VROOM_2"), "00:00:00:00:00:03"),
            Peripheral::new(Some("car_go_vroom"), "00:00:00:00:00:04"),
        ];
        let selected = select_peripheral(&found, "car_go_vroom").unwrap();
        assert_eq!(selected.address, "00:00:00:00:00:03");
        assert!(select_peripheral(&found, "washr").is_none());
    }
}
