//! User-level settings kept apart from the sealed descriptor.
//!
//! These change at runtime from the front panel (a sensor is taken out
//! of service, the service interval is adjusted) and are stored as a
//! small postcard blob through the key/value [`StoragePort`].

use log::{info, warn};
use serde::{Deserialize, Serialize};

use super::{MAX_SENSORS, SEGMENT_SIZE, SEGMENTS, Settings};
use crate::app::ports::{StorageError, StoragePort};

pub const USER_NAMESPACE: &str = "gasctl";
pub const USER_KEY: &str = "user";

/// Upper bound of the encoded blob.
const MAX_BLOB_SIZE: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSettings {
    pub service_interval_d: u16,
    pub serial_nr: i32,
    /// Sensors taken out of service permanently, one bit per slot.
    inactive: [u32; SEGMENTS],
}

impl UserSettings {
    /// Initial values taken from the sealed settings.
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            service_interval_d: settings.service_interval_d,
            serial_nr: settings.serial_nr,
            inactive: [0; SEGMENTS],
        }
    }

    pub fn is_inactive(&self, sensor: usize) -> bool {
        sensor < MAX_SENSORS && self.inactive[sensor / SEGMENT_SIZE] & (1 << (sensor % SEGMENT_SIZE)) != 0
    }

    /// Returns `true` if the flag changed.
    pub fn set_inactive(&mut self, sensor: usize, inactive: bool) -> bool {
        if sensor >= MAX_SENSORS || self.is_inactive(sensor) == inactive {
            return false;
        }
        self.inactive[sensor / SEGMENT_SIZE] ^= 1 << (sensor % SEGMENT_SIZE);
        true
    }

    pub fn inactive_sensors(&self) -> impl Iterator<Item = usize> + '_ {
        (0..MAX_SENSORS).filter(|i| self.is_inactive(*i))
    }

    /// Load from storage, falling back to `fallback` when the key is
    /// missing or the blob does not decode.
    pub fn load_or(storage: &impl StoragePort, fallback: Self) -> Self {
        let mut buf = [0u8; MAX_BLOB_SIZE];
        match storage.read(USER_NAMESPACE, USER_KEY, &mut buf) {
            Ok(len) => match postcard::from_bytes::<Self>(&buf[..len.min(MAX_BLOB_SIZE)]) {
                Ok(user) => {
                    info!("user settings loaded ({} inactive sensors)", user.inactive_sensors().count());
                    user
                }
                Err(e) => {
                    warn!("user settings blob unreadable ({e}), using defaults");
                    fallback
                }
            },
            Err(StorageError::NotFound) => fallback,
            Err(e) => {
                warn!("user settings read failed ({e}), using defaults");
                fallback
            }
        }
    }

    pub fn save(&self, storage: &mut impl StoragePort) -> Result<(), StorageError> {
        let mut buf = [0u8; MAX_BLOB_SIZE];
        let used = postcard::to_slice(self, &mut buf).map_err(|_| StorageError::Encoding)?;
        storage.write(USER_NAMESPACE, USER_KEY, used)
    }
}
