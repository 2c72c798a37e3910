//! Configuration sections
//!
//! Each section is read from its own table in `cranio.toml`. Missing keys
//! fall back to the defaults below, so a partial file is always valid.

use crate::types::DistractorType;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Serial number of the Imada torque sensor shipped with the device
pub const DEFAULT_IMADA_SERIAL_NUMBER: &str = "FTSLQ6QIA";

/// Imada RS232 baud rate
pub const DEFAULT_BAUD_RATE: u32 = 19200;

/// Default number of distractor turns in one full turn
pub const DEFAULT_TURNS_IN_FULL_TURN: u32 = 3;

/// Sensor connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    /// Connect a software sensor when no hardware sensor is found
    pub enable_dummy_sensor: bool,
    /// USB serial number of the Imada sensor to look for
    pub imada_serial_number: String,
    pub baud_rate: u32,
    /// Serial read timeout in milliseconds
    pub read_timeout_ms: u64,
    /// Turns in one full turn, recorded with the sensor info
    pub turns_in_full_turn: u32,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            enable_dummy_sensor: false,
            imada_serial_number: DEFAULT_IMADA_SERIAL_NUMBER.to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout_ms: 20,
            turns_in_full_turn: DEFAULT_TURNS_IN_FULL_TURN,
        }
    }
}

impl SensorConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// Acquisition scheduling settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Interval between two sensor polls in milliseconds
    pub poll_interval_ms: u64,
    /// Interval between two store drains by the controller in milliseconds
    pub ui_update_interval_ms: u64,
    /// Thread name of the producer process
    pub process_name: String,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            ui_update_interval_ms: 1000,
            process_name: "Torque producer process".to_string(),
        }
    }
}

impl AcquisitionConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn ui_update_interval(&self) -> Duration {
        Duration::from_millis(self.ui_update_interval_ms)
    }
}

/// Defaults for new measurement documents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub default_distractor: DistractorType,
    /// Operator name recorded on every document
    pub operator: String,
    /// Distractor number recorded on every document
    pub distractor_number: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_distractor: DistractorType::Kls,
            operator: String::new(),
            distractor_number: 1,
        }
    }
}

/// Database location
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path of the SQLite file; `None` uses the application data directory
    pub path: Option<PathBuf>,
}
