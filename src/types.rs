//! Core data types for cranio
//!
//! This module contains the small value types shared by the acquisition
//! backend, the database layer and the session state machine.
//!
//! # Main Types
//!
//! - [`ChannelInfo`] - A named, unit-tagged data channel exposed by a sensor
//! - [`SensorInfo`] - Identifying information and calibration of a sensor
//! - [`DistractorType`] / [`DistractorInfo`] - Distractor model and its displacement factor
//! - [`EventId`] - Identifier of an annotated event such as `D001`
//! - [`ConnectionStatus`] - Sensor connection state shown to the operator

use crate::error::{CranioError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Timestamp type used for packet indices and persisted records
pub type Timestamp = DateTime<Utc>;

/// Largest event number (exclusive) an [`EventId`] may carry
pub const MAX_EVENT_NUM: u32 = 1000;

/// A named data channel with a physical unit
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelInfo {
    /// Channel name, e.g. `torque`
    pub name: String,
    /// Physical unit, e.g. `Nm`
    pub unit: String,
}

impl ChannelInfo {
    /// Create a new channel description
    pub fn new(name: impl Into<String>, unit: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            unit: unit.into(),
        }
    }

    /// Column name used for this channel in packets and tables
    pub fn column_name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ChannelInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.unit)
    }
}

/// Identifying information of a sensor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorInfo {
    /// Serial number, used as the primary key in the database
    pub sensor_serial_number: String,
    /// Number of distractor turns that make up one full turn
    pub turns_in_full_turn: u32,
}

impl SensorInfo {
    /// Create sensor info
    pub fn new(serial_number: impl Into<String>, turns_in_full_turn: u32) -> Self {
        Self {
            sensor_serial_number: serial_number.into(),
            turns_in_full_turn,
        }
    }
}

/// Distractor model
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DistractorType {
    /// KLS Martin distractor
    #[default]
    Kls,
    /// Any other distractor model, stored by name
    Other(String),
}

impl DistractorType {
    /// Database and configuration name of the distractor type
    pub fn as_str(&self) -> &str {
        match self {
            DistractorType::Kls => "KLS",
            DistractorType::Other(name) => name,
        }
    }
}

impl fmt::Display for DistractorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for DistractorType {
    fn from(value: String) -> Self {
        if value.eq_ignore_ascii_case("KLS") {
            DistractorType::Kls
        } else {
            DistractorType::Other(value)
        }
    }
}

impl From<DistractorType> for String {
    fn from(value: DistractorType) -> Self {
        value.as_str().to_string()
    }
}

/// Displacement characteristics of a distractor model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistractorInfo {
    pub distractor_type: DistractorType,
    /// Millimetres of distraction achieved per full turn
    pub displacement_mm_per_full_turn: f64,
}

impl DistractorInfo {
    pub fn new(distractor_type: DistractorType, displacement_mm_per_full_turn: f64) -> Self {
        Self {
            distractor_type,
            displacement_mm_per_full_turn,
        }
    }

    /// Distraction achieved in millimetres for the given number of full turns
    pub fn distraction_achieved_mm(&self, full_turn_count: f64) -> f64 {
        full_turn_count * self.displacement_mm_per_full_turn
    }
}

/// Kind of an annotated event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EventType {
    /// One distraction turn
    #[default]
    Distraction,
}

impl EventType {
    /// Single-letter code of the event type
    pub fn code(&self) -> char {
        match self {
            EventType::Distraction => 'D',
        }
    }

    /// Parse an event type from its code
    pub fn from_code(code: &str) -> Result<Self> {
        match code {
            "D" => Ok(EventType::Distraction),
            other => Err(CranioError::InvalidEvent(format!(
                "Unknown event type '{}'",
                other
            ))),
        }
    }
}

/// Identifier of an annotated event, displayed as e.g. `D001`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId {
    pub event_type: EventType,
    pub num: u32,
}

impl EventId {
    /// Create an event identifier; the number must be below [`MAX_EVENT_NUM`]
    pub fn new(event_type: EventType, num: u32) -> Result<Self> {
        if num >= MAX_EVENT_NUM {
            return Err(CranioError::InvalidEvent(format!(
                "Event number must be less than {}, got {}",
                MAX_EVENT_NUM, num
            )));
        }
        Ok(Self { event_type, num })
    }

    /// Shorthand for a distraction event
    pub fn distraction(num: u32) -> Result<Self> {
        Self::new(EventType::Distraction, num)
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:03}", self.event_type.code(), self.num)
    }
}

/// Sensor connection status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectionStatus {
    /// No sensor connected
    #[default]
    Disconnected,
    /// Hardware sensor connected
    Connected,
    /// Software sensor connected
    Dummy,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Disconnected => write!(f, "Disconnected"),
            ConnectionStatus::Connected => write!(f, "Connected"),
            ConnectionStatus::Dummy => write!(f, "Dummy sensor"),
        }
    }
}
