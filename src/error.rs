//! Error handling for cranio
//!
//! This module defines the crate error type and a Result alias used
//! throughout the acquisition core and the session state machine.

use thiserror::Error;

/// Main error type for cranio operations
#[derive(Error, Debug)]
pub enum CranioError {
    /// A transition guard refused to fire; the state machine stays put
    #[error("Guard refused: {0}")]
    GuardRefused(String),

    /// A single sensor failed to deliver a sample
    #[error("Sensor read error: {0}")]
    SensorRead(String),

    /// An operation was attempted in a lifecycle state that forbids it
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Packets with different channel sets cannot be combined
    #[error("Schema mismatch: expected channels {expected:?}, found {found:?}")]
    SchemaMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },

    /// A packet whose columns do not match its index
    #[error("Invalid packet: {0}")]
    InvalidPacket(String),

    /// A channel was registered twice on the same sensor
    #[error("Channel already registered: {0}")]
    DuplicateChannel(String),

    /// A sensor telegram could not be decoded
    #[error("Telegram error: {0}")]
    Telegram(String),

    /// The hardware sensor could not be found
    #[error("Device detection error: {0}")]
    DeviceDetection(String),

    /// An event identifier or annotated region is invalid
    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    /// A console command could not be parsed
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    /// A requested record does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Errors from the serial port layer
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// Errors from the database layer
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors related to channel communication
    #[error("Channel error: {0}")]
    Channel(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<CranioError>,
    },
}

impl CranioError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        CranioError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Strip any context wrappers and return the underlying error
    pub fn root(&self) -> &CranioError {
        match self {
            CranioError::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether this error is a refused transition guard
    pub fn is_guard_refusal(&self) -> bool {
        matches!(self.root(), CranioError::GuardRefused(_))
    }
}

impl From<bincode::Error> for CranioError {
    fn from(err: bincode::Error) -> Self {
        CranioError::Serialization(err.to_string())
    }
}

/// Result type alias for cranio operations
pub type Result<T> = std::result::Result<T, CranioError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}
