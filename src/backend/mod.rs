//! Acquisition backend: sensors, packets and the producer process
//!
//! This module turns sensor readings into timestamped packets on a worker
//! thread and buffers them until the controller persists them.
//!
//! # Architecture
//!
//! Data flows in one direction:
//!
//! ```text
//! Sensor(s) --read--> Producer --packet--> Store --flush--> MeasurementSink
//!             (worker thread, ProducerProcess)     (controller thread)
//! ```
//!
//! - [`Sensor`] - Common interface of the Imada gauge and the dummy sensor
//! - [`Producer`] - Polls every registered sensor once per tick and merges the results
//! - [`Store`] - Thread-safe buffer with explicit read and flush stages
//! - [`ProducerProcess`] - Runs a producer on its own thread, driven by [`ProcessCommand`]s
//!
//! # Components
//!
//! - [`Packet`] / [`Table`] - Columnar samples and their row-major view
//! - [`ChannelRegistry`] - Ordered, duplicate-free set of channels of a sensor
//! - [`ImadaSensor`] - Imada torque gauge over a serial port
//! - [`DummySensor`] - Software sensor producing generated values
//!
//! # Example
//!
//! ```ignore
//! use cranio::backend::{create_dummy_sensor, shared, AcquisitionProcess, ProducerProcess, Store};
//! use std::time::Duration;
//!
//! let mut process = ProducerProcess::new("Torque producer process", Duration::from_millis(100), Store::in_memory());
//! process.register_sensor(shared(create_dummy_sensor(3)?))?;
//! process.start()?;
//!
//! // Periodically, from the controller
//! let table = process.store().drain()?;
//!
//! process.pause()?;
//! process.join()?;
//! ```

pub mod channel;
pub mod dummy_sensor;
pub mod imada;
pub mod packet;
pub mod producer;
pub mod sensor_trait;
pub mod store;
pub mod worker;

pub use channel::ChannelRegistry;
pub use dummy_sensor::{create_dummy_sensor, DummyPattern, DummySensor, DUMMY_SERIAL_NUMBER};
pub use imada::{decode_telegram, find_serial_device, ImadaSensor, SerialLink, Telegram};
pub use packet::{Column, Packet, Table};
pub use producer::{same_sensor, MonotonicClock, Producer};
pub use sensor_trait::{lock_sensor, shared, PollStats, Sensor, SensorHandle};
pub use store::{MeasurementSink, MemorySink, Store};
pub use worker::{
    AcquisitionProcess, ProcessCommand, ProcessFactory, ProcessMonitor, ProcessState,
    ProducerProcess, ThreadProcessFactory,
};

use crate::types::ChannelInfo;

/// Name of the torque channel exposed by every sensor
pub const TORQUE_CHANNEL: &str = "torque";
/// Unit of the torque channel
pub const TORQUE_UNIT: &str = "Nm";

/// The torque channel measured during distraction
pub fn torque_channel() -> ChannelInfo {
    ChannelInfo::new(TORQUE_CHANNEL, TORQUE_UNIT)
}
