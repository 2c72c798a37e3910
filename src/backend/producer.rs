//! Producer: polls registered sensors and merges their samples.
//!
//! Each call to [`Producer::read_all`] takes one timestamp and asks every
//! registered sensor for one sample. The samples are merged into a single
//! wide [`Packet`] indexed by that timestamp.
//!
//! # Failure handling
//!
//! A sensor whose read fails does not abort the poll. The failure is logged
//! and counted, and that sensor's columns carry `None` for the tick so the
//! packet schema stays the same from one poll to the next. A driver that
//! panics inside `read` is treated the same way.
//!
//! # Column names
//!
//! Columns keep the sensor's own names. When two sensors expose the same
//! column, the later one is qualified with its serial number:
//! `torque (Nm) [DUMMY]`.

use crate::backend::packet::{Column, Packet};
use crate::backend::sensor_trait::{lock_sensor, PollStats, SensorHandle};
use crate::error::CranioError;
use crate::types::Timestamp;
use chrono::Utc;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

/// Wall-clock timestamps that never go backwards
///
/// Anchored to the wall clock once and advanced by a monotonic clock, so
/// successive polls get non-decreasing index values even if the system time
/// is adjusted.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    anchor: Timestamp,
    started: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            anchor: Utc::now(),
            started: Instant::now(),
        }
    }

    pub fn now(&self) -> Timestamp {
        let elapsed = self.started.elapsed();
        self.anchor
            + chrono::Duration::from_std(elapsed).unwrap_or_else(|_| chrono::Duration::zero())
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether two handles point at the same sensor
pub fn same_sensor(a: &SensorHandle, b: &SensorHandle) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

/// Set of sensors polled together
#[derive(Default)]
pub struct Producer {
    sensors: Vec<SensorHandle>,
    clock: MonotonicClock,
    stats: PollStats,
}

impl Producer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a sensor. Registering the same handle twice has no effect.
    ///
    /// Returns `true` if the sensor was newly registered.
    pub fn register_sensor(&mut self, sensor: SensorHandle) -> bool {
        if self.is_registered(&sensor) {
            tracing::debug!("Sensor already registered with producer");
            return false;
        }
        self.sensors.push(sensor);
        true
    }

    /// Unregister a sensor. Unknown sensors are ignored.
    ///
    /// Returns `true` if the sensor was registered.
    pub fn unregister_sensor(&mut self, sensor: &SensorHandle) -> bool {
        let len_before = self.sensors.len();
        self.sensors.retain(|s| !same_sensor(s, sensor));
        self.sensors.len() < len_before
    }

    pub fn is_registered(&self, sensor: &SensorHandle) -> bool {
        self.sensors.iter().any(|s| same_sensor(s, sensor))
    }

    pub fn sensor_count(&self) -> usize {
        self.sensors.len()
    }

    pub fn stats(&self) -> &PollStats {
        &self.stats
    }

    /// Poll every sensor once and merge the results
    ///
    /// Returns `None` when no registered sensor has a channel.
    pub fn read_all(&mut self) -> Option<Packet> {
        let poll_start = Instant::now();
        let timestamp = self.clock.now();
        let mut columns: Vec<Column> = Vec::new();

        for (position, handle) in self.sensors.iter().enumerate() {
            let mut sensor = match lock_sensor(handle) {
                Ok(sensor) => sensor,
                Err(e) => {
                    tracing::warn!("Skipping sensor #{}: {}", position, e);
                    self.stats.record_failure();
                    continue;
                }
            };

            let names: Vec<String> = sensor.channels().iter().map(|c| c.column_name()).collect();
            if names.is_empty() {
                continue;
            }
            let serial = sensor.sensor_info().sensor_serial_number;

            let read = panic::catch_unwind(AssertUnwindSafe(|| sensor.read()))
                .unwrap_or_else(|payload| {
                    Err(CranioError::SensorRead(format!(
                        "driver panicked: {}",
                        panic_message(payload.as_ref())
                    )))
                });
            let values: Vec<Option<f64>> = match read {
                Ok(Some(packet)) => names
                    .iter()
                    .map(|name| packet.column(name).and_then(|v| v.first().copied().flatten()))
                    .collect(),
                Ok(None) => vec![None; names.len()],
                Err(e) => {
                    tracing::warn!("Sensor {} read failed: {}", serial, e);
                    self.stats.record_failure();
                    vec![None; names.len()]
                }
            };

            for (name, value) in names.into_iter().zip(values) {
                let name = qualified_name(&columns, name, &serial, position);
                columns.push(Column::new(name, vec![value]));
            }
        }

        if columns.is_empty() {
            return None;
        }

        match Packet::new(vec![timestamp], columns) {
            Ok(packet) => {
                self.stats
                    .record_poll(poll_start.elapsed().as_micros() as u64);
                Some(packet)
            }
            Err(e) => {
                tracing::error!("Dropping malformed poll result: {}", e);
                None
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

fn qualified_name(taken: &[Column], name: String, serial: &str, position: usize) -> String {
    let is_taken = |candidate: &str| taken.iter().any(|c| c.name == candidate);
    if !is_taken(&name) {
        return name;
    }
    let with_serial = format!("{} [{}]", name, serial);
    if !is_taken(&with_serial) {
        return with_serial;
    }
    format!("{} [{} #{}]", name, serial, position)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dummy_sensor::{DummyPattern, DummySensor};
    use crate::backend::sensor_trait::{shared, MockSensor, Sensor};
    use crate::error::CranioError;
    use crate::types::{ChannelInfo, SensorInfo};

    fn sensor_with(serial: &str, channels: &[(&str, &str)], value: f64) -> SensorHandle {
        let mut sensor = DummySensor::new()
            .with_info(SensorInfo::new(serial, 3))
            .with_default_pattern(DummyPattern::Constant(value));
        for (name, unit) in channels {
            sensor.register_channel(ChannelInfo::new(*name, *unit)).unwrap();
        }
        shared(sensor)
    }

    #[test]
    fn test_empty_producer_reads_none() {
        let mut producer = Producer::new();
        assert!(producer.read_all().is_none());

        producer.register_sensor(sensor_with("A", &[], 0.0));
        assert!(producer.read_all().is_none());
    }

    #[test]
    fn test_disjoint_channels_are_merged() {
        let mut producer = Producer::new();
        producer.register_sensor(sensor_with("A", &[("torque", "Nm"), ("angle", "deg")], 1.0));
        producer.register_sensor(sensor_with("B", &[("force", "N")], 2.0));

        for _ in 0..5 {
            let packet = producer.read_all().unwrap();
            assert_eq!(packet.len(), 1);
            assert_eq!(packet.columns().len(), 3);
            assert_eq!(packet.column("force (N)").unwrap(), &[Some(2.0)]);
        }
        assert_eq!(producer.stats().successful_polls, 5);
    }

    #[test]
    fn test_colliding_columns_are_qualified() {
        let mut producer = Producer::new();
        producer.register_sensor(sensor_with("A", &[("torque", "Nm")], 1.0));
        producer.register_sensor(sensor_with("B", &[("torque", "Nm")], 2.0));
        producer.register_sensor(sensor_with("B", &[("torque", "Nm")], 3.0));

        let packet = producer.read_all().unwrap();
        assert_eq!(
            packet.channels(),
            vec!["torque (Nm)", "torque (Nm) [B]", "torque (Nm) [B #2]"]
        );
        assert_eq!(packet.column("torque (Nm) [B #2]").unwrap(), &[Some(3.0)]);
    }

    #[test]
    fn test_register_is_idempotent_and_unregister_unknown_is_noop() {
        let mut producer = Producer::new();
        let sensor = sensor_with("A", &[("torque", "Nm")], 1.0);
        let other = sensor_with("B", &[("torque", "Nm")], 1.0);

        assert!(producer.register_sensor(sensor.clone()));
        assert!(!producer.register_sensor(sensor.clone()));
        assert_eq!(producer.sensor_count(), 1);

        assert!(!producer.unregister_sensor(&other));
        assert!(producer.unregister_sensor(&sensor));
        assert_eq!(producer.sensor_count(), 0);
    }

    #[test]
    fn test_failing_sensor_is_omitted_but_poll_continues() {
        let mut failing = MockSensor::new();
        failing
            .expect_channels()
            .returning(|| vec![ChannelInfo::new("torque", "Nm")]);
        failing
            .expect_sensor_info()
            .returning(|| SensorInfo::new("BROKEN", 3));
        failing
            .expect_read()
            .returning(|| Err(CranioError::SensorRead("timeout".to_string())));

        let mut producer = Producer::new();
        producer.register_sensor(shared(failing));
        producer.register_sensor(sensor_with("OK", &[("force", "N")], 4.0));

        let packet = producer.read_all().unwrap();
        assert_eq!(packet.column("torque (Nm)").unwrap(), &[None]);
        assert_eq!(packet.column("force (N)").unwrap(), &[Some(4.0)]);
        assert_eq!(producer.stats().failed_sensor_reads, 1);
    }

    /// Driver that panics on every read
    struct PanickingSensor;

    impl Sensor for PanickingSensor {
        fn self_test(&mut self) -> bool {
            true
        }

        fn register_channel(&mut self, info: ChannelInfo) -> crate::error::Result<()> {
            Err(CranioError::DuplicateChannel(info.to_string()))
        }

        fn unregister_channel(&mut self, _info: &ChannelInfo) -> bool {
            false
        }

        fn channels(&self) -> Vec<ChannelInfo> {
            vec![ChannelInfo::new("torque", "Nm")]
        }

        fn read(&mut self) -> crate::error::Result<Option<Packet>> {
            panic!("driver bug")
        }

        fn sensor_info(&self) -> SensorInfo {
            SensorInfo::new("PANIC", 3)
        }
    }

    #[test]
    fn test_panicking_sensor_counts_as_failed_read() {
        let panicking = shared(PanickingSensor);
        let mut producer = Producer::new();
        producer.register_sensor(panicking.clone());
        producer.register_sensor(sensor_with("OK", &[("force", "N")], 4.0));

        for _ in 0..2 {
            let packet = producer.read_all().unwrap();
            assert_eq!(packet.column("torque (Nm)").unwrap(), &[None]);
            assert_eq!(packet.column("force (N)").unwrap(), &[Some(4.0)]);
        }
        assert_eq!(producer.stats().failed_sensor_reads, 2);
        assert!(!panicking.is_poisoned());
    }

    #[test]
    fn test_index_is_non_decreasing() {
        let mut producer = Producer::new();
        producer.register_sensor(sensor_with("A", &[("torque", "Nm")], 1.0));
        let first = producer.read_all().unwrap();
        let second = producer.read_all().unwrap();
        assert!(second.index()[0] >= first.index()[0]);
    }
}
