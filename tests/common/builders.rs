//! Test data builders for creating test objects

use cranio::backend::{DummyPattern, DummySensor, Sensor};
use cranio::config::AppConfig;
use cranio::types::{ChannelInfo, SensorInfo};
use std::time::Duration;

/// Builder for dummy sensors with fixed channels
pub struct SensorBuilder {
    serial: String,
    turns_in_full_turn: u32,
    channels: Vec<ChannelInfo>,
    pattern: DummyPattern,
    read_delay: Option<Duration>,
}

impl SensorBuilder {
    pub fn new(serial: &str) -> Self {
        Self {
            serial: serial.to_string(),
            turns_in_full_turn: 3,
            channels: Vec::new(),
            pattern: DummyPattern::default(),
            read_delay: None,
        }
    }

    pub fn channel(mut self, name: &str, unit: &str) -> Self {
        self.channels.push(ChannelInfo::new(name, unit));
        self
    }

    pub fn constant(mut self, value: f64) -> Self {
        self.pattern = DummyPattern::Constant(value);
        self
    }

    pub fn turns(mut self, turns_in_full_turn: u32) -> Self {
        self.turns_in_full_turn = turns_in_full_turn;
        self
    }

    /// Make every read block for `delay`, like a slow serial device
    pub fn read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = Some(delay);
        self
    }

    pub fn build(self) -> DummySensor {
        let mut sensor = DummySensor::new()
            .with_info(SensorInfo::new(self.serial, self.turns_in_full_turn))
            .with_default_pattern(self.pattern);
        if let Some(delay) = self.read_delay {
            let value = match self.pattern {
                DummyPattern::Constant(value) => value,
                _ => 1.0,
            };
            for channel in &self.channels {
                sensor = sensor.with_custom_generator(channel.clone(), move |_| {
                    std::thread::sleep(delay);
                    value
                });
            }
        }
        for channel in self.channels {
            sensor
                .register_channel(channel)
                .expect("builder channels are unique");
        }
        sensor
    }
}

/// Builder for application configs used by session tests
pub struct ConfigBuilder {
    config: AppConfig,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
        }
    }

    pub fn dummy_sensor(mut self, enabled: bool) -> Self {
        self.config.sensor.enable_dummy_sensor = enabled;
        self
    }

    pub fn operator(mut self, operator: &str) -> Self {
        self.config.session.operator = operator.to_string();
        self
    }

    pub fn build(self) -> AppConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sensor_builder() {
        let sensor = SensorBuilder::new("S1")
            .channel("torque", "Nm")
            .channel("angle", "deg")
            .build();

        assert_eq!(sensor.channels().len(), 2);
        assert_eq!(sensor.sensor_info().sensor_serial_number, "S1");
    }

    #[test]
    fn test_sensor_builder_read_delay() {
        let mut sensor = SensorBuilder::new("SLOW")
            .channel("torque", "Nm")
            .constant(2.0)
            .read_delay(Duration::from_millis(20))
            .build();

        let started = std::time::Instant::now();
        let packet = sensor.read().unwrap().unwrap();
        assert!(started.elapsed() >= Duration::from_millis(20));
        assert_eq!(packet.column("torque (Nm)").unwrap(), &[Some(2.0)]);
    }
}
