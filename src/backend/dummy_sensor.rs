//! Software sensor for testing and demonstrations
//!
//! The dummy sensor behaves like the hardware torque sensor without any
//! device attached. Values come from a generator per channel: one of the
//! built-in [`DummyPattern`]s or any closure.
//!
//! # Data Patterns
//!
//! - [`DummyPattern::Uniform`] - Uniform random values, `[0, 1)` by default
//! - [`DummyPattern::Constant`] - Fixed value
//! - [`DummyPattern::Sine`] - Sinusoidal wave over elapsed time
//! - [`DummyPattern::Ramp`] - Incrementing value with wrap-around
//!
//! # Example
//!
//! ```ignore
//! use cranio::backend::dummy_sensor::{DummySensor, DummyPattern};
//! use cranio::types::ChannelInfo;
//!
//! let torque = ChannelInfo::new("torque", "Nm");
//! let mut sensor = DummySensor::new()
//!     .with_generator(torque.clone(), DummyPattern::Constant(0.5));
//! sensor.register_channel(torque)?;
//! let packet = sensor.read()?;
//! ```

use crate::backend::channel::ChannelRegistry;
use crate::backend::packet::Packet;
use crate::backend::sensor_trait::Sensor;
use crate::config::DEFAULT_TURNS_IN_FULL_TURN;
use crate::error::Result;
use crate::types::{ChannelInfo, SensorInfo};
use chrono::Utc;
use rand::Rng;
use std::collections::HashMap;
use std::time::Instant;

/// Serial number reported by the dummy sensor
pub const DUMMY_SERIAL_NUMBER: &str = "DUMMY";

/// Closure generating a value from the seconds elapsed since sensor creation
pub type ValueGenerator = Box<dyn FnMut(f64) -> f64 + Send>;

/// Built-in value patterns
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DummyPattern {
    /// Uniform random value in `[min, max)`
    Uniform { min: f64, max: f64 },
    /// Constant value
    Constant(f64),
    /// Sine wave with frequency (Hz), amplitude and offset
    Sine {
        frequency: f64,
        amplitude: f64,
        offset: f64,
    },
    /// Ramp that increments by `step` each read and wraps into `[min, max]`
    Ramp { step: f64, min: f64, max: f64 },
}

impl Default for DummyPattern {
    fn default() -> Self {
        DummyPattern::Uniform { min: 0.0, max: 1.0 }
    }
}

enum ChannelGenerator {
    Pattern { pattern: DummyPattern, current: f64 },
    Custom(ValueGenerator),
}

impl ChannelGenerator {
    fn from_pattern(pattern: DummyPattern) -> Self {
        let current = match pattern {
            DummyPattern::Ramp { min, step, .. } => min - step,
            _ => 0.0,
        };
        ChannelGenerator::Pattern { pattern, current }
    }

    fn generate(&mut self, elapsed_secs: f64) -> f64 {
        match self {
            ChannelGenerator::Custom(f) => f(elapsed_secs),
            ChannelGenerator::Pattern { pattern, current } => match *pattern {
                DummyPattern::Uniform { min, max } => {
                    min + rand::thread_rng().gen::<f64>() * (max - min)
                }
                DummyPattern::Constant(v) => v,
                DummyPattern::Sine {
                    frequency,
                    amplitude,
                    offset,
                } => {
                    offset
                        + amplitude
                            * (2.0 * std::f64::consts::PI * frequency * elapsed_secs).sin()
                }
                DummyPattern::Ramp { step, min, max } => {
                    *current += step;
                    if *current > max {
                        *current = min;
                    } else if *current < min {
                        *current = max;
                    }
                    *current
                }
            },
        }
    }
}

/// Software sensor
pub struct DummySensor {
    info: SensorInfo,
    channels: ChannelRegistry,
    generators: HashMap<ChannelInfo, ChannelGenerator>,
    default_pattern: DummyPattern,
    started: Instant,
}

impl DummySensor {
    /// Create a dummy sensor with no channels
    pub fn new() -> Self {
        Self {
            info: SensorInfo::new(DUMMY_SERIAL_NUMBER, DEFAULT_TURNS_IN_FULL_TURN),
            channels: ChannelRegistry::new(),
            generators: HashMap::new(),
            default_pattern: DummyPattern::default(),
            started: Instant::now(),
        }
    }

    /// Override the reported sensor info
    pub fn with_info(mut self, info: SensorInfo) -> Self {
        self.info = info;
        self
    }

    /// Pattern used by channels without their own generator
    pub fn with_default_pattern(mut self, pattern: DummyPattern) -> Self {
        self.default_pattern = pattern;
        self
    }

    /// Use a built-in pattern for one channel
    pub fn with_generator(mut self, channel: ChannelInfo, pattern: DummyPattern) -> Self {
        self.generators
            .insert(channel, ChannelGenerator::from_pattern(pattern));
        self
    }

    /// Use a closure for one channel
    pub fn with_custom_generator<F>(mut self, channel: ChannelInfo, generator: F) -> Self
    where
        F: FnMut(f64) -> f64 + Send + 'static,
    {
        self.generators
            .insert(channel, ChannelGenerator::Custom(Box::new(generator)));
        self
    }
}

impl Default for DummySensor {
    fn default() -> Self {
        Self::new()
    }
}

impl Sensor for DummySensor {
    fn self_test(&mut self) -> bool {
        true
    }

    fn register_channel(&mut self, info: ChannelInfo) -> Result<()> {
        self.channels.register(info.clone())?;
        let pattern = self.default_pattern;
        self.generators
            .entry(info)
            .or_insert_with(|| ChannelGenerator::from_pattern(pattern));
        Ok(())
    }

    fn unregister_channel(&mut self, info: &ChannelInfo) -> bool {
        self.channels.unregister(info)
    }

    fn channels(&self) -> Vec<ChannelInfo> {
        self.channels.to_vec()
    }

    fn read(&mut self) -> Result<Option<Packet>> {
        if self.channels.is_empty() {
            return Ok(None);
        }

        let timestamp = Utc::now();
        let elapsed = self.started.elapsed().as_secs_f64();
        let default_pattern = self.default_pattern;
        let mut values = Vec::with_capacity(self.channels.len());
        for channel in self.channels.iter() {
            let generator = self
                .generators
                .entry(channel.clone())
                .or_insert_with(|| ChannelGenerator::from_pattern(default_pattern));
            values.push((channel.column_name(), Some(generator.generate(elapsed))));
        }

        Packet::single(timestamp, values).map(Some)
    }

    fn sensor_info(&self) -> SensorInfo {
        self.info.clone()
    }
}

/// Dummy sensor with a `torque (Nm)` channel
pub fn create_dummy_sensor(turns_in_full_turn: u32) -> Result<DummySensor> {
    let mut sensor = DummySensor::new()
        .with_info(SensorInfo::new(DUMMY_SERIAL_NUMBER, turns_in_full_turn));
    sensor.register_channel(crate::backend::torque_channel())?;
    tracing::info!("Created dummy sensor {}", DUMMY_SERIAL_NUMBER);
    Ok(sensor)
}
