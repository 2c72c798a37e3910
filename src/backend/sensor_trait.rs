//! Sensor trait for a unified acquisition interface
//!
//! This module provides the common trait for all sensor implementations,
//! enabling both the Imada hardware sensor and the software dummy sensor to
//! be polled by the same [`Producer`](crate::backend::Producer).

use crate::backend::packet::Packet;
use crate::error::{CranioError, Result};
use crate::types::{ChannelInfo, SensorInfo};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

/// Size of the rolling window for recent poll times
const RECENT_WINDOW_SIZE: usize = 100;

/// Sensor shared between the session context and at most one producer
pub type SensorHandle = Arc<Mutex<dyn Sensor>>;

/// Wrap a sensor into a shareable handle
pub fn shared<S: Sensor + 'static>(sensor: S) -> SensorHandle {
    Arc::new(Mutex::new(sensor))
}

/// Lock a sensor handle, reporting a poisoned lock as a read error
pub fn lock_sensor(handle: &SensorHandle) -> Result<MutexGuard<'_, dyn Sensor + 'static>> {
    handle
        .lock()
        .map_err(|e| CranioError::SensorRead(format!("Sensor lock poisoned: {}", e)))
}

/// Statistics for producer polls
///
/// Tracks how many polls completed, how many individual sensor reads
/// failed, and how long a poll takes.
#[derive(Debug, Clone)]
pub struct PollStats {
    /// Polls that produced a packet
    pub successful_polls: u64,
    /// Individual sensor reads that failed
    pub failed_sensor_reads: u64,
    /// Total poll time in microseconds
    pub total_poll_time_us: u64,
    pub last_poll_time_us: u64,
    pub min_poll_time_us: u64,
    pub max_poll_time_us: u64,
    /// Rolling window of recent poll times for jitter calculation
    pub recent_poll_times: VecDeque<u64>,
}

impl Default for PollStats {
    fn default() -> Self {
        Self {
            successful_polls: 0,
            failed_sensor_reads: 0,
            total_poll_time_us: 0,
            last_poll_time_us: 0,
            min_poll_time_us: u64::MAX,
            max_poll_time_us: 0,
            recent_poll_times: VecDeque::with_capacity(RECENT_WINDOW_SIZE),
        }
    }
}

impl PollStats {
    /// Average poll time in microseconds
    pub fn avg_poll_time_us(&self) -> f64 {
        if self.successful_polls == 0 {
            0.0
        } else {
            self.total_poll_time_us as f64 / self.successful_polls as f64
        }
    }

    /// Share of sensor reads that succeeded, as a percentage
    pub fn success_rate(&self) -> f64 {
        let total = self.successful_polls + self.failed_sensor_reads;
        if total == 0 {
            100.0
        } else {
            (self.successful_polls as f64 / total as f64) * 100.0
        }
    }

    /// Record a completed poll
    pub fn record_poll(&mut self, time_us: u64) {
        self.successful_polls += 1;
        self.total_poll_time_us += time_us;
        self.last_poll_time_us = time_us;
        self.min_poll_time_us = self.min_poll_time_us.min(time_us);
        self.max_poll_time_us = self.max_poll_time_us.max(time_us);

        self.recent_poll_times.push_back(time_us);
        if self.recent_poll_times.len() > RECENT_WINDOW_SIZE {
            self.recent_poll_times.pop_front();
        }
    }

    /// Record a failed sensor read
    pub fn record_failure(&mut self) {
        self.failed_sensor_reads += 1;
    }

    /// Jitter (max - min) over the recent window in microseconds
    pub fn jitter_us(&self) -> u64 {
        let min = self.recent_poll_times.iter().min().copied().unwrap_or(0);
        let max = self.recent_poll_times.iter().max().copied().unwrap_or(0);
        max.saturating_sub(min)
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Unified interface for sensors
///
/// Implementations must be `Send` so the producer thread can poll them.
/// Column names in emitted packets are the registered channels' display
/// identities, in registration order.
#[cfg_attr(test, mockall::automock)]
pub trait Sensor: Send {
    /// Health check. Never fails: any problem is reported as `false`.
    fn self_test(&mut self) -> bool;

    /// Register a channel
    ///
    /// Fails with [`CranioError::DuplicateChannel`] if the channel is
    /// already registered; the first registration stays in effect.
    fn register_channel(&mut self, info: ChannelInfo) -> Result<()>;

    /// Unregister a channel, returning whether it was registered
    fn unregister_channel(&mut self, info: &ChannelInfo) -> bool;

    /// Registered channels in registration order
    fn channels(&self) -> Vec<ChannelInfo>;

    /// Read one synchronized sample of every registered channel
    ///
    /// Returns `Ok(None)` when no channel is registered.
    fn read(&mut self) -> Result<Option<Packet>>;

    /// Identifying information and calibration
    fn sensor_info(&self) -> SensorInfo;
}
