//! Shared helpers for the integration tests

#![allow(dead_code)] // Each test binary uses its own subset

pub mod builders;
pub mod mock_helpers;

use std::time::{Duration, Instant};

/// Producer interval of the timing tests, the configured default
pub fn poll_interval() -> Duration {
    Duration::from_millis(100)
}

/// Compare a persisted sample against the value that was written
pub fn assert_sample_eq(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-12,
        "sample {} differs from written value {}",
        actual,
        expected
    );
}

/// Poll `condition` every few milliseconds until it holds or `timeout` passes
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}
