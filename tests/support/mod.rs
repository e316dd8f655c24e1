//! Shared helpers for integration tests

#![allow(dead_code)]

use infergate::retry::RetryPolicy;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub fn fixtures_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests").join("fixtures")
}

pub fn read_fixture(relative: &str) -> String {
    std::fs::read_to_string(fixtures_dir().join(relative)).expect("read fixture")
}

/// Retry policy with millisecond delays so tests stay fast.
pub fn fast_retry(retries: u32) -> RetryPolicy {
    RetryPolicy::with_retries(retries)
        .with_initial_delay(Duration::from_millis(1))
        .with_max_delay(Duration::from_millis(5))
        .with_jitter(false)
}
