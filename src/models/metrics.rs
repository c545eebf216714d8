use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Name of the one counter this probe feeds and thresholds reference.
pub const ERRORS_COUNTER: &str = "Errors";

/// Monotonic counter shared by every virtual user. Recording a check
/// result adds 1 for a failure and 0 for a success, so the final value
/// is the number of failed checks regardless of how often it is fed.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn add(&self, failed: bool) {
        if failed {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn count(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Default)]
pub struct Metrics {
    pub scenario: String,
    pub target_url: String,
    pub duration_secs: f64,
    pub vus: u64,

    pub total_requests: u64,
    pub successful_checks: u64,
    pub failed_checks: u64,

    pub fastest_response: f64,
    pub slowest_response: f64,
    pub median_response_time: f64,

    pub total_duration: f64,
    pub throughput: f64,

    pub timestamp: String,

    pub status_counts: HashMap<String, u64>,
}

/// Outcome of one threshold evaluated against the final counter value.
#[derive(Debug, Clone)]
pub struct ThresholdReport {
    pub counter: String,
    pub expression: String,
    pub count: u64,
    pub passed: bool,
    pub aborted_run: bool,
}

#[derive(Debug)]
pub struct RunOutcome {
    pub metrics: Metrics,
    pub thresholds: Vec<ThresholdReport>,
    pub aborted: bool,
}

impl RunOutcome {
    pub fn passed(&self) -> bool {
        self.thresholds.iter().all(|t| t.passed)
    }
}
