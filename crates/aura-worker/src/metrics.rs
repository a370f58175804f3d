//! Job metrics.
//!
//! Recorded through the `metrics` facade; the API binary installs the
//! Prometheus recorder that exports them.

use metrics::{counter, histogram};

/// Metric names as constants for consistency.
pub mod names {
    pub const JOBS_TOTAL: &str = "aura_jobs_total";
    pub const JOB_DURATION_SECONDS: &str = "aura_job_duration_seconds";
    pub const FRAMES_PROCESSED_TOTAL: &str = "aura_frames_processed_total";
    pub const PROGRESS_DROPPED_TOTAL: &str = "aura_progress_dropped_total";
}

/// Record a finished job. `outcome` is the terminal state name.
pub fn record_job(kind: &str, outcome: &str, duration_secs: f64) {
    let labels = [("kind", kind.to_string()), ("outcome", outcome.to_string())];
    counter!(names::JOBS_TOTAL, &labels).increment(1);
    histogram!(names::JOB_DURATION_SECONDS, &labels).record(duration_secs);
}

pub fn record_frame_processed() {
    counter!(names::FRAMES_PROCESSED_TOTAL).increment(1);
}

pub fn record_progress_dropped() {
    counter!(names::PROGRESS_DROPPED_TOTAL).increment(1);
}
