//! Default configuration values

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;
pub const DEFAULT_LIVENESS_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_WORKER_CAP: usize = 6;
pub const DEFAULT_MIN_PER_WORKER: usize = 10;
pub const DEFAULT_WORKER_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_LOG_LEVEL: &str = "info";

pub(super) fn poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

pub(super) fn liveness_interval_ms() -> u64 {
    DEFAULT_LIVENESS_INTERVAL_MS
}

pub(super) fn worker_cap() -> usize {
    DEFAULT_WORKER_CAP
}

pub(super) fn min_per_worker() -> usize {
    DEFAULT_MIN_PER_WORKER
}

pub(super) fn worker_timeout_ms() -> u64 {
    DEFAULT_WORKER_TIMEOUT_MS
}

pub(super) fn log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
