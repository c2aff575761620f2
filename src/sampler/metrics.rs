//! Rolling throughput metrics for the polling loop

use serde::Serialize;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

const AVG_WINDOW_TICKS: usize = 10;
const RATE_WINDOW: Duration = Duration::from_secs(1);

/// Entry counts of the dispatcher-visible caches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheSizes {
    pub modules: usize,
    pub resolved_addresses: usize,
    pub values: usize,
}

/// Point-in-time view handed to callers of `metrics()`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricsSnapshot {
    pub last_tick_ms: f64,
    pub avg_tick_ms: f64,
    pub ticks_per_second: usize,
    pub skipped_ticks: u64,
    pub cache_sizes: CacheSizes,
    pub worker_count: usize,
}

/// Accumulates per-tick observations; owned behind a mutex shared between
/// the engine thread and the facade.
#[derive(Debug, Default)]
pub struct MetricsRecorder {
    durations: VecDeque<Duration>,
    completions: VecDeque<Instant>,
    last: Option<Duration>,
    skipped: u64,
    cache_sizes: CacheSizes,
    worker_count: usize,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_tick(&mut self, duration: Duration) {
        self.last = Some(duration);
        self.durations.push_back(duration);
        while self.durations.len() > AVG_WINDOW_TICKS {
            self.durations.pop_front();
        }
        let now = Instant::now();
        self.completions.push_back(now);
        while let Some(front) = self.completions.front() {
            if now.duration_since(*front) > RATE_WINDOW {
                self.completions.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn add_skipped(&mut self, count: u64) {
        self.skipped += count;
    }

    pub fn set_resources(&mut self, cache_sizes: CacheSizes, worker_count: usize) {
        self.cache_sizes = cache_sizes;
        self.worker_count = worker_count;
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let now = Instant::now();
        let ticks_per_second = self
            .completions
            .iter()
            .filter(|t| now.duration_since(**t) <= RATE_WINDOW)
            .count();
        let avg_tick_ms = if self.durations.is_empty() {
            0.0
        } else {
            self.durations
                .iter()
                .map(|d| d.as_secs_f64() * 1000.0)
                .sum::<f64>()
                / self.durations.len() as f64
        };
        MetricsSnapshot {
            last_tick_ms: self.last.map(|d| d.as_secs_f64() * 1000.0).unwrap_or(0.0),
            avg_tick_ms,
            ticks_per_second,
            skipped_ticks: self.skipped,
            cache_sizes: self.cache_sizes,
            worker_count: self.worker_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_average_over_last_ten() {
        let mut recorder = MetricsRecorder::new();
        // 12 ticks; only the last 10 count toward the average.
        for ms in 1..=12u64 {
            recorder.record_tick(Duration::from_millis(ms));
        }
        let snap = recorder.snapshot();
        assert_eq!(snap.last_tick_ms, 12.0);
        // mean of 3..=12
        assert!((snap.avg_tick_ms - 7.5).abs() < 1e-9);
    }

    #[test]
    fn test_rate_window_counts_recent_ticks() {
        let mut recorder = MetricsRecorder::new();
        for _ in 0..5 {
            recorder.record_tick(Duration::from_millis(1));
        }
        assert_eq!(recorder.snapshot().ticks_per_second, 5);
    }

    #[test]
    fn test_skipped_accumulates() {
        let mut recorder = MetricsRecorder::new();
        recorder.add_skipped(2);
        recorder.add_skipped(1);
        assert_eq!(recorder.snapshot().skipped_ticks, 3);
    }

    #[test]
    fn test_empty_snapshot() {
        let snap = MetricsRecorder::new().snapshot();
        assert_eq!(snap.last_tick_ms, 0.0);
        assert_eq!(snap.avg_tick_ms, 0.0);
        assert_eq!(snap.ticks_per_second, 0);
    }
}
