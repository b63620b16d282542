//! Performance monitor: named duration/counter samples in a `DashMap`.
//!
//! Per-name identity, cheap `Clone`, no interior locking beyond the concurrent map
//! itself.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use dashmap::DashMap;

/// Running statistics for one named duration sample.
#[derive(Debug, Default)]
pub struct DurationStats {
    pub count: AtomicU64,
    pub total_ms: AtomicU64,
    pub max_ms: AtomicU64,
}

impl DurationStats {
    fn record(&self, ms: f64) {
        let ms_bits = ms.max(0.0) as u64;
        self.count.fetch_add(1, Ordering::Relaxed);
        self.total_ms.fetch_add(ms_bits, Ordering::Relaxed);
        self.max_ms.fetch_max(ms_bits, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn mean_ms(&self) -> f64 {
        let n = self.count();
        if n == 0 {
            0.0
        } else {
            self.total_ms.load(Ordering::Relaxed) as f64 / n as f64
        }
    }
}

/// Process-wide performance monitor, cheap to clone (wraps two `Arc`-backed maps).
#[derive(Debug, Clone, Default)]
pub struct PerfMonitor {
    durations: std::sync::Arc<DashMap<String, DurationStats>>,
    counters: std::sync::Arc<DashMap<String, AtomicU64>>,
}

/// Starts a duration sample; call `.finish(monitor, name)` (or drop and read
/// `elapsed()`) to record it.
pub struct Timer {
    started: Instant,
}

impl Timer {
    pub fn start() -> Self {
        Self { started: Instant::now() }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.started.elapsed().as_secs_f64() * 1000.0
    }
}

impl PerfMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_duration(&self, name: &str, ms: f64) {
        self.durations.entry(name.to_string()).or_default().record(ms);
    }

    pub fn increment(&self, name: &str, delta: u64) {
        self.counters.entry(name.to_string()).or_insert_with(|| AtomicU64::new(0)).fetch_add(delta, Ordering::Relaxed);
    }

    pub fn counter(&self, name: &str) -> u64 {
        self.counters.get(name).map(|c| c.load(Ordering::Relaxed)).unwrap_or(0)
    }

    pub fn duration_stats(&self, name: &str) -> Option<(u64, f64)> {
        self.durations.get(name).map(|s| (s.count(), s.mean_ms()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_duration_samples() {
        let m = PerfMonitor::new();
        m.record_duration("poll.temp", 5.0);
        m.record_duration("poll.temp", 15.0);
        let (count, mean) = m.duration_stats("poll.temp").unwrap();
        assert_eq!(count, 2);
        assert_eq!(mean, 10.0);
    }

    #[test]
    fn counters_accumulate() {
        let m = PerfMonitor::new();
        m.increment("reconnect.attempt", 1);
        m.increment("reconnect.attempt", 1);
        assert_eq!(m.counter("reconnect.attempt"), 2);
    }

    #[test]
    fn unknown_name_reads_as_zero() {
        let m = PerfMonitor::new();
        assert_eq!(m.counter("missing"), 0);
        assert!(m.duration_stats("missing").is_none());
    }
}
