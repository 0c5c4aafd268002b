//! Decision metrics for engine observability
//!
//! Recording is synchronous and cheap: counters are atomics and latency
//! samples live in a bounded ring. Percentiles are computed on snapshot.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Maximum latency samples kept for percentile calculation
const MAX_SAMPLES: usize = 10_000;

/// Point-in-time metrics snapshot
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineMetrics {
    /// Completed `check` calls
    pub total_checks: u64,

    /// Requests rejected before evaluation
    pub invalid_requests: u64,

    /// Per-action allow results
    pub allowed_actions: u64,

    /// Per-action deny results, including default denials
    pub denied_actions: u64,

    /// Denials with no matching policy or rule
    pub default_denials: u64,

    /// Latency percentiles over recent checks
    pub latency_p50_us: f64,
    pub latency_p90_us: f64,
    pub latency_p99_us: f64,

    /// Average latency over recent checks
    pub avg_latency_us: f64,
}

impl EngineMetrics {
    /// Fraction of evaluated actions that were allowed
    pub fn allow_rate(&self) -> f64 {
        let total = self.allowed_actions + self.denied_actions;
        if total == 0 {
            0.0
        } else {
            self.allowed_actions as f64 / total as f64
        }
    }
}

/// Metrics collector shared by all `check` callers
#[derive(Debug, Default)]
pub struct MetricsCollector {
    total_checks: AtomicU64,
    invalid_requests: AtomicU64,
    allowed_actions: AtomicU64,
    denied_actions: AtomicU64,
    default_denials: AtomicU64,
    latency_samples: Mutex<VecDeque<f64>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of one evaluated action
    pub fn record_action(&self, allowed: bool, default_deny: bool) {
        if allowed {
            self.allowed_actions.fetch_add(1, Ordering::Relaxed);
        } else {
            self.denied_actions.fetch_add(1, Ordering::Relaxed);
            if default_deny {
                self.default_denials.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Record a completed check and its latency
    pub fn record_check(&self, latency: Duration) {
        self.total_checks.fetch_add(1, Ordering::Relaxed);

        let mut samples = self.latency_samples.lock();
        if samples.len() == MAX_SAMPLES {
            samples.pop_front();
        }
        samples.push_back(latency.as_secs_f64() * 1_000_000.0);
    }

    pub fn record_invalid_request(&self) {
        self.invalid_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> EngineMetrics {
        let mut sorted: Vec<f64> = self.latency_samples.lock().iter().copied().collect();
        sorted.sort_by(f64::total_cmp);

        let avg = if sorted.is_empty() {
            0.0
        } else {
            sorted.iter().sum::<f64>() / sorted.len() as f64
        };

        EngineMetrics {
            total_checks: self.total_checks.load(Ordering::Relaxed),
            invalid_requests: self.invalid_requests.load(Ordering::Relaxed),
            allowed_actions: self.allowed_actions.load(Ordering::Relaxed),
            denied_actions: self.denied_actions.load(Ordering::Relaxed),
            default_denials: self.default_denials.load(Ordering::Relaxed),
            latency_p50_us: percentile(&sorted, 0.50),
            latency_p90_us: percentile(&sorted, 0.90),
            latency_p99_us: percentile(&sorted, 0.99),
            avg_latency_us: avg,
        }
    }

    /// Reset all metrics
    pub fn reset(&self) {
        self.total_checks.store(0, Ordering::Relaxed);
        self.invalid_requests.store(0, Ordering::Relaxed);
        self.allowed_actions.store(0, Ordering::Relaxed);
        self.denied_actions.store(0, Ordering::Relaxed);
        self.default_denials.store(0, Ordering::Relaxed);
        self.latency_samples.lock().clear();
    }
}

/// Calculate percentile from sorted data
fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }

    let idx = ((sorted.len() as f64) * p) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = MetricsCollector::new().snapshot();
        assert_eq!(metrics.total_checks, 0);
        assert_eq!(metrics.avg_latency_us, 0.0);
    }

    #[test]
    fn test_record_actions() {
        let collector = MetricsCollector::new();

        collector.record_action(true, false);
        collector.record_action(false, true);
        collector.record_action(false, false);
        collector.record_action(true, false);

        let metrics = collector.snapshot();
        assert_eq!(metrics.allowed_actions, 2);
        assert_eq!(metrics.denied_actions, 2);
        assert_eq!(metrics.default_denials, 1);
        assert!((metrics.allow_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_record_latency() {
        let collector = MetricsCollector::new();

        collector.record_check(Duration::from_micros(5));
        collector.record_check(Duration::from_micros(10));
        collector.record_check(Duration::from_micros(15));

        let metrics = collector.snapshot();
        assert_eq!(metrics.total_checks, 3);
        assert!((metrics.avg_latency_us - 10.0).abs() < 0.5);
        assert!((metrics.latency_p50_us - 10.0).abs() < 0.5);
        assert!((metrics.latency_p99_us - 15.0).abs() < 0.5);
    }

    #[test]
    fn test_sample_ring_is_bounded() {
        let collector = MetricsCollector::new();
        for _ in 0..(MAX_SAMPLES + 10) {
            collector.record_check(Duration::from_micros(1));
        }
        assert_eq!(collector.latency_samples.lock().len(), MAX_SAMPLES);
        assert_eq!(collector.snapshot().total_checks, (MAX_SAMPLES + 10) as u64);
    }

    #[test]
    fn test_reset() {
        let collector = MetricsCollector::new();

        collector.record_action(true, false);
        collector.record_invalid_request();
        collector.record_check(Duration::from_micros(3));
        collector.reset();

        assert_eq!(collector.snapshot(), EngineMetrics::default());
    }
}
