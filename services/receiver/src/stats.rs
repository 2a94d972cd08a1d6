//! Process-wide ingestion counters.
//!
//! The register is lock-free: every field is an atomic, so readers taking a
//! snapshot never stall an upload in flight and concurrent uploads never
//! observe the same sequence number.

use chrono::{DateTime, Local};
use serde::Serialize;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::info;

/// Shared counters updated by every upload attempt.
#[derive(Debug)]
pub struct StatsRegister {
    total_received: AtomicU64,
    total_errors: AtomicU64,
    last_device_timestamp: AtomicI64,
    start_time: Instant,
    started_at: DateTime<Local>,
}

/// Point-in-time copy of the register.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatsSnapshot {
    pub total_received: u64,
    pub total_errors: u64,
    pub last_device_timestamp: i64,
    pub uptime: Duration,
}

/// Body of `GET /stats`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsReport {
    pub total_received: u64,
    pub total_errors: u64,
    pub fps_average: f64,
    pub uptime_seconds: u64,
    pub last_timestamp: i64,
}

impl StatsRegister {
    pub fn new() -> Self {
        Self {
            total_received: AtomicU64::new(0),
            total_errors: AtomicU64::new(0),
            last_device_timestamp: AtomicI64::new(0),
            start_time: Instant::now(),
            started_at: Local::now(),
        }
    }

    /// Count an accepted frame and return its 1-based sequence number.
    pub fn increment_received(&self) -> u64 {
        self.total_received.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn increment_errors(&self) {
        self.total_errors.fetch_add(1, Ordering::SeqCst);
    }

    pub fn set_last_timestamp(&self, timestamp: i64) {
        self.last_device_timestamp.store(timestamp, Ordering::SeqCst);
    }

    /// Wall-clock time the register was created.
    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total_received: self.total_received.load(Ordering::SeqCst),
            total_errors: self.total_errors.load(Ordering::SeqCst),
            last_device_timestamp: self.last_device_timestamp.load(Ordering::SeqCst),
            uptime: self.start_time.elapsed(),
        }
    }
}

impl Default for StatsRegister {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsSnapshot {
    /// Whole seconds since start.
    pub fn uptime_seconds(&self) -> u64 {
        self.uptime.as_secs()
    }

    /// Mean accepted frames per second, rounded to two decimals.
    ///
    /// Zero until the first full second of uptime has elapsed.
    pub fn fps_average(&self) -> f64 {
        if self.uptime_seconds() == 0 {
            return 0.0;
        }
        let fps = self.total_received as f64 / self.uptime.as_secs_f64();
        (fps * 100.0).round() / 100.0
    }

    /// Percentage of attempts that were accepted.
    pub fn success_rate(&self) -> f64 {
        let attempts = self.total_received + self.total_errors;
        if attempts == 0 {
            return 0.0;
        }
        self.total_received as f64 / attempts as f64 * 100.0
    }

    pub fn report(&self) -> StatsReport {
        StatsReport {
            total_received: self.total_received,
            total_errors: self.total_errors,
            fps_average: self.fps_average(),
            uptime_seconds: self.uptime_seconds(),
            last_timestamp: self.last_device_timestamp,
        }
    }

    /// Emit an operator-facing summary.
    pub fn log_summary(&self) {
        info!(
            frames_received = self.total_received,
            errors = self.total_errors,
            success_rate = %format!("{:.2}%", self.success_rate()),
            fps_average = %format!("{:.2}", self.fps_average()),
            uptime_seconds = self.uptime_seconds(),
            last_device_timestamp_ms = self.last_device_timestamp,
            "Server statistics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn snapshot(received: u64, errors: u64, uptime: Duration) -> StatsSnapshot {
        StatsSnapshot {
            total_received: received,
            total_errors: errors,
            last_device_timestamp: 0,
            uptime,
        }
    }

    #[test]
    fn test_sequence_numbers_start_at_one() {
        let stats = StatsRegister::new();
        assert_eq!(stats.increment_received(), 1);
        assert_eq!(stats.increment_received(), 2);
        assert_eq!(stats.increment_received(), 3);
        assert_eq!(stats.snapshot().total_received, 3);
    }

    #[test]
    fn test_errors_and_timestamp_are_independent() {
        let stats = StatsRegister::new();
        stats.increment_errors();
        stats.increment_errors();
        stats.set_last_timestamp(123_456);

        let snap = stats.snapshot();
        assert_eq!(snap.total_errors, 2);
        assert_eq!(snap.total_received, 0);
        assert_eq!(snap.last_device_timestamp, 123_456);
    }

    #[test]
    fn test_concurrent_increments_are_unique() {
        let stats = Arc::new(StatsRegister::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let stats = stats.clone();
                std::thread::spawn(move || {
                    (0..500).map(|_| stats.increment_received()).collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        seen.sort_unstable();

        assert_eq!(seen, (1..=4000).collect::<Vec<_>>());
        assert_eq!(stats.snapshot().total_received, 4000);
    }

    #[test]
    fn test_fps_is_zero_before_first_second() {
        let snap = snapshot(25, 0, Duration::from_millis(900));
        assert_eq!(snap.uptime_seconds(), 0);
        assert_eq!(snap.fps_average(), 0.0);
    }

    #[test]
    fn test_fps_average_rounds_to_two_decimals() {
        let snap = snapshot(10, 0, Duration::from_secs(3));
        assert_eq!(snap.fps_average(), 3.33);
    }

    #[test]
    fn test_success_rate() {
        assert_eq!(snapshot(0, 0, Duration::ZERO).success_rate(), 0.0);
        assert_eq!(snapshot(3, 1, Duration::ZERO).success_rate(), 75.0);
    }

    #[test]
    fn test_report_fields() {
        let mut snap = snapshot(20, 2, Duration::from_secs(10));
        snap.last_device_timestamp = 99_000;
        let report = snap.report();

        assert_eq!(report.total_received, 20);
        assert_eq!(report.total_errors, 2);
        assert_eq!(report.fps_average, 2.0);
        assert_eq!(report.uptime_seconds, 10);
        assert_eq!(report.last_timestamp, 99_000);
    }
}
