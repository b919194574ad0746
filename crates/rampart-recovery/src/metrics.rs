//! Recovery metrics
//!
//! An in-process snapshot plus the same figures pushed through the `metrics`
//! facade. With no recorder installed the facade calls do nothing.

use rampart_core::FailureCategory;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Counter: executions started
pub const RECOVERIES_TOTAL: &str = "rampart_recoveries_total";
/// Counter: executions that recovered
pub const RECOVERIES_SUCCEEDED: &str = "rampart_recoveries_succeeded_total";
/// Counter: executions that ended in terminal failure
pub const RECOVERIES_FAILED: &str = "rampart_recoveries_failed_total";
/// Counter: individual recovery attempts
pub const RECOVERY_ATTEMPTS: &str = "rampart_recovery_attempts_total";
/// Histogram: execution duration in milliseconds
pub const RECOVERY_DURATION_MS: &str = "rampart_recovery_duration_ms";
/// Gauge: executions in flight
pub const RECOVERIES_IN_FLIGHT: &str = "rampart_recoveries_in_flight";

/// Aggregate recovery figures
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RecoveryMetrics {
    /// Executions started
    pub total_recoveries: u64,
    /// Executions that recovered
    pub successful_recoveries: u64,
    /// Executions that ended in terminal failure
    pub failed_recoveries: u64,
    /// Executions cancelled or abandoned after a clear
    pub cancelled_recoveries: u64,
    /// Attempts made across all executions
    pub total_attempts: u64,
    /// Running average duration of finished executions, in milliseconds
    pub average_duration_ms: f64,
    /// Executions currently in flight
    pub in_flight: u64,
}

impl RecoveryMetrics {
    /// Finished executions (success or terminal failure)
    #[inline]
    #[must_use]
    pub fn finished(&self) -> u64 {
        self.successful_recoveries + self.failed_recoveries
    }

    /// Share of finished executions that recovered; 1.0 when none finished
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn success_rate(&self) -> f64 {
        match self.finished() {
            0 => 1.0,
            n => self.successful_recoveries as f64 / n as f64,
        }
    }

    pub(crate) fn record_started(&mut self, category: FailureCategory) {
        self.total_recoveries += 1;
        self.in_flight += 1;
        metrics::counter!(RECOVERIES_TOTAL, "category" => category.as_str()).increment(1);
        metrics::gauge!(RECOVERIES_IN_FLIGHT).increment(1.0);
    }

    pub(crate) fn record_attempt(&mut self, category: FailureCategory) {
        self.total_attempts += 1;
        metrics::counter!(RECOVERY_ATTEMPTS, "category" => category.as_str()).increment(1);
    }

    pub(crate) fn record_success(&mut self, category: FailureCategory, elapsed: Duration) {
        self.successful_recoveries += 1;
        self.fold_duration(elapsed);
        metrics::counter!(RECOVERIES_SUCCEEDED, "category" => category.as_str()).increment(1);
        metrics::histogram!(RECOVERY_DURATION_MS, "category" => category.as_str())
            .record(duration_ms(elapsed));
    }

    pub(crate) fn record_failure(&mut self, category: FailureCategory, elapsed: Duration) {
        self.failed_recoveries += 1;
        self.fold_duration(elapsed);
        metrics::counter!(RECOVERIES_FAILED, "category" => category.as_str()).increment(1);
        metrics::histogram!(RECOVERY_DURATION_MS, "category" => category.as_str())
            .record(duration_ms(elapsed));
    }

    pub(crate) fn record_cancelled(&mut self) {
        self.cancelled_recoveries += 1;
    }

    pub(crate) fn record_finished(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
        metrics::gauge!(RECOVERIES_IN_FLIGHT).decrement(1.0);
    }

    // Weighted by the number of finished executions so far.
    fn fold_duration(&mut self, elapsed: Duration) {
        #[allow(clippy::cast_precision_loss)]
        let n = self.finished() as f64;
        self.average_duration_ms = (self.average_duration_ms * (n - 1.0) + duration_ms(elapsed)) / n;
    }
}

fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn average_is_weighted_by_finished_count() {
        let mut m = RecoveryMetrics::default();
        m.record_started(FailureCategory::Network);
        m.record_success(FailureCategory::Network, Duration::from_millis(100));
        m.record_started(FailureCategory::Network);
        m.record_failure(FailureCategory::Network, Duration::from_millis(400));
        m.record_started(FailureCategory::Network);
        m.record_success(FailureCategory::Network, Duration::from_millis(100));

        assert!((m.average_duration_ms - 200.0).abs() < 1e-9);
        assert!((m.success_rate() - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(m.in_flight, 3);
    }

    #[test]
    fn finishing_decrements_in_flight() {
        let mut m = RecoveryMetrics::default();
        m.record_started(FailureCategory::Timeout);
        m.record_finished();
        m.record_finished();
        assert_eq!(m.in_flight, 0);
        assert!((m.success_rate() - 1.0).abs() < f64::EPSILON);
    }
}
