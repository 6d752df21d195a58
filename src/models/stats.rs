use serde::{Deserialize, Serialize};

use super::result::{Outcome, RequestResult};

/// Summary statistics over a session's result sequence. Always derived from
/// the results plus elapsed wall-clock time, never persisted independently;
/// recomputing on the same inputs yields the same value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestStats {
    pub total_requests: usize,
    pub successful_requests: usize,
    pub failed_requests: usize,
    pub validation_failures: usize,
    /// Percentage in [0, 100].
    pub success_rate: f64,
    /// Seconds.
    pub avg_response_time: f64,
    pub min_response_time: f64,
    pub max_response_time: f64,
    pub requests_per_second: f64,
    /// Elapsed wall-clock seconds since the run started.
    pub total_test_duration: f64,
}

impl TestStats {
    /// Pure function of the result sequence and elapsed time. Empty input
    /// yields all-zero rates rather than dividing by zero.
    pub fn compute(results: &[RequestResult], elapsed_secs: f64) -> Self {
        let total = results.len();
        let successful = results
            .iter()
            .filter(|r| r.status == Outcome::Success)
            .count();
        let failed = total - successful;
        let validation_failures = results.iter().filter(|r| !r.validation_passed).count();

        let (sum, min, max) = results.iter().fold((0.0, f64::MAX, 0.0f64), |acc, r| {
            (
                acc.0 + r.response_time,
                acc.1.min(r.response_time),
                acc.2.max(r.response_time),
            )
        });

        TestStats {
            total_requests: total,
            successful_requests: successful,
            failed_requests: failed,
            validation_failures,
            success_rate: if total > 0 {
                successful as f64 / total as f64 * 100.0
            } else {
                0.0
            },
            avg_response_time: if total > 0 { sum / total as f64 } else { 0.0 },
            min_response_time: if total > 0 { min } else { 0.0 },
            max_response_time: max,
            requests_per_second: if elapsed_secs > 0.0 {
                total as f64 / elapsed_secs
            } else {
                0.0
            },
            total_test_duration: elapsed_secs,
        }
    }
}
