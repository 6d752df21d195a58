use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::config::{LoadTestConfig, ValidationRule};
use super::stats::TestStats;

/// Transport-level outcome of one dispatched call. `Success` means an HTTP
/// response was received, whatever its status; validation is tracked
/// separately and never turns a response into an `Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Error,
}

/// One rule's pass/fail verdict against one response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleVerdict {
    pub rule: ValidationRule,
    pub passed: bool,
    pub message: String,
}

/// Outcome of a single dispatched request. `request_num` is the 1-based
/// sequence number assigned at dispatch time (batch-major), stable regardless
/// of completion order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestResult {
    pub request_num: u32,
    pub status: Outcome,
    /// Seconds, measured from just before the call through response body read.
    pub response_time: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub request_headers: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_headers: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_body: Option<String>,
    pub validation_results: Vec<RuleVerdict>,
    pub validation_passed: bool,
}

/// Session lifecycle. Transitions are monotonic: `pending → running →
/// {completed | cancelled | failed}`, and a terminal session never leaves
/// its terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Pending,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Cancelled | SessionState::Failed
        )
    }
}

/// The mutable record of one load-test run, owned by the engine until a
/// terminal state is reached and queryable afterwards. Results are stored in
/// completion order; sequence numbers record dispatch order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSession {
    pub session_id: Uuid,
    pub config: LoadTestConfig,
    pub status: SessionState,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub results: Vec<RequestResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<TestStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
