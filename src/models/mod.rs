pub mod config;
pub mod result;
pub mod stats;

pub use config::{BodyType, FieldValue, HttpMethod, LoadTestConfig, RuleKind, ValidationRule};
pub use result::{Outcome, RequestResult, RuleVerdict, SessionState, TestSession};
pub use stats::TestStats;
