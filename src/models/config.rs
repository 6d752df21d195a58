use std::collections::HashMap;

use hyper::header::{HeaderName, HeaderValue};
use hyper::Method;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ConfigError;

/// A validated load test definition. Immutable for the duration of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadTestConfig {
    pub base_url: String,

    #[serde(default = "default_method")]
    pub http_method: HttpMethod,

    #[serde(default)]
    pub headers: HashMap<String, String>,

    #[serde(default)]
    pub body_type: BodyType,

    #[serde(default)]
    pub request_body: HashMap<String, FieldValue>,

    #[serde(default)]
    pub raw_body: Option<String>,

    #[serde(default = "default_concurrent_calls")]
    pub concurrent_calls: u32,

    /// Omitted or `0` means exactly one batch.
    #[serde(default)]
    pub sequential_batches: Option<u32>,

    #[serde(default)]
    pub validation_rules: Vec<ValidationRule>,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    #[serde(default = "default_true")]
    pub follow_redirects: bool,

    #[serde(default)]
    pub verify_ssl: bool,
}

fn default_method() -> HttpMethod {
    HttpMethod::POST
}

fn default_concurrent_calls() -> u32 {
    1
}

fn default_timeout() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

impl LoadTestConfig {
    /// Checks every bound the engine relies on. Runs synchronously before a
    /// session is created; the engine itself assumes a validated config.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match Url::parse(&self.base_url) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
            _ => return Err(ConfigError::InvalidBaseUrl(self.base_url.clone())),
        }

        if self.concurrent_calls < 1 || self.concurrent_calls > 1000 {
            return Err(ConfigError::ConcurrentCallsOutOfRange(self.concurrent_calls));
        }

        if let Some(batches) = self.sequential_batches {
            if batches > 100 {
                return Err(ConfigError::SequentialBatchesOutOfRange(batches));
            }
        }

        if self.timeout < 1 || self.timeout > 300 {
            return Err(ConfigError::TimeoutOutOfRange(self.timeout));
        }

        for (name, value) in &self.headers {
            if HeaderName::from_bytes(name.as_bytes()).is_err() {
                return Err(ConfigError::InvalidHeaderName(name.clone()));
            }
            if HeaderValue::from_str(value).is_err() {
                return Err(ConfigError::InvalidHeaderValue(name.clone()));
            }
        }

        Ok(())
    }

    /// Number of sequential batches the run will execute, never zero.
    pub fn batches(&self) -> u32 {
        self.sequential_batches.map_or(1, |b| b.max(1))
    }

    pub fn planned_total(&self) -> u64 {
        u64::from(self.concurrent_calls) * u64::from(self.batches())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    GET,
    POST,
    PUT,
    DELETE,
    PATCH,
    HEAD,
    OPTIONS,
}

impl HttpMethod {
    pub fn as_method(self) -> Method {
        match self {
            HttpMethod::GET => Method::GET,
            HttpMethod::POST => Method::POST,
            HttpMethod::PUT => Method::PUT,
            HttpMethod::DELETE => Method::DELETE,
            HttpMethod::PATCH => Method::PATCH,
            HttpMethod::HEAD => Method::HEAD,
            HttpMethod::OPTIONS => Method::OPTIONS,
        }
    }

    /// Methods that carry a request body.
    pub fn has_body(self) -> bool {
        matches!(self, HttpMethod::POST | HttpMethod::PUT | HttpMethod::PATCH)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyType {
    #[default]
    Json,
    Form,
    Raw,
    None,
}

/// One value in the structured request body. A JSON array of strings on the
/// wire means "pick one uniformly at random per dispatched request"; any
/// other JSON value is sent literally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    RandomChoice(Vec<String>),
    Literal(serde_json::Value),
}

/// A declarative check applied to one response. Stateless; the closed kind
/// set is dispatched with a single exhaustive match in `validation`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRule {
    #[serde(rename = "type")]
    pub kind: RuleKind,

    pub value: serde_json::Value,

    /// Dot-separated key path, used only by `json_path`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    Exists,
    NotExists,
    StatusCode,
    // older clients still send "regex_match"
    #[serde(alias = "regex_match")]
    Regex,
    JsonPath,
}
