//! One HTTP exchange. The executor here performs exactly one network call per
//! [`RequestSpec`] (plus redirect hops when enabled) and never lets a
//! transport failure escape: DNS, connect, TLS, timeout, and malformed
//! responses all come back as an [`Exchange`] with an error message and no
//! status code.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use hyper::client::HttpConnector;
use hyper::header::{CONTENT_TYPE, LOCATION, USER_AGENT};
use hyper::{Body as HyperBody, Client, Method, Request, StatusCode, Uri};
use hyper_tls::HttpsConnector;
use rand::seq::SliceRandom;
use rand::Rng;
use tokio::time::timeout;
use url::form_urlencoded;
use url::Url;

use crate::error::EngineError;
use crate::models::{BodyType, FieldValue, LoadTestConfig};

pub type HttpsClient = Client<HttpsConnector<HttpConnector>>;

const MAX_REDIRECT_HOPS: usize = 10;

/// Builds the shared client for a run. TLS verification follows the config:
/// with `verify_ssl` off the connector accepts invalid certificates and
/// hostnames, as a development-facing load tool must.
pub fn build_client(verify_ssl: bool) -> Result<HttpsClient, EngineError> {
    let tls = native_tls::TlsConnector::builder()
        .danger_accept_invalid_certs(!verify_ssl)
        .danger_accept_invalid_hostnames(!verify_ssl)
        .build()
        .map_err(|e| EngineError::ClientBuild(e.to_string()))?;

    let mut http = HttpConnector::new();
    http.enforce_http(false);

    let https = HttpsConnector::from((http, tokio_native_tls::TlsConnector::from(tls)));
    Ok(Client::builder().build::<_, HyperBody>(https))
}

/// A fully materialized single request: URL and body already resolved, ready
/// to send without touching the config again.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub url: Url,
    pub method: Method,
    pub headers: HashMap<String, String>,
    pub body: Option<String>,
    pub timeout: Duration,
    pub follow_redirects: bool,
}

/// Raw outcome of one exchange, before validation. Exactly one of
/// `status_code` and `error_message` is populated.
#[derive(Debug, Clone)]
pub struct Exchange {
    pub status_code: Option<u16>,
    pub response_headers: Option<HashMap<String, String>>,
    pub response_body: Option<String>,
    pub error_message: Option<String>,
    /// Seconds, measured through the end of the body read.
    pub response_time: f64,
}

pub async fn execute(client: &HttpsClient, spec: &RequestSpec) -> Exchange {
    let start = Instant::now();
    let outcome = timeout(spec.timeout, exchange(client, spec)).await;
    let response_time = start.elapsed().as_secs_f64();

    match outcome {
        Ok(Ok((status, headers, body))) => Exchange {
            status_code: Some(status.as_u16()),
            response_headers: Some(headers),
            response_body: Some(body),
            error_message: None,
            response_time,
        },
        Ok(Err(message)) => Exchange {
            status_code: None,
            response_headers: None,
            response_body: None,
            error_message: Some(message),
            response_time,
        },
        Err(_) => Exchange {
            status_code: None,
            response_headers: None,
            response_body: None,
            error_message: Some(format!(
                "Request timed out after {}s",
                spec.timeout.as_secs()
            )),
            response_time,
        },
    }
}

/// Sends the request and reads the full response body, following redirects
/// manually when enabled (hyper itself never follows them).
async fn exchange(
    client: &HttpsClient,
    spec: &RequestSpec,
) -> Result<(StatusCode, HashMap<String, String>, String), String> {
    let mut url = spec.url.clone();
    let mut method = spec.method.clone();
    let mut body = spec.body.clone();

    for _ in 0..=MAX_REDIRECT_HOPS {
        let response = send_once(client, &url, &method, &spec.headers, body.as_deref()).await?;

        if spec.follow_redirects && response.status().is_redirection() {
            if let Some(location) = response.headers().get(LOCATION) {
                let location = location
                    .to_str()
                    .map_err(|_| "Redirect Location header is not valid text".to_string())?;
                url = url
                    .join(location)
                    .map_err(|e| format!("Cannot resolve redirect target '{location}': {e}"))?;

                // 303 always becomes GET; 301/302 conventionally downgrade
                // everything but GET/HEAD and drop the body.
                let status = response.status();
                if status == StatusCode::SEE_OTHER
                    || (matches!(status, StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND)
                        && method != Method::GET
                        && method != Method::HEAD)
                {
                    method = Method::GET;
                    body = None;
                }
                continue;
            }
        }

        let status = response.status();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let bytes = hyper::body::to_bytes(response.into_body())
            .await
            .map_err(|e| format!("Error while reading response body: {e}"))?;
        let text = String::from_utf8_lossy(&bytes).into_owned();
        return Ok((status, headers, text));
    }

    Err(format!("Stopped after {MAX_REDIRECT_HOPS} redirects"))
}

async fn send_once(
    client: &HttpsClient,
    url: &Url,
    method: &Method,
    headers: &HashMap<String, String>,
    body: Option<&str>,
) -> Result<hyper::Response<HyperBody>, String> {
    let uri: Uri = url
        .as_str()
        .parse()
        .map_err(|e| format!("Invalid request URL '{url}': {e}"))?;

    let mut builder = Request::builder().method(method.clone()).uri(uri);
    for (name, value) in headers {
        builder = builder.header(name.as_str(), value.as_str());
    }

    let body = match body {
        Some(text) => HyperBody::from(text.to_owned()),
        None => HyperBody::empty(),
    };
    let request = builder
        .body(body)
        .map_err(|e| format!("Failed to build request: {e}"))?;

    client.request(request).await.map_err(describe_error)
}

fn describe_error(e: hyper::Error) -> String {
    if e.is_connect() {
        format!("Connection refused or host unreachable ({e})")
    } else if e.is_timeout() {
        "Timeout".to_string()
    } else if e.is_closed() || e.is_incomplete_message() {
        "Connection closed unexpectedly".to_string()
    } else if e.is_parse() {
        format!("Malformed response ({e})")
    } else {
        format!("Network error: {e}")
    }
}

/// Headers actually sent with every request of a run: the service's
/// User-Agent, the operator's custom headers on top, and a Content-Type
/// inferred from the body type when the method carries a body and the
/// operator did not set one.
pub fn request_headers(config: &LoadTestConfig) -> HashMap<String, String> {
    let mut headers = HashMap::new();
    headers.insert(
        USER_AGENT.to_string(),
        format!("volley/{}", env!("CARGO_PKG_VERSION")),
    );
    for (name, value) in &config.headers {
        headers.insert(name.clone(), value.clone());
    }

    if config.http_method.has_body() {
        let has_content_type = headers
            .keys()
            .any(|k| k.eq_ignore_ascii_case(CONTENT_TYPE.as_str()));
        if !has_content_type {
            match config.body_type {
                BodyType::Json => {
                    headers.insert(CONTENT_TYPE.to_string(), "application/json".to_string());
                }
                BodyType::Form => {
                    headers.insert(
                        CONTENT_TYPE.to_string(),
                        "application/x-www-form-urlencoded".to_string(),
                    );
                }
                BodyType::Raw | BodyType::None => {}
            }
        }
    }

    headers
}

/// Materializes the request body at dispatch time. `RandomChoice` fields draw
/// one candidate uniformly per call, so identical-looking requests in the
/// same run can carry different bodies.
pub fn resolve_body<R: Rng>(config: &LoadTestConfig, rng: &mut R) -> Option<String> {
    if !config.http_method.has_body() {
        return None;
    }

    match config.body_type {
        BodyType::Json => {
            let mut object = serde_json::Map::new();
            for (key, field) in &config.request_body {
                object.insert(key.clone(), resolve_field(field, rng));
            }
            Some(serde_json::Value::Object(object).to_string())
        }
        BodyType::Form => {
            let mut serializer = form_urlencoded::Serializer::new(String::new());
            for (key, field) in &config.request_body {
                serializer.append_pair(key, &field_text(&resolve_field(field, rng)));
            }
            Some(serializer.finish())
        }
        BodyType::Raw => config.raw_body.clone(),
        BodyType::None => None,
    }
}

fn resolve_field<R: Rng>(field: &FieldValue, rng: &mut R) -> serde_json::Value {
    match field {
        FieldValue::Literal(value) => value.clone(),
        FieldValue::RandomChoice(candidates) => {
            serde_json::Value::String(candidates.choose(rng).cloned().unwrap_or_default())
        }
    }
}

fn field_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::json;
    use std::collections::HashSet;

    fn config(value: serde_json::Value) -> LoadTestConfig {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn json_body_resolves_literals() {
        let config = config(json!({
            "base_url": "http://localhost/api",
            "http_method": "POST",
            "request_body": { "name": "alice", "count": 3 }
        }));
        let body = resolve_body(&config, &mut rand::thread_rng()).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed, json!({ "name": "alice", "count": 3 }));
    }

    #[test]
    fn random_choice_draws_every_candidate_eventually() {
        let config = config(json!({
            "base_url": "http://localhost/api",
            "http_method": "POST",
            "request_body": { "region": ["a", "b", "c"] }
        }));
        let mut rng = StdRng::seed_from_u64(7);
        let mut seen = HashSet::new();
        for _ in 0..100 {
            let body = resolve_body(&config, &mut rng).unwrap();
            let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
            seen.insert(parsed["region"].as_str().unwrap().to_string());
        }
        assert_eq!(seen.len(), 3, "all candidates should appear across 100 draws");
    }

    #[test]
    fn form_body_url_encodes_fields() {
        let config = config(json!({
            "base_url": "http://localhost/api",
            "http_method": "POST",
            "body_type": "form",
            "request_body": { "q": "a b&c" }
        }));
        let body = resolve_body(&config, &mut rand::thread_rng()).unwrap();
        assert_eq!(body, "q=a+b%26c");
    }

    #[test]
    fn raw_body_passes_through_and_get_sends_none() {
        let raw = config(json!({
            "base_url": "http://localhost/api",
            "http_method": "PUT",
            "body_type": "raw",
            "raw_body": "<xml/>"
        }));
        assert_eq!(
            resolve_body(&raw, &mut rand::thread_rng()).as_deref(),
            Some("<xml/>")
        );

        let get = config(json!({
            "base_url": "http://localhost/api",
            "http_method": "GET",
            "request_body": { "ignored": 1 }
        }));
        assert_eq!(resolve_body(&get, &mut rand::thread_rng()), None);
    }

    #[test]
    fn default_headers_infer_content_type() {
        let json_config = config(json!({
            "base_url": "http://localhost/api",
            "http_method": "POST"
        }));
        let headers = request_headers(&json_config);
        assert_eq!(headers.get("content-type").unwrap(), "application/json");
        assert!(headers.get("user-agent").unwrap().starts_with("volley/"));

        let custom = config(json!({
            "base_url": "http://localhost/api",
            "http_method": "POST",
            "headers": { "Content-Type": "application/vnd.custom" }
        }));
        let headers = request_headers(&custom);
        assert_eq!(
            headers.get("Content-Type").unwrap(),
            "application/vnd.custom"
        );
        assert!(!headers.contains_key("content-type"));
    }

    #[test]
    fn get_requests_get_no_content_type() {
        let get = config(json!({
            "base_url": "http://localhost/api",
            "http_method": "GET"
        }));
        let headers = request_headers(&get);
        assert!(!headers
            .keys()
            .any(|k| k.eq_ignore_ascii_case("content-type")));
    }
}
