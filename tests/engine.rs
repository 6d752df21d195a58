//! End-to-end engine runs against local TCP stub servers. The stubs speak
//! just enough HTTP/1.1 for hyper and close the connection after each
//! response, which keeps every request an independent exchange.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Semaphore};

use volley::events::{ProgressEvent, ProgressPublisher};
use volley::executor::run_load_test;
use volley::models::{LoadTestConfig, Outcome, SessionState, TestSession};
use volley::session::SessionRegistry;
use volley::storage::Storage;

struct StubOptions {
    status: &'static str,
    body: &'static str,
    delay: Duration,
    /// When set, each request consumes one permit before responding.
    gate: Option<Arc<Semaphore>>,
    /// When set, one message is sent per accepted connection.
    accepted: Option<mpsc::UnboundedSender<()>>,
    /// When set, everything but `GET /final` answers `302 → /final`.
    redirect_to_final: bool,
}

impl Default for StubOptions {
    fn default() -> Self {
        StubOptions {
            status: "200 OK",
            body: "{}",
            delay: Duration::ZERO,
            gate: None,
            accepted: None,
            redirect_to_final: false,
        }
    }
}

async fn spawn_stub(opts: StubOptions) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let opts = Arc::new(opts);

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            if let Some(accepted) = &opts.accepted {
                let _ = accepted.send(());
            }
            let opts = Arc::clone(&opts);
            tokio::spawn(async move {
                let mut buf = vec![0u8; 8192];
                let mut read = 0;
                // read until the end of the request headers; request bodies
                // in these tests are empty
                loop {
                    match socket.read(&mut buf[read..]).await {
                        Ok(0) => break,
                        Ok(n) => {
                            read += n;
                            if buf[..read].windows(4).any(|w| w == b"\r\n\r\n") {
                                break;
                            }
                            if read == buf.len() {
                                break;
                            }
                        }
                        Err(_) => return,
                    }
                }

                if let Some(gate) = &opts.gate {
                    match gate.acquire().await {
                        Ok(permit) => permit.forget(),
                        Err(_) => return,
                    }
                }
                tokio::time::sleep(opts.delay).await;

                let response = if opts.redirect_to_final && !buf[..read].starts_with(b"GET /final")
                {
                    "HTTP/1.1 302 Found\r\nlocation: /final\r\ncontent-length: 0\r\nconnection: close\r\n\r\n"
                        .to_string()
                } else {
                    format!(
                        "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                        opts.status,
                        opts.body.len(),
                        opts.body
                    )
                };
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    format!("http://{addr}/")
}

fn parse_config(doc: serde_json::Value) -> LoadTestConfig {
    let config: LoadTestConfig = serde_json::from_value(doc).unwrap();
    config.validate().unwrap();
    config
}

/// Runs a config to its terminal state and returns every published event
/// plus the final session snapshot.
async fn run_to_completion(config: LoadTestConfig) -> (Vec<ProgressEvent>, TestSession) {
    let registry = SessionRegistry::new();
    let publisher = ProgressPublisher::new(4096);
    let dir = tempfile::tempdir().unwrap();
    let storage = Storage::new(dir.path());

    let mut rx = publisher.subscribe();
    let (session_id, cancel) = registry.create(config.clone());
    run_load_test(
        registry.clone(),
        publisher.clone(),
        storage,
        session_id,
        config,
        cancel,
    )
    .await;

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    (events, registry.snapshot(session_id).unwrap())
}

fn completed_requests(events: &[ProgressEvent]) -> Vec<(u32, Outcome, bool)> {
    events
        .iter()
        .filter_map(|event| match event {
            ProgressEvent::RequestCompleted {
                request_num,
                status,
                validation_passed,
                ..
            } => Some((*request_num, *status, *validation_passed)),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn full_plan_completes_with_passing_validation() {
    let url = spawn_stub(StubOptions {
        body: r#"{"data": {"id": 7}}"#,
        ..StubOptions::default()
    })
    .await;

    let config = parse_config(json!({
        "base_url": url,
        "http_method": "GET",
        "concurrent_calls": 5,
        "sequential_batches": 2,
        "validation_rules": [
            { "type": "status_code", "value": 200 },
            { "type": "json_path", "value": null, "field_path": "data.id" },
        ],
    }));
    let (events, session) = run_to_completion(config).await;

    assert!(matches!(
        events.first(),
        Some(ProgressEvent::TestStarted {
            total_requests: 10,
            ..
        })
    ));

    let completed = completed_requests(&events);
    assert_eq!(completed.len(), 10);
    assert!(completed
        .iter()
        .all(|(_, status, passed)| *status == Outcome::Success && *passed));

    let sequence: HashSet<u32> = completed.iter().map(|(num, _, _)| *num).collect();
    assert_eq!(sequence, (1..=10).collect::<HashSet<u32>>());

    match events.last() {
        Some(ProgressEvent::TestCompleted { stats, .. }) => {
            assert_eq!(stats.total_requests, 10);
            assert_eq!(stats.successful_requests, 10);
            assert_eq!(stats.success_rate, 100.0);
        }
        other => panic!("expected test_completed as the terminal event, got {other:?}"),
    }

    assert_eq!(session.status, SessionState::Completed);
    assert_eq!(session.results.len(), 10);
    assert!(session.results.iter().all(|r| r.status_code == Some(200)));
}

#[tokio::test]
async fn unreachable_target_yields_error_results_not_session_failure() {
    let config = parse_config(json!({
        "base_url": "http://volley-does-not-exist.invalid:9/api",
        "http_method": "GET",
        "concurrent_calls": 3,
        "validation_rules": [{ "type": "status_code", "value": 200 }],
        "timeout": 10,
    }));
    let (events, session) = run_to_completion(config).await;

    let completed = completed_requests(&events);
    assert_eq!(completed.len(), 3);
    assert!(completed
        .iter()
        .all(|(_, status, passed)| *status == Outcome::Error && !*passed));

    // the run itself still completes; failed requests are data
    match events.last() {
        Some(ProgressEvent::TestCompleted { stats, .. }) => {
            assert_eq!(stats.total_requests, 3);
            assert_eq!(stats.failed_requests, 3);
            assert_eq!(stats.success_rate, 0.0);
        }
        other => panic!("expected test_completed, got {other:?}"),
    }

    assert_eq!(session.status, SessionState::Completed);
    for result in &session.results {
        assert_eq!(result.status_code, None);
        assert!(result.error_message.is_some());
        assert!(!result.validation_passed);
    }
}

#[tokio::test]
async fn batches_drain_strictly_in_order() {
    let url = spawn_stub(StubOptions {
        delay: Duration::from_millis(150),
        ..StubOptions::default()
    })
    .await;

    let config = parse_config(json!({
        "base_url": url,
        "http_method": "GET",
        "concurrent_calls": 3,
        "sequential_batches": 2,
    }));
    let (events, _) = run_to_completion(config).await;

    let order: Vec<u32> = completed_requests(&events)
        .iter()
        .map(|(num, _, _)| *num)
        .collect();
    assert_eq!(order.len(), 6);

    let first_batch: HashSet<u32> = order[..3].iter().copied().collect();
    let second_batch: HashSet<u32> = order[3..].iter().copied().collect();
    assert_eq!(first_batch, (1..=3).collect::<HashSet<u32>>());
    assert_eq!(second_batch, (4..=6).collect::<HashSet<u32>>());
}

#[tokio::test]
async fn cancellation_after_first_batch_stops_the_run() {
    let gate = Arc::new(Semaphore::new(0));
    let (accepted_tx, mut accepted_rx) = mpsc::unbounded_channel();
    let url = spawn_stub(StubOptions {
        gate: Some(Arc::clone(&gate)),
        accepted: Some(accepted_tx),
        ..StubOptions::default()
    })
    .await;

    let config = parse_config(json!({
        "base_url": url,
        "http_method": "GET",
        "concurrent_calls": 2,
        "sequential_batches": 3,
    }));

    let registry = SessionRegistry::new();
    let publisher = ProgressPublisher::new(1024);
    let dir = tempfile::tempdir().unwrap();
    let storage = Storage::new(dir.path());

    let mut rx = publisher.subscribe();
    let (session_id, cancel) = registry.create(config.clone());
    let run = tokio::spawn(run_load_test(
        registry.clone(),
        publisher.clone(),
        storage,
        session_id,
        config,
        cancel,
    ));

    // batch 1 is fully dispatched once both connections are accepted; cancel
    // while it is in flight, then let it drain
    accepted_rx.recv().await.unwrap();
    accepted_rx.recv().await.unwrap();
    registry.cancel(session_id);
    gate.add_permits(2);

    run.await.unwrap();

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }

    match events.last() {
        Some(ProgressEvent::TestCancelled {
            completed_requests, ..
        }) => assert_eq!(*completed_requests, 2),
        other => panic!("expected test_cancelled, got {other:?}"),
    }

    let session = registry.snapshot(session_id).unwrap();
    assert_eq!(session.status, SessionState::Cancelled);
    assert_eq!(session.results.len(), 2);
    let sequence: HashSet<u32> = session.results.iter().map(|r| r.request_num).collect();
    assert_eq!(sequence, (1..=2).collect::<HashSet<u32>>());
}

#[tokio::test]
async fn per_request_timeout_becomes_an_error_outcome() {
    let url = spawn_stub(StubOptions {
        delay: Duration::from_millis(1500),
        ..StubOptions::default()
    })
    .await;

    let config = parse_config(json!({
        "base_url": url,
        "http_method": "GET",
        "concurrent_calls": 1,
        "timeout": 1,
    }));
    let (_, session) = run_to_completion(config).await;

    assert_eq!(session.status, SessionState::Completed);
    let result = &session.results[0];
    assert_eq!(result.status, Outcome::Error);
    assert_eq!(result.status_code, None);
    assert!(result.error_message.as_deref().unwrap().contains("timed out"));
}

#[tokio::test]
async fn redirects_are_followed_only_when_enabled() {
    let url = spawn_stub(StubOptions {
        redirect_to_final: true,
        body: r#"{"final": true}"#,
        ..StubOptions::default()
    })
    .await;

    let following = parse_config(json!({
        "base_url": url,
        "http_method": "GET",
        "concurrent_calls": 1,
    }));
    let (_, session) = run_to_completion(following).await;
    assert_eq!(session.results[0].status_code, Some(200));
    assert!(session.results[0]
        .response_body
        .as_deref()
        .unwrap()
        .contains("final"));

    let not_following = parse_config(json!({
        "base_url": url,
        "http_method": "GET",
        "concurrent_calls": 1,
        "follow_redirects": false,
    }));
    let (_, session) = run_to_completion(not_following).await;
    assert_eq!(session.results[0].status, Outcome::Success);
    assert_eq!(session.results[0].status_code, Some(302));
}
