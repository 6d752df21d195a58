//! The run driver: turns a validated config into sequential batches of
//! concurrent request tasks, feeds every outcome through validation into the
//! session registry, and publishes progress until a terminal event.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use colored::Colorize;
use futures::future::join_all;
use tokio::task::JoinHandle;
use url::Url;
use uuid::Uuid;

use crate::client::{self, HttpsClient, RequestSpec};
use crate::error::EngineError;
use crate::events::{ProgressEvent, ProgressPublisher};
use crate::models::{LoadTestConfig, Outcome, RequestResult, SessionState, TestSession, TestStats};
use crate::session::{CancelHandle, SessionRegistry};
use crate::storage::Storage;
use crate::validation::{self, ResponseView};

/// The full dispatch plan for a run: `batches` sequential groups of
/// `per_batch` concurrent requests. Sequence numbers are assigned
/// batch-major at dispatch time, so they are dense over `[1, total]` and
/// independent of completion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchPlan {
    pub batches: u32,
    pub per_batch: u32,
}

impl DispatchPlan {
    pub fn from_config(config: &LoadTestConfig) -> Self {
        DispatchPlan {
            batches: config.batches(),
            per_batch: config.concurrent_calls,
        }
    }

    pub fn total(&self) -> u64 {
        u64::from(self.batches) * u64::from(self.per_batch)
    }

    /// 1-based sequence number for a slot within a batch.
    pub fn sequence_number(&self, batch: u32, slot: u32) -> u32 {
        batch * self.per_batch + slot + 1
    }
}

/// Entry point spawned per accepted run. Engine-level faults terminate the
/// session as `failed`; whatever results were already recorded stay
/// queryable.
pub async fn run_load_test(
    registry: SessionRegistry,
    publisher: ProgressPublisher,
    storage: Storage,
    session_id: Uuid,
    config: LoadTestConfig,
    cancel: CancelHandle,
) {
    if let Err(err) = drive(&registry, &publisher, &storage, session_id, config, cancel).await {
        tracing::error!(%session_id, %err, "load test failed");
        if let Some(snapshot) =
            registry.finalize(session_id, SessionState::Failed, Some(err.to_string()))
        {
            publisher.publish(ProgressEvent::TestFailed {
                session_id,
                error: err.to_string(),
            });
            persist(&storage, &snapshot).await;
        }
    }
}

async fn drive(
    registry: &SessionRegistry,
    publisher: &ProgressPublisher,
    storage: &Storage,
    session_id: Uuid,
    config: LoadTestConfig,
    cancel: CancelHandle,
) -> Result<(), EngineError> {
    let url = Url::parse(&config.base_url)
        .map_err(|e| EngineError::Config(format!("base_url '{}': {e}", config.base_url)))?;
    let client = Arc::new(client::build_client(config.verify_ssl)?);

    let plan = DispatchPlan::from_config(&config);
    let headers = client::request_headers(&config);
    let config = Arc::new(config);

    registry.mark_running(session_id);
    publisher.publish(ProgressEvent::TestStarted {
        session_id,
        total_requests: plan.total(),
    });
    tracing::info!(
        %session_id,
        target = %url,
        total = plan.total(),
        batches = plan.batches,
        concurrent = plan.per_batch,
        "load test started"
    );

    let mut cancelled = false;
    for batch in 0..plan.batches {
        if cancel.is_cancelled() {
            cancelled = true;
            tracing::info!(%session_id, after_batches = batch, "cancellation observed, no further batches");
            break;
        }

        publisher.publish(ProgressEvent::BatchStarted {
            session_id,
            batch_num: batch + 1,
            total_batches: plan.batches,
        });

        let mut handles: Vec<JoinHandle<()>> = Vec::with_capacity(plan.per_batch as usize);
        for slot in 0..plan.per_batch {
            let request_num = plan.sequence_number(batch, slot);
            // body resolution happens here, at dispatch time, so random
            // fields vary between requests of the same batch
            let body = client::resolve_body(&config, &mut rand::thread_rng());
            let spec = RequestSpec {
                url: url.clone(),
                method: config.http_method.as_method(),
                headers: headers.clone(),
                body,
                timeout: Duration::from_secs(config.timeout),
                follow_redirects: config.follow_redirects,
            };
            handles.push(tokio::spawn(run_one(
                Arc::clone(&client),
                spec,
                request_num,
                Arc::clone(&config),
                registry.clone(),
                publisher.clone(),
                session_id,
            )));
        }

        // the batch barrier: batch k+1 never starts before k fully drains
        for join in join_all(handles).await {
            if let Err(err) = join {
                tracing::warn!(%session_id, %err, "request task aborted");
            }
        }
    }
    cancelled = cancelled || cancel.is_cancelled();

    let state = if cancelled {
        SessionState::Cancelled
    } else {
        SessionState::Completed
    };
    let Some(snapshot) = registry.finalize(session_id, state, None) else {
        return Ok(());
    };
    let stats = snapshot
        .stats
        .clone()
        .unwrap_or_else(|| TestStats::compute(&[], 0.0));

    if cancelled {
        publisher.publish(ProgressEvent::TestCancelled {
            session_id,
            completed_requests: snapshot.results.len(),
            stats,
        });
    } else {
        publisher.publish(ProgressEvent::TestCompleted { session_id, stats });
    }
    tracing::info!(%session_id, status = ?snapshot.status, completed = snapshot.results.len(), "load test finished");

    print_summary(&snapshot);
    persist(storage, &snapshot).await;
    Ok(())
}

/// One dispatched request: execute, validate, record, then publish, in that
/// order. Transport failures arrive here as data and stay data.
async fn run_one(
    client: Arc<HttpsClient>,
    spec: RequestSpec,
    request_num: u32,
    config: Arc<LoadTestConfig>,
    registry: SessionRegistry,
    publisher: ProgressPublisher,
    session_id: Uuid,
) {
    let timestamp = Utc::now();
    let exchange = client::execute(&client, &spec).await;

    let view = ResponseView {
        status_code: exchange.status_code,
        body: exchange.response_body.as_deref().unwrap_or(""),
    };
    let (validation_results, validation_passed) =
        validation::evaluate_all(&config.validation_rules, &view);

    let status = if exchange.status_code.is_some() {
        Outcome::Success
    } else {
        Outcome::Error
    };

    let event = ProgressEvent::RequestCompleted {
        session_id,
        request_num,
        status,
        response_time: exchange.response_time,
        status_code: exchange.status_code,
        validation_passed,
    };

    registry.append_result(
        session_id,
        RequestResult {
            request_num,
            status,
            response_time: exchange.response_time,
            status_code: exchange.status_code,
            error_message: exchange.error_message,
            timestamp,
            request_headers: spec.headers,
            request_body: spec.body,
            response_headers: exchange.response_headers,
            response_body: exchange.response_body,
            validation_results,
            validation_passed,
        },
    );
    publisher.publish(event);
}

async fn persist(storage: &Storage, snapshot: &TestSession) {
    if let Err(err) = storage.save_run(snapshot).await {
        tracing::warn!(session_id = %snapshot.session_id, %err, "failed to persist run results");
    }
}

fn print_summary(session: &TestSession) {
    let Some(stats) = &session.stats else { return };

    println!();
    println!("{}", "======== TEST RESULTS ========".bold());
    println!("{} {}", "Session             :".blue().bold(), session.session_id);
    println!("{} {:?}", "Status              :".blue().bold(), session.status);
    println!("{} {}", "Total requests      :".green().bold(), stats.total_requests);
    println!("{} {}", "Successful          :".green().bold(), stats.successful_requests);
    println!("{} {}", "Failed              :".red().bold(), stats.failed_requests);
    println!("{} {}", "Validation failures :".red().bold(), stats.validation_failures);
    println!("{} {:.2}%", "Success rate        :".cyan().bold(), stats.success_rate);
    println!("{} {:.2} ms", "Avg response time   :".cyan().bold(), stats.avg_response_time * 1000.0);
    println!("{} {:.2}", "Requests per second :".magenta().bold(), stats.requests_per_second);
}
