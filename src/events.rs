//! Progress event contract and the broadcast publisher behind it. Events are
//! emitted in lifecycle order per session: one `test_started`, a
//! `batch_started` per batch, one `request_completed` per finished request in
//! completion order, and exactly one terminal event.

use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::{Outcome, TestStats};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    TestStarted {
        session_id: Uuid,
        total_requests: u64,
    },
    BatchStarted {
        session_id: Uuid,
        batch_num: u32,
        total_batches: u32,
    },
    RequestCompleted {
        session_id: Uuid,
        request_num: u32,
        status: Outcome,
        response_time: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        status_code: Option<u16>,
        validation_passed: bool,
    },
    TestCompleted {
        session_id: Uuid,
        stats: TestStats,
    },
    TestCancelled {
        session_id: Uuid,
        completed_requests: usize,
        stats: TestStats,
    },
    TestFailed {
        session_id: Uuid,
        error: String,
    },
}

/// Fans events out to every subscriber (WebSocket sessions, tests). Sending
/// is fire-and-forget and never blocks the executor that triggered it: with
/// no subscribers the event is simply dropped, and a lagging subscriber loses
/// old events rather than slowing the run.
#[derive(Clone)]
pub struct ProgressPublisher {
    tx: broadcast::Sender<ProgressEvent>,
}

impl ProgressPublisher {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        ProgressPublisher { tx }
    }

    pub fn publish(&self, event: ProgressEvent) {
        // a send error only means nobody is listening right now
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.tx.subscribe()
    }
}

impl Default for ProgressPublisher {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_form_uses_snake_case_type_tags() {
        let id = Uuid::new_v4();
        let event = ProgressEvent::TestStarted {
            session_id: id,
            total_requests: 10,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "test_started");
        assert_eq!(value["total_requests"], 10);
        assert_eq!(value["session_id"], id.to_string());

        let event = ProgressEvent::RequestCompleted {
            session_id: id,
            request_num: 3,
            status: Outcome::Success,
            response_time: 0.25,
            status_code: Some(200),
            validation_passed: true,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "request_completed");
        assert_eq!(value["status"], "success");
        assert_eq!(value["status_code"], 200);
    }

    #[test]
    fn transport_failures_omit_status_code_on_the_wire() {
        let event = ProgressEvent::RequestCompleted {
            session_id: Uuid::new_v4(),
            request_num: 1,
            status: Outcome::Error,
            response_time: 1.0,
            status_code: None,
            validation_passed: false,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert!(value.get("status_code").is_none());
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_a_no_op() {
        let publisher = ProgressPublisher::new(4);
        publisher.publish(ProgressEvent::TestFailed {
            session_id: Uuid::new_v4(),
            error: "nobody listening".to_string(),
        });

        let mut rx = publisher.subscribe();
        publisher.publish(ProgressEvent::TestStarted {
            session_id: Uuid::new_v4(),
            total_requests: 1,
        });
        assert!(matches!(
            rx.recv().await.unwrap(),
            ProgressEvent::TestStarted { .. }
        ));
    }
}
