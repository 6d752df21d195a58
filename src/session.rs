//! Process-wide run registry. Sessions are created on run start, mutated only
//! by the engine's executors (append-only results behind one lock), and stay
//! queryable after reaching a terminal state. Cancellation is a per-session
//! flag observed cooperatively by the scheduler at batch boundaries.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use chrono::Utc;
use uuid::Uuid;

use crate::models::{LoadTestConfig, RequestResult, SessionState, TestSession, TestStats};

/// Per-session cancellation signal. Setting it twice is a no-op; in-flight
/// requests are never aborted by it, only future batches.
#[derive(Debug, Clone)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    fn new() -> Self {
        CancelHandle(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug)]
pub enum CancelOutcome {
    Requested,
    AlreadyTerminal(SessionState),
    NotFound,
}

struct Slot {
    session: TestSession,
    cancel: CancelHandle,
}

/// Shared handle to every known session, past and present. Critical sections
/// are short and never held across an await.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<RwLock<HashMap<Uuid, Slot>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, config: LoadTestConfig) -> (Uuid, CancelHandle) {
        let session_id = Uuid::new_v4();
        let cancel = CancelHandle::new();
        let session = TestSession {
            session_id,
            config,
            status: SessionState::Pending,
            start_time: Utc::now(),
            end_time: None,
            results: Vec::new(),
            stats: None,
            error: None,
        };
        self.inner.write().unwrap().insert(
            session_id,
            Slot {
                session,
                cancel: cancel.clone(),
            },
        );
        (session_id, cancel)
    }

    /// Transitions `pending → running` and restarts the wall clock so
    /// requests-per-second measures from the moment dispatch begins.
    pub fn mark_running(&self, session_id: Uuid) {
        let mut sessions = self.inner.write().unwrap();
        if let Some(slot) = sessions.get_mut(&session_id) {
            if slot.session.status == SessionState::Pending {
                slot.session.status = SessionState::Running;
                slot.session.start_time = Utc::now();
            }
        }
    }

    /// Appends one completed result (completion order) and recomputes the
    /// session's running stats from the sequence so far.
    pub fn append_result(&self, session_id: Uuid, result: RequestResult) {
        let mut sessions = self.inner.write().unwrap();
        if let Some(slot) = sessions.get_mut(&session_id) {
            slot.session.results.push(result);
            let elapsed = elapsed_secs(&slot.session);
            slot.session.stats = Some(TestStats::compute(&slot.session.results, elapsed));
        }
    }

    /// Moves the session to a terminal state exactly once and returns the
    /// final snapshot. A second finalization attempt is ignored: terminal
    /// sessions never change state again.
    pub fn finalize(
        &self,
        session_id: Uuid,
        state: SessionState,
        error: Option<String>,
    ) -> Option<TestSession> {
        let mut sessions = self.inner.write().unwrap();
        let slot = sessions.get_mut(&session_id)?;
        if slot.session.status.is_terminal() {
            tracing::warn!(
                %session_id,
                current = ?slot.session.status,
                attempted = ?state,
                "ignoring state transition on terminal session"
            );
            return None;
        }
        slot.session.status = state;
        slot.session.end_time = Some(Utc::now());
        slot.session.error = error;
        let elapsed = elapsed_secs(&slot.session);
        slot.session.stats = Some(TestStats::compute(&slot.session.results, elapsed));
        Some(slot.session.clone())
    }

    pub fn snapshot(&self, session_id: Uuid) -> Option<TestSession> {
        self.inner
            .read()
            .unwrap()
            .get(&session_id)
            .map(|slot| slot.session.clone())
    }

    pub fn cancel(&self, session_id: Uuid) -> CancelOutcome {
        let sessions = self.inner.read().unwrap();
        match sessions.get(&session_id) {
            None => CancelOutcome::NotFound,
            Some(slot) if slot.session.status.is_terminal() => {
                CancelOutcome::AlreadyTerminal(slot.session.status)
            }
            Some(slot) => {
                slot.cancel.cancel();
                CancelOutcome::Requested
            }
        }
    }
}

fn elapsed_secs(session: &TestSession) -> f64 {
    let end = session.end_time.unwrap_or_else(Utc::now);
    (end - session.start_time).num_milliseconds().max(0) as f64 / 1000.0
}
