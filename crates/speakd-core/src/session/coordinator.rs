//! Session coordinator — the process-wide single-session gatekeeper.
//!
//! The active-session slot is the only piece of process-wide mutable
//! state. It is guarded by a plain mutex held for pointer-sized reads and
//! writes only; a separate async operation lock serialises `start` and
//! `stop` against each other so `status` never waits behind a
//! stop-in-progress.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::ports::{AudioOutputPort, LanguageModelPort, SpeechSynthesizerPort};
use crate::session::worker::{RetryPolicy, SynthesisWorker};
use crate::session::{
    SessionError, SessionShared, SessionState, StartReceipt, StatusSnapshot, StopReceipt,
};

// ── Configuration ──────────────────────────────────────────────────

/// What `start` does when a session is already active.
///
/// The default is `Reject`: a control API that silently cancels in-flight
/// work turns an accidental double-submit into lost playback. `Preempt`
/// restores the stop-then-start behaviour for callers that want
/// last-writer-wins semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnBusyPolicy {
    /// Fail with a conflict error, leaving the running session untouched.
    #[default]
    Reject,
    /// Stop the running session, wait for teardown, then start the new one.
    Preempt,
}

/// Coordinator tuning knobs.
#[derive(Debug, Clone, Copy)]
pub struct CoordinatorConfig {
    /// Busy-slot policy for `start`.
    pub on_busy: OnBusyPolicy,
    /// How long `stop` waits for the worker to reach a terminal state
    /// before aborting it.
    pub stop_timeout: Duration,
    /// Retry policy handed to each worker.
    pub retry: RetryPolicy,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            on_busy: OnBusyPolicy::default(),
            stop_timeout: Duration::from_secs(5),
            retry: RetryPolicy::default(),
        }
    }
}

// ── Active-session slot ────────────────────────────────────────────

/// The record + worker handle occupying the single live slot.
struct ActiveSession {
    shared: Arc<SessionShared>,
    worker: Option<JoinHandle<()>>,
}

// ── Coordinator ────────────────────────────────────────────────────

/// Process-wide state machine enforcing at most one active session.
pub struct SessionCoordinator {
    llm: Arc<dyn LanguageModelPort>,
    tts: Arc<dyn SpeechSynthesizerPort>,
    output: Arc<dyn AudioOutputPort>,
    config: CoordinatorConfig,

    /// The single live slot. Locked only for pointer-sized work, never
    /// across an `.await`.
    slot: Mutex<Option<ActiveSession>>,

    /// Serialises `start` and `stop` so they never race on the slot.
    op_lock: tokio::sync::Mutex<()>,

    /// Next session id; strictly increasing, never reused.
    next_id: AtomicU64,
}

impl SessionCoordinator {
    /// Create a coordinator with an empty slot.
    pub fn new(
        llm: Arc<dyn LanguageModelPort>,
        tts: Arc<dyn SpeechSynthesizerPort>,
        output: Arc<dyn AudioOutputPort>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            llm,
            tts,
            output,
            config,
            slot: Mutex::new(None),
            op_lock: tokio::sync::Mutex::new(()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Start a new speech session for `segments`.
    ///
    /// Returns as soon as the worker task has been launched — it does not
    /// wait for first audio. Under [`OnBusyPolicy::Reject`] an active
    /// session makes this fail with [`SessionError::Conflict`]; under
    /// [`OnBusyPolicy::Preempt`] the active session is stopped first.
    pub async fn start(&self, segments: Vec<String>) -> Result<StartReceipt, SessionError> {
        if !segments.iter().any(|s| !s.trim().is_empty()) {
            return Err(SessionError::EmptyInput);
        }

        let _op = self.op_lock.lock().await;

        let occupant = self.lock_slot().as_ref().map(|a| a.shared.state());
        if let Some(state) = occupant {
            if state.is_active() {
                match self.config.on_busy {
                    OnBusyPolicy::Reject => return Err(SessionError::Conflict { state }),
                    OnBusyPolicy::Preempt => {
                        tracing::info!("preempting active session for new start request");
                        self.stop_current().await;
                    }
                }
            } else {
                // Terminal occupant — the slot is effectively free.
                self.lock_slot().take();
            }
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let shared = Arc::new(SessionShared::new(id, segments));
        let worker = SynthesisWorker::new(
            Arc::clone(&shared),
            Arc::clone(&self.llm),
            Arc::clone(&self.tts),
            Arc::clone(&self.output),
            self.config.retry,
        );
        let handle = tokio::spawn(worker.run());
        *self.lock_slot() = Some(ActiveSession { shared: Arc::clone(&shared), worker: Some(handle) });

        tracing::info!(session_id = id, "speech session started");
        Ok(StartReceipt { session_id: id, state: shared.state() })
    }

    /// Stop the active session, if any. Idempotent; never fails.
    ///
    /// Sets the stop flag, forces player teardown (unblocking any blocked
    /// write inside the worker), and waits — bounded by the configured
    /// timeout — for the worker to reach a terminal state. The slot is
    /// empty when this returns.
    pub async fn stop(&self) -> StopReceipt {
        let _op = self.op_lock.lock().await;
        self.stop_current().await
    }

    /// Non-blocking, read-consistent view of the slot.
    pub fn status(&self) -> StatusSnapshot {
        let slot = self.lock_slot();
        slot.as_ref().map_or_else(StatusSnapshot::idle, |active| StatusSnapshot {
            state: active.shared.state(),
            session_id: Some(active.shared.id()),
            stop_requested: active.shared.stop_requested(),
            has_player: active.shared.has_player(),
            has_worker: active.worker.as_ref().is_some_and(|h| !h.is_finished()),
            failure_cause: active.shared.failure_cause(),
        })
    }

    // ── Internals ──────────────────────────────────────────────────

    /// Stop whatever occupies the slot. Caller must hold the op lock.
    async fn stop_current(&self) -> StopReceipt {
        let Some(mut active) = self.lock_slot().take() else {
            tracing::debug!("stop requested with no active session");
            return StopReceipt { session_id: None, previous_state: SessionState::Idle };
        };

        let session_id = active.shared.id();
        let previous_state = active.shared.state();
        tracing::info!(session_id, state = ?previous_state, "stopping speech session");

        // Cooperative signal first, then forceful resource teardown: the
        // dead player unblocks a worker stuck in a backpressured write.
        active.shared.request_stop();
        if let Some(player) = active.shared.player() {
            player.shutdown();
        }

        if let Some(mut handle) = active.worker.take() {
            match tokio::time::timeout(self.config.stop_timeout, &mut handle).await {
                Ok(_) => {}
                Err(_) => {
                    tracing::warn!(
                        session_id,
                        timeout_ms = self.config.stop_timeout.as_millis() as u64,
                        "worker missed the stop deadline, aborting"
                    );
                    handle.abort();
                }
            }
        }

        // If the worker was aborted it never wrote a terminal state; the
        // player is already gone, so record the session stopped.
        active.shared.transition(SessionState::Stopped);
        active.shared.take_player();

        tracing::info!(session_id, "speech session torn down");
        StopReceipt { session_id: Some(session_id), previous_state }
    }

    fn lock_slot(&self) -> std::sync::MutexGuard<'_, Option<ActiveSession>> {
        self.slot.lock().expect("session slot lock poisoned")
    }
}
