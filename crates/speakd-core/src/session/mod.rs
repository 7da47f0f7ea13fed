//! Session domain model — state machine, shared record, receipts.
//!
//! A *session* is one run of text→speech→playback. The process holds at
//! most one; its record is shared between the coordinator (which creates it
//! and requests stops) and the synthesis worker (which owns every other
//! state write).

mod coordinator;
mod worker;

pub use coordinator::{CoordinatorConfig, OnBusyPolicy, SessionCoordinator};
pub use worker::RetryPolicy;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ports::AudioPlayerPort;

// ── Session state machine ──────────────────────────────────────────

/// Lifecycle state of a session.
///
/// Transitions are monotonic: `Starting → Running → Stopping → Stopped`
/// plus the `Running → Failed` error exit. No state ever regresses; the
/// shared record enforces this by refusing backward writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// No session exists (coordinator slot is empty).
    Idle,
    /// Record created, worker launched, synthesis not yet running.
    Starting,
    /// The worker is streaming text and audio.
    Running,
    /// A stop was requested; teardown is in progress.
    Stopping,
    /// Terminal: completed normally or stopped on request.
    Stopped,
    /// Terminal: an unrecoverable streaming/playback error occurred.
    Failed,
}

impl SessionState {
    /// Whether the session has reached a terminal state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Failed)
    }

    /// Whether the session occupies the single live slot
    /// (`Starting`/`Running`/`Stopping`).
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Starting | Self::Running | Self::Stopping)
    }

    /// Position in the monotonic transition order.
    const fn rank(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Starting => 1,
            Self::Running => 2,
            Self::Stopping => 3,
            Self::Stopped | Self::Failed => 4,
        }
    }
}

// ── Shared record ──────────────────────────────────────────────────

/// State + failure cause behind one mutex so readers always see a
/// consistent pair.
#[derive(Debug)]
struct StateCell {
    state: SessionState,
    failure: Option<String>,
}

/// The session record shared between coordinator and worker.
///
/// `stop_requested` is the only field written from a different thread than
/// the owning worker; it is an atomic with `SeqCst` ordering so the
/// worker's boundary checks observe the coordinator's write. The player
/// slot lets the coordinator reach the live player for forced teardown;
/// both mutexes are plain `std` locks held only for pointer-sized work,
/// never across an `.await`.
pub(crate) struct SessionShared {
    id: u64,
    segments: Vec<String>,
    cell: Mutex<StateCell>,
    stop_requested: AtomicBool,
    player: Mutex<Option<Arc<dyn AudioPlayerPort>>>,
}

impl SessionShared {
    pub(crate) fn new(id: u64, segments: Vec<String>) -> Self {
        Self {
            id,
            segments,
            cell: Mutex::new(StateCell { state: SessionState::Starting, failure: None }),
            stop_requested: AtomicBool::new(false),
            player: Mutex::new(None),
        }
    }

    pub(crate) const fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn segments(&self) -> &[String] {
        &self.segments
    }

    pub(crate) fn state(&self) -> SessionState {
        self.cell.lock().expect("session state lock poisoned").state
    }

    pub(crate) fn failure_cause(&self) -> Option<String> {
        self.cell.lock().expect("session state lock poisoned").failure.clone()
    }

    pub(crate) fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    /// Coordinator-side stop: raise the flag and advance a non-terminal
    /// session to `Stopping`. The terminal write stays with the worker.
    pub(crate) fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
        self.transition(SessionState::Stopping);
    }

    /// Advance the state machine, refusing backward writes.
    pub(crate) fn transition(&self, new_state: SessionState) {
        let mut cell = self.cell.lock().expect("session state lock poisoned");
        if new_state.rank() > cell.state.rank() {
            tracing::debug!(
                session_id = self.id,
                old = ?cell.state,
                new = ?new_state,
                "session state transition"
            );
            cell.state = new_state;
        }
    }

    /// Terminal error exit: record the cause and move to `Failed`.
    pub(crate) fn fail(&self, cause: String) {
        let mut cell = self.cell.lock().expect("session state lock poisoned");
        if !cell.state.is_terminal() {
            cell.state = SessionState::Failed;
            cell.failure = Some(cause);
        }
    }

    pub(crate) fn install_player(&self, player: Arc<dyn AudioPlayerPort>) {
        *self.player.lock().expect("player slot lock poisoned") = Some(player);
    }

    pub(crate) fn player(&self) -> Option<Arc<dyn AudioPlayerPort>> {
        self.player.lock().expect("player slot lock poisoned").clone()
    }

    pub(crate) fn take_player(&self) -> Option<Arc<dyn AudioPlayerPort>> {
        self.player.lock().expect("player slot lock poisoned").take()
    }

    pub(crate) fn has_player(&self) -> bool {
        self.player
            .lock()
            .expect("player slot lock poisoned")
            .as_ref()
            .is_some_and(|p| p.is_open())
    }
}

// ── Receipts and snapshots ─────────────────────────────────────────

/// Returned by a successful `start`.
#[derive(Debug, Clone, Copy)]
pub struct StartReceipt {
    /// The newly allocated session id.
    pub session_id: u64,
    /// Observed state at return time (`Starting` or already `Running`).
    pub state: SessionState,
}

/// Returned by `stop` (which never fails).
#[derive(Debug, Clone, Copy)]
pub struct StopReceipt {
    /// Id of the session that was stopped, if one existed.
    pub session_id: Option<u64>,
    /// State the session was in when the stop arrived (`Idle` for a no-op).
    pub previous_state: SessionState,
}

/// Non-blocking, read-consistent view of the active-session slot.
#[derive(Debug, Clone)]
pub struct StatusSnapshot {
    pub state: SessionState,
    pub session_id: Option<u64>,
    pub stop_requested: bool,
    pub has_player: bool,
    pub has_worker: bool,
    /// Recorded cause when `state` is `Failed`.
    pub failure_cause: Option<String>,
}

impl StatusSnapshot {
    pub(crate) const fn idle() -> Self {
        Self {
            state: SessionState::Idle,
            session_id: None,
            stop_requested: false,
            has_player: false,
            has_worker: false,
            failure_cause: None,
        }
    }
}

// ── Errors ─────────────────────────────────────────────────────────

/// Caller-visible errors from coordinator operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// `start` was called while a session is active, under the reject
    /// policy.
    #[error("a speech session is already active (state: {state:?})")]
    Conflict {
        /// State of the session occupying the slot.
        state: SessionState,
    },

    /// The request carried no speakable text.
    #[error("text segments must contain at least one non-empty entry")]
    EmptyInput,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn states_never_regress() {
        let shared = SessionShared::new(1, vec!["hi".into()]);
        shared.transition(SessionState::Running);
        shared.transition(SessionState::Starting);
        assert_eq!(shared.state(), SessionState::Running);

        shared.request_stop();
        assert_eq!(shared.state(), SessionState::Stopping);
        shared.transition(SessionState::Running);
        assert_eq!(shared.state(), SessionState::Stopping);
    }

    #[test]
    fn fail_is_terminal_and_records_cause() {
        let shared = SessionShared::new(1, vec![]);
        shared.transition(SessionState::Running);
        shared.fail("boom".to_string());
        assert_eq!(shared.state(), SessionState::Failed);
        assert_eq!(shared.failure_cause().as_deref(), Some("boom"));

        // A late stop must not overwrite the terminal state.
        shared.request_stop();
        assert_eq!(shared.state(), SessionState::Failed);
    }

    #[test]
    fn stop_flag_is_set_once_and_sticks() {
        let shared = SessionShared::new(3, vec![]);
        assert!(!shared.stop_requested());
        shared.request_stop();
        shared.request_stop();
        assert!(shared.stop_requested());
    }

    #[test]
    fn stopping_before_running_blocks_the_running_write() {
        // A stop can land while the worker is still in Starting; the
        // worker's later Running write must not regress the state.
        let shared = SessionShared::new(4, vec![]);
        shared.request_stop();
        shared.transition(SessionState::Running);
        assert_eq!(shared.state(), SessionState::Stopping);
    }
}
