//! Synthesis worker — drives one session from `Starting` to a terminal
//! state.
//!
//! The worker is the only component that performs terminal state writes.
//! Cancellation is cooperative here (the stop flag is checked before each
//! chunk and at each segment boundary) and forceful at the player below
//! (the coordinator kills the decoder/device out from under a blocked
//! write, which surfaces as an error the worker maps back to "stopped").

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use thiserror::Error;

use crate::ports::{
    AudioOutputPort, AudioPlayerPort, LanguageModelPort, PlayerError, SpeechSynthesizerPort,
    StreamError, TextDeltaStream,
};
use crate::session::{SessionShared, SessionState};
use crate::text::SentenceAssembler;

// ── Retry policy ───────────────────────────────────────────────────

/// Bounded retry with exponential backoff for transient collaborator
/// failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts per operation (first try included).
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles for each one after.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, base_delay: Duration::from_millis(250) }
    }
}

impl RetryPolicy {
    /// Backoff before attempt `next_attempt` (2-based).
    fn delay_before(&self, next_attempt: u32) -> Duration {
        self.base_delay * 2_u32.saturating_pow(next_attempt.saturating_sub(2))
    }
}

// ── Failure classification ─────────────────────────────────────────

/// Why a session failed. Recorded verbatim as the failure cause.
#[derive(Debug, Error)]
pub(crate) enum WorkerFailure {
    #[error("{0}")]
    Streaming(#[from] StreamError),
    #[error("{0}")]
    Playback(PlayerError),
}

/// How one stage of the pipeline ended.
enum StageEnd {
    /// Ran out of input normally.
    Completed,
    /// The stop flag (or a closed player) cut it short.
    Interrupted,
}

// ── Worker ─────────────────────────────────────────────────────────

/// Per-session background task: text segments → LLM deltas → sentences →
/// TTS chunks → player.
pub(crate) struct SynthesisWorker {
    shared: Arc<SessionShared>,
    llm: Arc<dyn LanguageModelPort>,
    tts: Arc<dyn SpeechSynthesizerPort>,
    output: Arc<dyn AudioOutputPort>,
    retry: RetryPolicy,
}

impl SynthesisWorker {
    pub(crate) fn new(
        shared: Arc<SessionShared>,
        llm: Arc<dyn LanguageModelPort>,
        tts: Arc<dyn SpeechSynthesizerPort>,
        output: Arc<dyn AudioOutputPort>,
        retry: RetryPolicy,
    ) -> Self {
        Self { shared, llm, tts, output, retry }
    }

    /// Run the session to a terminal state. Never panics the process: every
    /// per-session error is absorbed, recorded, and surfaced via status.
    pub(crate) async fn run(self) {
        let session_id = self.shared.id();
        match self.drive().await {
            Ok(StageEnd::Completed) => {
                self.shared.transition(SessionState::Stopped);
                tracing::info!(session_id, "speech session completed");
            }
            Ok(StageEnd::Interrupted) => {
                self.shared.transition(SessionState::Stopped);
                tracing::info!(session_id, "speech session stopped on request");
            }
            Err(failure) if self.shared.stop_requested() => {
                // Forced teardown makes in-flight I/O fail; when a stop is
                // pending, those errors are consequences, not causes.
                self.shared.transition(SessionState::Stopped);
                tracing::debug!(
                    session_id,
                    error = %failure,
                    "error during stop teardown, recorded as stopped"
                );
            }
            Err(failure) => {
                self.shared.fail(failure.to_string());
                tracing::warn!(session_id, error = %failure, "speech session failed");
            }
        }
        self.shared.take_player();
    }

    /// The pipeline proper. Opens the player, pumps every segment, and
    /// guarantees the player is released on every exit path.
    async fn drive(&self) -> Result<StageEnd, WorkerFailure> {
        self.shared.transition(SessionState::Running);
        if self.shared.stop_requested() {
            return Ok(StageEnd::Interrupted);
        }

        let player = self.output.open().await.map_err(WorkerFailure::Playback)?;
        self.shared.install_player(Arc::clone(&player));

        // The coordinator force-stops whatever player it finds in the slot.
        // If the stop landed while we were opening, it found nothing — so
        // re-check after installing and tear down ourselves.
        if self.shared.stop_requested() {
            player.shutdown();
            return Ok(StageEnd::Interrupted);
        }

        let result = self.pump_segments(player.as_ref()).await;
        match &result {
            Ok(StageEnd::Completed) => {} // player drained and closed in pump_segments
            Ok(StageEnd::Interrupted) | Err(_) => player.shutdown(),
        }
        result
    }

    /// Feed every text segment through the LLM → TTS → player chain, then
    /// drain the player on normal completion.
    async fn pump_segments(&self, player: &dyn AudioPlayerPort) -> Result<StageEnd, WorkerFailure> {
        let segments = self.shared.segments().to_vec();
        for segment in &segments {
            if self.shared.stop_requested() {
                return Ok(StageEnd::Interrupted);
            }
            if segment.trim().is_empty() {
                continue;
            }
            if let StageEnd::Interrupted = self.speak_segment(segment, player).await? {
                return Ok(StageEnd::Interrupted);
            }
        }
        if self.shared.stop_requested() {
            return Ok(StageEnd::Interrupted);
        }
        player.finish().await.map_err(WorkerFailure::Playback)?;
        Ok(StageEnd::Completed)
    }

    /// Stream one segment's reply from the language model and synthesize it
    /// sentence by sentence.
    async fn speak_segment(
        &self,
        segment: &str,
        player: &dyn AudioPlayerPort,
    ) -> Result<StageEnd, WorkerFailure> {
        let mut deltas = self.open_reply(segment).await?;
        let mut assembler = SentenceAssembler::new();

        while let Some(delta) = deltas.next().await {
            if self.shared.stop_requested() {
                return Ok(StageEnd::Interrupted);
            }
            // A mid-reply failure is not retried: part of the reply may
            // already be audible, and regenerating would speak it twice.
            let delta = delta?;
            for sentence in assembler.push(&delta) {
                if let StageEnd::Interrupted = self.speak_sentence(&sentence, player).await? {
                    return Ok(StageEnd::Interrupted);
                }
            }
        }

        if let Some(tail) = assembler.finish() {
            if self.shared.stop_requested() {
                return Ok(StageEnd::Interrupted);
            }
            if let StageEnd::Interrupted = self.speak_sentence(&tail, player).await? {
                return Ok(StageEnd::Interrupted);
            }
        }
        Ok(StageEnd::Completed)
    }

    /// Open the LLM reply stream, retrying transient connect failures.
    async fn open_reply(&self, prompt: &str) -> Result<TextDeltaStream, WorkerFailure> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.llm.stream_reply(prompt).await {
                Ok(stream) => return Ok(stream),
                Err(err) if err.is_transient() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_before(attempt + 1);
                    tracing::warn!(
                        session_id = self.shared.id(),
                        attempt,
                        error = %err,
                        retry_in_ms = delay.as_millis() as u64,
                        "language model connect failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Synthesize and play one sentence, retrying the whole sentence stream
    /// on transient failures.
    ///
    /// A retry replays the sentence's earlier chunks; brief repetition is
    /// preferable to dropping speech mid-sentence.
    async fn speak_sentence(
        &self,
        text: &str,
        player: &dyn AudioPlayerPort,
    ) -> Result<StageEnd, WorkerFailure> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.stream_sentence_once(text, player).await {
                Ok(end) => return Ok(end),
                Err(WorkerFailure::Streaming(err))
                    if err.is_transient() && attempt < self.retry.max_attempts =>
                {
                    let delay = self.retry.delay_before(attempt + 1);
                    tracing::warn!(
                        session_id = self.shared.id(),
                        attempt,
                        error = %err,
                        retry_in_ms = delay.as_millis() as u64,
                        "speech synthesis failed, retrying sentence"
                    );
                    tokio::time::sleep(delay).await;
                    if self.shared.stop_requested() {
                        return Ok(StageEnd::Interrupted);
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// One pass of TTS → player for a sentence.
    async fn stream_sentence_once(
        &self,
        text: &str,
        player: &dyn AudioPlayerPort,
    ) -> Result<StageEnd, WorkerFailure> {
        let mut chunks = self.tts.stream_speech(text).await?;
        while let Some(chunk) = chunks.next().await {
            if self.shared.stop_requested() {
                return Ok(StageEnd::Interrupted);
            }
            let chunk = chunk?;
            match player.write(chunk).await {
                Ok(()) => {}
                // Stop already tore the player down; not a new error.
                Err(PlayerError::Closed) => return Ok(StageEnd::Interrupted),
                Err(err) => return Err(WorkerFailure::Playback(err)),
            }
        }
        Ok(StageEnd::Completed)
    }
}
