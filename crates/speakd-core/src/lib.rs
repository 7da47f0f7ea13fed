//! Core engine for speakd — the session concurrency coordinator and the
//! streaming synthesis worker.
//!
//! This crate is transport- and backend-agnostic. It defines the port traits
//! the engine drives ([`ports`]) and the session machinery that drives them
//! ([`session`]): a process-wide coordinator enforcing at most one live
//! playback session, and a per-session background worker that pumps
//! language-model text through speech synthesis into an audio player.
//!
//! Concrete adapters live elsewhere: HTTP collaborator clients in
//! `speakd-backend`, the decoder/device player in `speakd-audio`, and the
//! web surface in `speakd-axum`.

pub mod ports;
pub mod session;
pub mod text;

// Re-export commonly used types for convenience
pub use ports::{
    AudioChunk, AudioChunkStream, AudioOutputPort, AudioPlayerPort, LanguageModelPort,
    PlayerError, SpeechSynthesizerPort, StreamError, TextDeltaStream,
};
pub use session::{
    CoordinatorConfig, OnBusyPolicy, RetryPolicy, SessionCoordinator, SessionError, SessionState,
    StartReceipt, StatusSnapshot, StopReceipt,
};
pub use text::SentenceAssembler;
