//! HTTP streaming clients for the speakd collaborators.
//!
//! Implements the two streaming ports from `speakd-core` against an
//! OpenAI-compatible backend:
//!
//! - [`ChatClient`] — `/v1/chat/completions` with `stream: true`, consumed
//!   as server-sent events and surfaced as a lazy stream of text deltas.
//! - [`SynthesisClient`] — a `/v1/audio/speech`-style endpoint whose
//!   chunked response body is surfaced as a lazy stream of numbered
//!   compressed-audio chunks.
//!
//! Both clients cancel upstream production when their stream is dropped:
//! dropping the `reqwest` body stream closes the connection.

mod config;
mod llm;
mod sse;
mod tts;

pub use config::BackendConfig;
pub use llm::ChatClient;
pub use tts::SynthesisClient;
