//! Port traits for the collaborators the session engine drives.
//!
//! # Design Rules
//!
//! - Every trait here is object-safe: all methods take `&self`, interior
//!   mutability handles state changes inside each implementation.
//! - Streaming collaborators are pull-based lazy sequences
//!   ([`TextDeltaStream`], [`AudioChunkStream`]); dropping a stream cancels
//!   upstream production. The worker gets a uniform "read next item or see
//!   end-of-stream/error" loop instead of callback-driven control flow.
//! - Errors are defined next to the port they belong to and carry enough
//!   context to be recorded on a failed session and logged.

pub mod llm;
pub mod player;
pub mod tts;

pub use llm::{LanguageModelPort, TextDeltaStream};
pub use player::{AudioOutputPort, AudioPlayerPort, PlayerError};
pub use tts::{AudioChunk, AudioChunkStream, SpeechSynthesizerPort};

use thiserror::Error;

/// Errors surfaced by the streaming collaborator ports (language model and
/// speech synthesis).
///
/// `service` names the collaborator for logs and the recorded failure cause;
/// it is a static label like `"language model"` or `"speech synthesis"`.
#[derive(Debug, Error)]
pub enum StreamError {
    /// Could not establish the streaming connection.
    #[error("failed to connect to {service}: {message}")]
    Connect { service: &'static str, message: String },

    /// The stream failed after delivering zero or more items.
    #[error("{service} stream interrupted: {message}")]
    Interrupted { service: &'static str, message: String },

    /// The collaborator replied with something we could not understand.
    #[error("{service} returned a malformed payload: {message}")]
    Protocol { service: &'static str, message: String },
}

impl StreamError {
    /// Whether a retry with backoff is worth attempting.
    ///
    /// Connection and mid-stream network failures are transient; a protocol
    /// violation will not fix itself by retrying.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Connect { .. } | Self::Interrupted { .. })
    }

    /// The collaborator label this error originated from.
    #[must_use]
    pub const fn service(&self) -> &'static str {
        match self {
            Self::Connect { service, .. }
            | Self::Interrupted { service, .. }
            | Self::Protocol { service, .. } => service,
        }
    }
}
