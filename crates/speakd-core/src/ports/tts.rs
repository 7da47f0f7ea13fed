//! Speech-synthesis port — streaming text-to-speech.

use async_trait::async_trait;
use bytes::Bytes;
use futures_core::stream::BoxStream;

use super::StreamError;

/// One unit of compressed audio emitted by the TTS collaborator.
///
/// `seq` is assigned at emission time, monotonically increasing within one
/// stream. Ordering is significant: chunks must reach the decoder in the
/// order emitted.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Emission-order sequence number (0-based within the stream).
    pub seq: u64,
    /// Compressed audio bytes (e.g. one MP3 fragment).
    pub bytes: Bytes,
}

impl AudioChunk {
    /// Build a chunk from a sequence number and payload.
    #[must_use]
    pub fn new(seq: u64, bytes: impl Into<Bytes>) -> Self {
        Self { seq, bytes: bytes.into() }
    }
}

/// A lazy, finite sequence of compressed audio chunks, each delivered as it
/// becomes available rather than batched. Dropping the stream closes the
/// connection and stops further chunk delivery (early cancellation).
pub type AudioChunkStream = BoxStream<'static, Result<AudioChunk, StreamError>>;

/// Port for the streaming text-to-speech collaborator.
///
/// Implemented by `SynthesisClient` in `speakd-backend`.
#[async_trait]
pub trait SpeechSynthesizerPort: Send + Sync {
    /// Open a synthesis stream for one piece of text.
    async fn stream_speech(&self, text: &str) -> Result<AudioChunkStream, StreamError>;
}
