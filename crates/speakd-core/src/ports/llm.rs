//! Language-model port — streaming text completion.

use async_trait::async_trait;
use futures_core::stream::BoxStream;

use super::StreamError;

/// A lazy, finite sequence of text deltas produced by the language model.
///
/// Deltas arrive in generation order and concatenate into the full reply.
/// The stream may yield an `Err` mid-flight (network failure); the consumer
/// must be prepared for partial output. Dropping the stream closes the
/// underlying connection and stops further generation.
pub type TextDeltaStream = BoxStream<'static, Result<String, StreamError>>;

/// Port for the streaming language-model collaborator.
///
/// Implemented by `ChatClient` in `speakd-backend`; consumed by the
/// synthesis worker, which forwards the accumulated reply to the speech
/// synthesizer sentence by sentence.
#[async_trait]
pub trait LanguageModelPort: Send + Sync {
    /// Open a streaming completion for `prompt`.
    ///
    /// Returns once the connection is established and the first byte of the
    /// response is on its way; the reply itself is consumed incrementally
    /// from the returned stream.
    async fn stream_reply(&self, prompt: &str) -> Result<TextDeltaStream, StreamError>;
}
