//! Streaming audio playback for speakd — decoder process, output sink,
//! and the player that binds them into one scoped resource.
//!
//! The pipeline mirrors the classic ffmpeg pipe topology: compressed
//! chunks go into the decoder child's stdin, raw PCM comes out of its
//! stdout, and a reader task forwards the samples to the output device.
//! Decode and playback overlap with chunk production, so audio starts as
//! soon as the first chunk lands and a stop truncates within
//! milliseconds.

pub mod decoder;
pub mod player;
pub mod sink;

// Re-export key types for convenience
pub use decoder::{DecoderCommand, StreamingDecoder};
pub use player::{LocalAudioOutput, StreamingPlayer};
pub use sink::{RodioSink, SampleSink};
