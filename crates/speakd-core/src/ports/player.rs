//! Audio-player port — ordered chunk playback with race-free teardown.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use super::tts::AudioChunk;

/// Errors surfaced by the streaming audio player.
#[derive(Debug, Error)]
pub enum PlayerError {
    /// Write attempted after the player was shut down.
    ///
    /// Not a real failure: the worker treats this as "stop already
    /// happened", and it is never surfaced to the HTTP caller.
    #[error("player is closed")]
    Closed,

    /// The decoder process failed or could not be spawned.
    #[error("decoder failed: {0}")]
    Decoder(String),

    /// The audio output device failed or could not be opened.
    #[error("audio device failed: {0}")]
    Device(String),

    /// I/O error on the decoder pipe.
    #[error("audio I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Port for one live streaming audio player.
///
/// A player binds a decoder process and an output device together as one
/// scoped resource: both are opened together by [`AudioOutputPort::open`]
/// and must end up closed together on every exit path.
///
/// State machine: `Unopened → Open → Closing → Closed`. [`write`] is only
/// valid in `Open`; calls in other states fail with [`PlayerError::Closed`].
///
/// [`write`]: AudioPlayerPort::write
#[async_trait]
pub trait AudioPlayerPort: Send + Sync {
    /// Append one compressed chunk to the decoder's input.
    ///
    /// May wait briefly when the decoder's pipe buffer is full
    /// (backpressure) — this throttles the producer to the playback rate
    /// and bounds memory if audio is produced faster than it plays.
    async fn write(&self, chunk: AudioChunk) -> Result<(), PlayerError>;

    /// Close the decoder's input, wait for the decoded tail to drain
    /// through the device, then release both resources.
    ///
    /// The normal-completion path. Returns `Ok(())` without waiting if the
    /// player was already shut down (a concurrent stop won the race).
    async fn finish(&self) -> Result<(), PlayerError>;

    /// Forcefully tear down the decoder process and the output device
    /// together, truncating any unplayed tail.
    ///
    /// Safe to call from any thread, concurrently with an in-flight
    /// [`write`] (which unblocks with an error rather than hanging) or with
    /// the internal reader mid-copy. Calling it repeatedly, or on a player
    /// that never played anything, is a no-op.
    ///
    /// [`write`]: AudioPlayerPort::write
    fn shutdown(&self);

    /// Whether the player currently accepts writes.
    fn is_open(&self) -> bool;
}

/// Factory port for opening a fresh player per session.
///
/// Opening acquires both halves of the player resource (decoder process and
/// audio device) and may fail — e.g. the device is busy or the decoder
/// binary is missing.
#[async_trait]
pub trait AudioOutputPort: Send + Sync {
    /// Open a new player bound to a freshly spawned decoder and the output
    /// device.
    async fn open(&self) -> Result<Arc<dyn AudioPlayerPort>, PlayerError>;
}
