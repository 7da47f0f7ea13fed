//! Streaming audio player — decoder process and output device bound into
//! one scoped resource.
//!
//! Ordered chunks go in via [`write`](StreamingPlayer::write); a reader
//! task pumps decoded PCM from the child's stdout into the sink
//! independently, so decode and playback overlap with chunk production.
//! Teardown closes both halves together on every path: the drain path
//! ([`finish`](StreamingPlayer::finish)) and the forced path
//! ([`shutdown`](StreamingPlayer::shutdown)), which is safe against
//! concurrent writes and the reader mid-copy.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::process::ChildStdout;
use tokio::task::JoinHandle;

use speakd_core::{AudioChunk, AudioOutputPort, AudioPlayerPort, PlayerError};

use crate::decoder::{DECODE_SAMPLE_RATE, DecoderCommand, StreamingDecoder};
use crate::sink::{RodioSink, SampleSink};

/// Reader granularity. Small on purpose: the smaller the read, the sooner
/// a stop is audible (the device buffer holds at most this much undrained
/// PCM beyond what the sink already queued).
const PCM_READ_BYTES: usize = 512;

// Construction is the `Unopened → Open` edge of the player state machine;
// a `StreamingPlayer` value never exists in the unopened phase.
const PHASE_OPEN: u8 = 1;
const PHASE_CLOSING: u8 = 2;
const PHASE_CLOSED: u8 = 3;

/// One live player: decoder child + output sink + PCM reader task.
pub struct StreamingPlayer {
    decoder: StreamingDecoder,
    sink: Arc<dyn SampleSink>,
    sample_rate: u32,
    phase: AtomicU8,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl StreamingPlayer {
    /// Spawn the decoder and start the reader task. Both halves of the
    /// resource are live when this returns.
    pub fn open(
        cmd: &DecoderCommand,
        sink: Arc<dyn SampleSink>,
        sample_rate: u32,
    ) -> Result<Arc<Self>, PlayerError> {
        let decoder = StreamingDecoder::spawn(cmd)?;
        let stdout = decoder
            .take_output()
            .ok_or_else(|| PlayerError::Decoder("decoder stdout unavailable".to_string()))?;

        let player = Arc::new(Self {
            decoder,
            sink: Arc::clone(&sink),
            sample_rate,
            phase: AtomicU8::new(PHASE_OPEN),
            reader: Mutex::new(None),
        });

        let reader = tokio::spawn(Self::reader_loop(stdout, sink, sample_rate));
        *player.reader.lock().expect("reader handle lock poisoned") = Some(reader);

        Ok(player)
    }

    /// Pump decoded PCM from the child to the sink until EOF.
    ///
    /// EOF arrives either naturally (input closed, output flushed) or
    /// because `shutdown` killed the child; either way the loop exits
    /// without external coordination.
    async fn reader_loop(mut stdout: ChildStdout, sink: Arc<dyn SampleSink>, sample_rate: u32) {
        let mut buf = [0u8; PCM_READ_BYTES];
        let mut carry: Option<u8> = None;

        loop {
            match stdout.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    let samples = s16le_to_f32(&mut carry, &buf[..n]);
                    if samples.is_empty() {
                        continue;
                    }
                    if sink.append(samples, sample_rate).is_err() {
                        // Device gone — stop pulling; shutdown handles the child.
                        break;
                    }
                }
                Err(e) => {
                    tracing::debug!(error = %e, "decoder output read ended");
                    break;
                }
            }
        }
        tracing::debug!("player reader task exited");
    }

    fn phase(&self) -> u8 {
        self.phase.load(Ordering::SeqCst)
    }

    fn take_reader(&self) -> Option<JoinHandle<()>> {
        self.reader.lock().expect("reader handle lock poisoned").take()
    }
}

#[async_trait]
impl AudioPlayerPort for StreamingPlayer {
    async fn write(&self, chunk: AudioChunk) -> Result<(), PlayerError> {
        if self.phase() != PHASE_OPEN {
            return Err(PlayerError::Closed);
        }
        match self.decoder.feed(&chunk.bytes).await {
            Ok(()) => Ok(()),
            Err(PlayerError::Closed) => Err(PlayerError::Closed),
            // A write that failed because shutdown broke the pipe under it
            // is a stop consequence, not a decoder fault.
            Err(_) if self.phase() != PHASE_OPEN => Err(PlayerError::Closed),
            Err(e) => Err(e),
        }
    }

    async fn finish(&self) -> Result<(), PlayerError> {
        if self
            .phase
            .compare_exchange(PHASE_OPEN, PHASE_CLOSING, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            // Already closing or closed — a concurrent stop won the race.
            return Ok(());
        }

        self.decoder.close_input().await;
        if let Some(reader) = self.take_reader() {
            let _ = reader.await;
        }
        self.decoder.wait().await;

        // The sink drain blocks on real playback; keep it off the runtime.
        let sink = Arc::clone(&self.sink);
        let drained = tokio::task::spawn_blocking(move || sink.wait_drained()).await;
        if drained.is_err() {
            tracing::debug!("sink drain task cancelled");
        }

        self.sink.close();
        self.phase.store(PHASE_CLOSED, Ordering::SeqCst);
        tracing::debug!("player finished and closed");
        Ok(())
    }

    fn shutdown(&self) {
        let prev = self.phase.swap(PHASE_CLOSED, Ordering::SeqCst);
        if prev == PHASE_CLOSED {
            return;
        }
        // Kill the decoder first: that unblocks a backpressured write and
        // EOFs the reader. Then truncate and release the device. Both
        // halves are down when this returns.
        self.decoder.shutdown();
        self.sink.stop();
        self.sink.close();
        tracing::debug!("player shut down");
    }

    fn is_open(&self) -> bool {
        self.phase() == PHASE_OPEN
    }
}

impl Drop for StreamingPlayer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Convert 16-bit little-endian PCM to f32 samples, carrying a split byte
/// across reads.
fn s16le_to_f32(carry: &mut Option<u8>, bytes: &[u8]) -> Vec<f32> {
    let mut samples = Vec::with_capacity(bytes.len() / 2 + 1);
    let mut iter = bytes.iter().copied();

    if let Some(low) = carry.take() {
        if let Some(high) = iter.next() {
            samples.push(f32::from(i16::from_le_bytes([low, high])) / 32768.0);
        } else {
            *carry = Some(low);
            return samples;
        }
    }

    loop {
        let Some(low) = iter.next() else { break };
        let Some(high) = iter.next() else {
            *carry = Some(low);
            break;
        };
        samples.push(f32::from(i16::from_le_bytes([low, high])) / 32768.0);
    }
    samples
}

// ── Factory ────────────────────────────────────────────────────────

/// Production [`AudioOutputPort`]: a fresh decoder child plus the system's
/// default output device per session.
pub struct LocalAudioOutput {
    cmd: DecoderCommand,
    sample_rate: u32,
}

impl LocalAudioOutput {
    /// Factory using the given decode command.
    #[must_use]
    pub const fn new(cmd: DecoderCommand, sample_rate: u32) -> Self {
        Self { cmd, sample_rate }
    }
}

impl Default for LocalAudioOutput {
    fn default() -> Self {
        Self::new(DecoderCommand::default(), DECODE_SAMPLE_RATE)
    }
}

#[async_trait]
impl AudioOutputPort for LocalAudioOutput {
    async fn open(&self) -> Result<Arc<dyn AudioPlayerPort>, PlayerError> {
        // Device acquisition spawns a thread and can block on the OS.
        let sink = tokio::task::spawn_blocking(RodioSink::open)
            .await
            .map_err(|e| PlayerError::Device(format!("audio init task failed: {e}")))??;
        let player = StreamingPlayer::open(&self.cmd, Arc::new(sink), self.sample_rate)?;
        Ok(player as Arc<dyn AudioPlayerPort>)
    }
}
