//! Integration tests for the streaming player pipeline.
//!
//! The decoder is replaced by a pass-through pipe (`cat`), so the bytes
//! written as "compressed" chunks are exactly the s16le PCM the reader
//! hands to the sink. A recording sink captures what would have reached
//! the audio device. No ffmpeg and no audio hardware required.

#![cfg(unix)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use speakd_audio::decoder::DecoderCommand;
use speakd_audio::player::StreamingPlayer;
use speakd_audio::sink::SampleSink;
use speakd_core::{AudioChunk, AudioPlayerPort, PlayerError};

const SAMPLE_RATE: u32 = 22_050;

// ── Recording sink ─────────────────────────────────────────────────

#[derive(Default)]
struct RecordingSink {
    samples: Mutex<Vec<f32>>,
    stopped: AtomicBool,
    closed: AtomicBool,
    /// Per-append delay simulating a slow audio device.
    throttle: Option<Duration>,
}

impl RecordingSink {
    fn throttled(delay: Duration) -> Self {
        Self { throttle: Some(delay), ..Self::default() }
    }
}

impl SampleSink for RecordingSink {
    fn append(&self, samples: Vec<f32>, _sample_rate: u32) -> Result<(), PlayerError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(PlayerError::Closed);
        }
        if let Some(delay) = self.throttle {
            std::thread::sleep(delay);
        }
        self.samples.lock().unwrap().extend(samples);
        Ok(())
    }

    fn wait_drained(&self) {}

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_playing(&self) -> bool {
        false
    }
}

// ── Helpers ────────────────────────────────────────────────────────

/// Encode i16 samples as the little-endian bytes the decoder would emit.
fn pcm_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

fn as_f32(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&s| f32::from(s) / 32768.0).collect()
}

fn open_player(sink: Arc<RecordingSink>) -> Arc<StreamingPlayer> {
    StreamingPlayer::open(&DecoderCommand::passthrough(), sink, SAMPLE_RATE)
        .expect("player opens")
}

// ── Tests ──────────────────────────────────────────────────────────

#[tokio::test]
async fn chunks_reach_the_sink_in_write_order() {
    let sink = Arc::new(RecordingSink::default());
    let player = open_player(Arc::clone(&sink));

    let c1: Vec<i16> = (0..100).collect();
    let c2: Vec<i16> = (100..200).collect();
    let c3: Vec<i16> = (200..300).collect();

    for (seq, chunk) in [&c1, &c2, &c3].iter().enumerate() {
        player
            .write(AudioChunk::new(seq as u64, pcm_bytes(chunk)))
            .await
            .expect("write succeeds");
    }
    player.finish().await.expect("finish succeeds");

    let expected: Vec<f32> = [c1, c2, c3].iter().flat_map(|c| as_f32(c)).collect();
    let recorded = sink.samples.lock().unwrap().clone();
    assert_eq!(recorded, expected, "samples must play in exact write order");
    assert!(sink.closed.load(Ordering::SeqCst), "device released on finish");
    assert!(!player.is_open());
}

#[tokio::test]
async fn finish_flushes_the_decoded_tail() {
    let sink = Arc::new(RecordingSink::default());
    let player = open_player(Arc::clone(&sink));

    let samples: Vec<i16> = (0..5_000).collect();
    player.write(AudioChunk::new(0, pcm_bytes(&samples))).await.unwrap();
    player.finish().await.unwrap();

    let recorded = sink.samples.lock().unwrap().len();
    assert_eq!(recorded, samples.len(), "no tail samples may be lost on the drain path");
}

#[tokio::test]
async fn shutdown_rejects_further_writes_and_closes_both_halves() {
    let sink = Arc::new(RecordingSink::default());
    let player = open_player(Arc::clone(&sink));

    player.write(AudioChunk::new(0, pcm_bytes(&[1, 2, 3]))).await.unwrap();
    player.shutdown();

    let err = player.write(AudioChunk::new(1, pcm_bytes(&[4]))).await.unwrap_err();
    assert!(matches!(err, PlayerError::Closed), "write after shutdown must be Closed");

    assert!(!player.is_open());
    assert!(sink.stopped.load(Ordering::SeqCst), "sink truncated");
    assert!(sink.closed.load(Ordering::SeqCst), "device released");
}

#[tokio::test]
async fn shutdown_is_idempotent_and_safe_before_any_write() {
    let sink = Arc::new(RecordingSink::default());
    let player = open_player(Arc::clone(&sink));

    player.shutdown();
    player.shutdown();
    player.shutdown();

    assert!(!player.is_open());
    assert!(sink.samples.lock().unwrap().is_empty());
}

#[tokio::test]
async fn finish_after_shutdown_is_a_quiet_noop() {
    let sink = Arc::new(RecordingSink::default());
    let player = open_player(Arc::clone(&sink));

    player.shutdown();
    player.finish().await.expect("finish after shutdown must not error");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_unblocks_a_concurrent_writer() {
    // A slow sink backs the pipe up until the writer blocks, then a
    // shutdown from another task must fail the writer out promptly.
    let sink = Arc::new(RecordingSink::throttled(Duration::from_millis(2)));
    let player = open_player(Arc::clone(&sink));

    let writer = {
        let player = Arc::clone(&player);
        tokio::spawn(async move {
            let blob = pcm_bytes(&vec![0i16; 1 << 16]);
            let mut seq = 0;
            loop {
                if player.write(AudioChunk::new(seq, blob.clone())).await.is_err() {
                    break;
                }
                seq += 1;
            }
        })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    player.shutdown();

    tokio::time::timeout(Duration::from_secs(2), writer)
        .await
        .expect("writer must unblock after shutdown")
        .expect("writer task must not panic");
}
