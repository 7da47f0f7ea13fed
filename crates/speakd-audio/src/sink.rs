//! Audio output sink — renders raw PCM samples to the system device.
//!
//! `rodio::OutputStream` is `!Send` on some platforms, so the production
//! sink confines it to a dedicated OS thread and proxies every operation
//! through a command channel. The public [`RodioSink`] handle is
//! `Send + Sync` and cheap to call; request–reply commands block the
//! caller for microseconds of local channel I/O plus the audio operation
//! itself.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;

use rodio::{OutputStream, Sink};

use speakd_core::PlayerError;

// ── Sink contract ──────────────────────────────────────────────────

/// Abstraction over an audio output device.
///
/// Object-safe: all methods take `&self`; interior mutability handles
/// state changes. The production implementation is [`RodioSink`]; tests
/// use an in-memory recording sink.
pub trait SampleSink: Send + Sync {
    /// Queue samples for playback. May wait on the device buffer.
    fn append(&self, samples: Vec<f32>, sample_rate: u32) -> Result<(), PlayerError>;

    /// Block until all queued audio has played (or playback was stopped).
    fn wait_drained(&self);

    /// Truncate any unplayed audio immediately. Idempotent, callable from
    /// any thread.
    fn stop(&self);

    /// Release the device. Idempotent; the sink accepts nothing after.
    fn close(&self);

    /// Whether queued audio is still playing.
    fn is_playing(&self) -> bool;
}

// ── Actor commands ─────────────────────────────────────────────────

enum SinkCommand {
    Append {
        samples: Vec<f32>,
        sample_rate: u32,
        reply: mpsc::Sender<Result<(), PlayerError>>,
    },
    WaitDrained {
        reply: mpsc::Sender<()>,
    },
    Stop,
    IsPlaying {
        reply: mpsc::Sender<bool>,
    },
    Shutdown,
}

// ── Rodio sink ─────────────────────────────────────────────────────

/// `Send + Sync` handle to the dedicated audio output thread.
pub struct RodioSink {
    cmd_tx: mpsc::Sender<SinkCommand>,
    thread: Mutex<Option<thread::JoinHandle<()>>>,
    closed: AtomicBool,
}

impl RodioSink {
    /// Spawn the audio thread and open the default output device on it.
    ///
    /// Device-open failures are propagated back through a one-shot init
    /// channel.
    pub fn open() -> Result<Self, PlayerError> {
        let (cmd_tx, cmd_rx) = mpsc::channel::<SinkCommand>();
        let (init_tx, init_rx) = mpsc::channel::<Result<(), PlayerError>>();

        let thread = thread::Builder::new()
            .name("speakd-audio".into())
            .spawn(move || Self::run(&cmd_rx, &init_tx))
            .map_err(|e| PlayerError::Device(format!("failed to spawn audio thread: {e}")))?;

        init_rx
            .recv()
            .map_err(|_| PlayerError::Device("audio thread died during init".to_string()))??;

        Ok(Self { cmd_tx, thread: Mutex::new(Some(thread)), closed: AtomicBool::new(false) })
    }

    /// Actor body: owns the output stream and sink for their entire
    /// lifetime — they never cross thread boundaries.
    fn run(cmd_rx: &mpsc::Receiver<SinkCommand>, init_tx: &mpsc::Sender<Result<(), PlayerError>>) {
        let stream = match OutputStream::try_default() {
            Ok((stream, handle)) => {
                if init_tx.send(Ok(())).is_err() {
                    return;
                }
                (stream, handle)
            }
            Err(e) => {
                let _ = init_tx.send(Err(PlayerError::Device(e.to_string())));
                return;
            }
        };
        let (_stream, stream_handle) = stream;
        let mut sink: Option<Arc<Sink>> = None;

        while let Ok(cmd) = cmd_rx.recv() {
            match cmd {
                SinkCommand::Append { samples, sample_rate, reply } => {
                    let result = match ensure_sink(&mut sink, &stream_handle) {
                        Ok(sink) => {
                            sink.append(rodio::buffer::SamplesBuffer::new(
                                1,
                                sample_rate,
                                samples,
                            ));
                            Ok(())
                        }
                        Err(e) => Err(e),
                    };
                    let _ = reply.send(result);
                }

                SinkCommand::WaitDrained { reply } => {
                    // sleep_until_end would wedge the actor; a watcher
                    // thread sleeps instead, so a Stop command can still
                    // cut playback short (which also wakes the watcher).
                    if let Some(sink) = sink.clone() {
                        thread::spawn(move || {
                            sink.sleep_until_end();
                            let _ = reply.send(());
                        });
                    } else {
                        let _ = reply.send(());
                    }
                }

                SinkCommand::Stop => {
                    if let Some(ref sink) = sink {
                        sink.stop();
                    }
                }

                SinkCommand::IsPlaying { reply } => {
                    let _ = reply.send(sink.as_ref().is_some_and(|s| !s.empty()));
                }

                SinkCommand::Shutdown => break,
            }
        }

        // The output stream is dropped here, releasing the device.
        tracing::debug!("audio output thread shutting down");
    }
}

/// Lazily create the rodio sink on first append.
fn ensure_sink(
    slot: &mut Option<Arc<Sink>>,
    handle: &rodio::OutputStreamHandle,
) -> Result<Arc<Sink>, PlayerError> {
    if let Some(sink) = slot {
        return Ok(Arc::clone(sink));
    }
    let sink = Sink::try_new(handle).map_err(|e| PlayerError::Device(e.to_string()))?;
    let sink = Arc::new(sink);
    *slot = Some(Arc::clone(&sink));
    Ok(sink)
}

impl SampleSink for RodioSink {
    fn append(&self, samples: Vec<f32>, sample_rate: u32) -> Result<(), PlayerError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(PlayerError::Closed);
        }
        let (reply, rx) = mpsc::channel();
        self.cmd_tx
            .send(SinkCommand::Append { samples, sample_rate, reply })
            .map_err(|_| PlayerError::Device("audio thread died".to_string()))?;
        rx.recv().map_err(|_| PlayerError::Device("audio thread died".to_string()))?
    }

    fn wait_drained(&self) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        let (reply, rx) = mpsc::channel();
        if self.cmd_tx.send(SinkCommand::WaitDrained { reply }).is_ok() {
            let _ = rx.recv();
        }
    }

    fn stop(&self) {
        let _ = self.cmd_tx.send(SinkCommand::Stop);
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.cmd_tx.send(SinkCommand::Shutdown);
        if let Some(handle) = self.thread.lock().expect("audio thread lock poisoned").take() {
            let _ = handle.join();
        }
    }

    fn is_playing(&self) -> bool {
        if self.closed.load(Ordering::SeqCst) {
            return false;
        }
        let (reply, rx) = mpsc::channel();
        if self.cmd_tx.send(SinkCommand::IsPlaying { reply }).is_err() {
            return false;
        }
        rx.recv().unwrap_or(false)
    }
}

impl Drop for RodioSink {
    fn drop(&mut self) {
        self.close();
    }
}
