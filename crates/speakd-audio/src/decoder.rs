//! Streaming decoder — a child process wrapped as an incremental
//! bytes-in / PCM-out pipe.
//!
//! The production command is ffmpeg decoding compressed audio to 16-bit
//! little-endian mono PCM. The command is configurable so tests can run
//! the pipeline through a pass-through pipe (`cat`) without ffmpeg
//! installed.

use std::process::Stdio;
use std::sync::Mutex;

use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdout, Command};

use speakd_core::PlayerError;

/// PCM sample rate the decoder is asked to produce.
pub const DECODE_SAMPLE_RATE: u32 = 22_050;

/// The decode command line: program + arguments.
#[derive(Debug, Clone)]
pub struct DecoderCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl DecoderCommand {
    /// ffmpeg decoding anything on stdin to s16le mono PCM on stdout.
    #[must_use]
    pub fn ffmpeg(program: impl Into<String>, sample_rate: u32) -> Self {
        Self {
            program: program.into(),
            args: vec![
                "-hide_banner".to_string(),
                "-loglevel".to_string(),
                "error".to_string(),
                "-i".to_string(),
                "pipe:0".to_string(),
                "-f".to_string(),
                "s16le".to_string(),
                "-ar".to_string(),
                sample_rate.to_string(),
                "-ac".to_string(),
                "1".to_string(),
                "pipe:1".to_string(),
            ],
        }
    }

    /// Identity pipe for tests: bytes in, same bytes out.
    #[must_use]
    pub fn passthrough() -> Self {
        Self { program: "cat".to_string(), args: Vec::new() }
    }
}

impl Default for DecoderCommand {
    fn default() -> Self {
        Self::ffmpeg("ffmpeg", DECODE_SAMPLE_RATE)
    }
}

/// A spawned decoder process with its two pipe ends.
///
/// `feed` writes compressed bytes to the child's stdin; the stdout half is
/// taken once by the player's reader task. [`shutdown`](Self::shutdown)
/// kills the child from any thread — the broken pipe then unblocks a
/// writer stuck in `feed` and EOFs the reader, without either side
/// cooperating.
#[derive(Debug)]
pub struct StreamingDecoder {
    child: Mutex<Option<Child>>,
    stdin: tokio::sync::Mutex<Option<tokio::process::ChildStdin>>,
    stdout: Mutex<Option<ChildStdout>>,
}

impl StreamingDecoder {
    /// Spawn the decode process with piped stdin/stdout.
    pub fn spawn(cmd: &DecoderCommand) -> Result<Self, PlayerError> {
        let mut child = Command::new(&cmd.program)
            .args(&cmd.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                PlayerError::Decoder(format!("failed to spawn {}: {e}", cmd.program))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| PlayerError::Decoder("decoder stdin not piped".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| PlayerError::Decoder("decoder stdout not piped".to_string()))?;

        tracing::debug!(program = %cmd.program, "decoder process spawned");

        Ok(Self {
            child: Mutex::new(Some(child)),
            stdin: tokio::sync::Mutex::new(Some(stdin)),
            stdout: Mutex::new(Some(stdout)),
        })
    }

    /// Write compressed bytes to the decoder's input.
    ///
    /// May wait when the pipe buffer is full (backpressure). Fails with
    /// [`PlayerError::Closed`] once the input has been closed or the child
    /// killed.
    pub async fn feed(&self, bytes: &[u8]) -> Result<(), PlayerError> {
        let mut guard = self.stdin.lock().await;
        let Some(stdin) = guard.as_mut() else {
            return Err(PlayerError::Closed);
        };
        stdin
            .write_all(bytes)
            .await
            .map_err(|e| PlayerError::Decoder(format!("decoder pipe write failed: {e}")))?;
        stdin
            .flush()
            .await
            .map_err(|e| PlayerError::Decoder(format!("decoder pipe flush failed: {e}")))
    }

    /// Close the decoder's input, signalling end-of-stream.
    ///
    /// The child flushes its remaining output and exits; the reader sees a
    /// clean EOF. Idempotent.
    pub async fn close_input(&self) {
        let mut guard = self.stdin.lock().await;
        if let Some(mut stdin) = guard.take() {
            let _ = stdin.shutdown().await;
        }
    }

    /// Take the PCM output end. Yields `Some` exactly once.
    pub fn take_output(&self) -> Option<ChildStdout> {
        self.stdout.lock().expect("decoder stdout lock poisoned").take()
    }

    /// Kill the child immediately and let the runtime reap it.
    ///
    /// Callable from any thread, repeatedly. A writer blocked in
    /// [`feed`](Self::feed) gets a broken pipe; the reader gets EOF.
    pub fn shutdown(&self) {
        let child = self.child.lock().expect("decoder child lock poisoned").take();
        if let Some(mut child) = child {
            if let Err(e) = child.start_kill() {
                tracing::debug!(error = %e, "decoder already exited");
            }
            // Reap asynchronously when a runtime is available; otherwise
            // kill_on_drop has already delivered the signal and the tokio
            // orphan reaper collects the exit status.
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    let _ = child.wait().await;
                });
            }
        }
        // Drop the write end if nobody is mid-write; a blocked writer is
        // unblocked by the broken pipe instead.
        if let Ok(mut guard) = self.stdin.try_lock() {
            guard.take();
        }
    }

    /// Wait for the child to exit on its own (used after a clean EOF).
    pub async fn wait(&self) {
        let child = self.child.lock().expect("decoder child lock poisoned").take();
        if let Some(mut child) = child {
            let _ = child.wait().await;
        }
    }
}
