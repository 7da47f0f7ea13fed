//! Incremental server-sent-events decoding.
//!
//! The chat endpoint delivers SSE frames over a chunked body; network
//! chunk boundaries fall anywhere, including mid-line. [`SseDecoder`]
//! buffers raw bytes and yields complete `data:` payloads as they close.

/// Stateful decoder: bytes in, complete `data:` payloads out.
#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    buf: Vec<u8>,
}

impl SseDecoder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Feed raw body bytes; returns the `data:` payloads of every frame
    /// completed by them, in order.
    pub(crate) fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(bytes);

        let mut payloads = Vec::new();
        while let Some(end) = frame_end(&self.buf) {
            let frame: Vec<u8> = self.buf.drain(..end.next_start).take(end.frame_len).collect();
            if let Some(payload) = data_payload(&frame) {
                payloads.push(payload);
            }
        }
        payloads
    }
}

/// Where a complete frame ends inside `buf`.
struct FrameEnd {
    /// Bytes belonging to the frame itself (separator excluded).
    frame_len: usize,
    /// Offset of the byte after the separator.
    next_start: usize,
}

/// Find the first blank-line separator (`\n\n` or `\r\n\r\n`).
fn frame_end(buf: &[u8]) -> Option<FrameEnd> {
    let mut i = 0;
    while i + 1 < buf.len() {
        if buf[i] == b'\n' && buf[i + 1] == b'\n' {
            return Some(FrameEnd { frame_len: i, next_start: i + 2 });
        }
        if i + 3 < buf.len() && &buf[i..i + 4] == b"\r\n\r\n" {
            return Some(FrameEnd { frame_len: i, next_start: i + 4 });
        }
        i += 1;
    }
    None
}

/// Extract the concatenated `data:` payload of one frame, if any.
///
/// Comment lines (`:`) and fields other than `data` are ignored, per the
/// SSE grammar. Multiple `data:` lines in one frame join with `\n`.
fn data_payload(frame: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(frame);
    let mut parts: Vec<&str> = Vec::new();
    for line in text.lines() {
        if let Some(rest) = line.strip_prefix("data:") {
            parts.push(rest.strip_prefix(' ').unwrap_or(rest));
        }
    }
    (!parts.is_empty()).then(|| parts.join("\n"))
}
