//! Incremental sentence assembly for streamed language-model output.
//!
//! The language model delivers text as small deltas; the speech synthesizer
//! wants sentence-sized input. [`SentenceAssembler`] sits between the two:
//! deltas go in, completed sentences come out as soon as their closing
//! punctuation arrives, and [`finish`](SentenceAssembler::finish) flushes
//! whatever partial text remains when the reply ends.

/// Maximum characters buffered before a forced flush.
///
/// Synthesis quality degrades on very long input and first-audio latency
/// grows with it, so a run-on passage with no punctuation is cut at a word
/// boundary once it reaches this size.
const MAX_PIECE_CHARS: usize = 400;

/// Accumulates streamed text deltas and yields sentence-sized pieces.
#[derive(Debug, Default)]
pub struct SentenceAssembler {
    buf: String,
}

impl SentenceAssembler {
    /// Create an empty assembler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one delta; returns any sentences completed by it, in order.
    pub fn push(&mut self, delta: &str) -> Vec<String> {
        self.buf.push_str(delta);

        let mut pieces = Vec::new();
        loop {
            match split_point(&self.buf) {
                Some(at) => {
                    let rest = self.buf.split_off(at);
                    let piece = std::mem::replace(&mut self.buf, rest);
                    let piece = piece.trim();
                    if !piece.is_empty() {
                        pieces.push(piece.to_string());
                    }
                }
                None => break,
            }
        }
        pieces
    }

    /// Flush the remaining partial sentence, if any.
    pub fn finish(&mut self) -> Option<String> {
        let tail = std::mem::take(&mut self.buf);
        let tail = tail.trim();
        (!tail.is_empty()).then(|| tail.to_string())
    }

    /// Whether any text is currently buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.trim().is_empty()
    }
}

/// Find the byte offset just past the first completed sentence, or `None`
/// if the buffer holds no complete sentence yet.
///
/// A sentence completes at `.`, `!` or `?` followed by whitespace (the
/// trailing punctuation of "Mr." mid-stream cannot be disambiguated, so we
/// require the following whitespace to have arrived), or immediately at a
/// CJK full stop `。` `！` `？`, which is never followed by a space.
fn split_point(buf: &str) -> Option<usize> {
    let mut iter = buf.char_indices().peekable();
    while let Some((i, c)) = iter.next() {
        match c {
            '.' | '!' | '?' => {
                if let Some(&(_, next)) = iter.peek() {
                    if next.is_whitespace() {
                        return Some(i + c.len_utf8());
                    }
                }
            }
            '。' | '！' | '？' => return Some(i + c.len_utf8()),
            _ => {}
        }
    }

    // No punctuation in sight — force a cut at the last word boundary once
    // the buffer is oversized.
    if buf.len() > MAX_PIECE_CHARS {
        let cut = buf[..MAX_PIECE_CHARS]
            .char_indices()
            .filter(|(_, c)| c.is_whitespace())
            .map(|(i, _)| i)
            .next_back();
        if let Some(at) = cut {
            if at > 0 {
                return Some(at);
            }
        }
    }
    None
}
