//! Bounded output buffering for the running script.
//!
//! Process output is kept as an ordered sequence of whole chunks (lines)
//! under a fixed total character budget. When the budget is exceeded the
//! oldest chunks are dropped whole, never split mid-chunk. The buffer is
//! serializable so other runbar instances can redisplay it from the shared
//! store.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use strip_ansi_escapes::strip;

/// Source stream of an output chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

/// One delimited piece of process output (a line, or a tool notice).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputChunk {
    pub text: String,
    pub stream: StreamKind,
}

/// Append-only buffer of output chunks capped by total character count.
#[derive(Debug, Clone)]
pub struct OutputBuffer {
    max_chars: usize,
    total_chars: usize,
    chunks: VecDeque<OutputChunk>,
}

impl OutputBuffer {
    pub fn new(max_chars: usize) -> Self {
        Self {
            max_chars,
            total_chars: 0,
            chunks: VecDeque::new(),
        }
    }

    /// Appends a chunk, dropping oldest chunks until back under budget.
    ///
    /// Returns `true` if anything was dropped. A single chunk larger than
    /// the whole budget is kept alone rather than lost.
    pub fn push(&mut self, chunk: OutputChunk) -> bool {
        self.total_chars += chunk.text.chars().count();
        self.chunks.push_back(chunk);
        let mut dropped = false;
        while self.total_chars > self.max_chars && self.chunks.len() > 1 {
            if let Some(old) = self.chunks.pop_front() {
                self.total_chars -= old.text.chars().count();
                dropped = true;
            }
        }
        dropped
    }

    pub fn clear(&mut self) {
        self.chunks.clear();
        self.total_chars = 0;
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn total_chars(&self) -> usize {
        self.total_chars
    }

    pub fn iter(&self) -> impl Iterator<Item = &OutputChunk> {
        self.chunks.iter()
    }

    /// Snapshot of the chunks for persisting to the shared store.
    pub fn to_chunks(&self) -> Vec<OutputChunk> {
        self.chunks.iter().cloned().collect()
    }

    /// Rebuilds a buffer from persisted chunks, re-applying the budget.
    pub fn from_chunks(max_chars: usize, chunks: Vec<OutputChunk>) -> Self {
        let mut buffer = Self::new(max_chars);
        for chunk in chunks {
            buffer.push(chunk);
        }
        buffer
    }
}

/// Sanitizes a chunk for display, optionally stripping ANSI escapes.
pub fn sanitize_text(text: &str, strip_ansi: bool) -> String {
    if !strip_ansi {
        return text.to_string();
    }
    let stripped = strip(text.as_bytes());
    String::from_utf8_lossy(&stripped).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(text: &str) -> OutputChunk {
        OutputChunk {
            text: text.into(),
            stream: StreamKind::Stdout,
        }
    }

    #[test]
    fn stays_under_budget_by_dropping_oldest() {
        let mut buffer = OutputBuffer::new(10);
        buffer.push(chunk("aaaa"));
        buffer.push(chunk("bbbb"));
        let dropped = buffer.push(chunk("cccc"));
        assert!(dropped);
        assert!(buffer.total_chars() <= 10);
        let texts: Vec<&str> = buffer.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["bbbb", "cccc"]);
    }

    #[test]
    fn newest_chunk_is_never_dropped() {
        let mut buffer = OutputBuffer::new(4);
        buffer.push(chunk("aa"));
        buffer.push(chunk("a chunk much larger than the budget"));
        assert_eq!(buffer.len(), 1);
        assert_eq!(
            buffer.iter().next().unwrap().text,
            "a chunk much larger than the budget"
        );
    }

    #[test]
    fn drops_are_chunk_aligned() {
        let mut buffer = OutputBuffer::new(12);
        for text in ["one", "two", "three", "four"] {
            buffer.push(chunk(text));
        }
        // Whatever was dropped, each survivor is intact.
        for c in buffer.iter() {
            assert!(["one", "two", "three", "four"].contains(&c.text.as_str()));
        }
        assert!(buffer.total_chars() <= 12);
    }

    #[test]
    fn clear_resets_accounting() {
        let mut buffer = OutputBuffer::new(100);
        buffer.push(chunk("hello"));
        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.total_chars(), 0);
    }

    #[test]
    fn round_trips_through_persisted_chunks() {
        let mut buffer = OutputBuffer::new(100);
        buffer.push(chunk("first"));
        buffer.push(OutputChunk {
            text: "second".into(),
            stream: StreamKind::Stderr,
        });
        let restored = OutputBuffer::from_chunks(100, buffer.to_chunks());
        assert_eq!(restored.to_chunks(), buffer.to_chunks());
    }

    #[test]
    fn sanitize_strips_ansi_when_asked() {
        let colored = "\u{1b}[31mred\u{1b}[0m";
        assert_eq!(sanitize_text(colored, true), "red");
        assert_eq!(sanitize_text(colored, false), colored);
    }
}
