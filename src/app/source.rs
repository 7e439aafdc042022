//! Source document and chunk sources
//!
//! The [`SourceDocument`] holds the latest accumulated component source. It
//! is replaced wholesale or grown chunk by chunk while a generation streams
//! in, and may be syntactically invalid at any moment.

#![warn(clippy::all, rust_2018_idioms)]

use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Duration;

/// Opening fence of a fenced code block, optionally tagged with a language
static OPENING_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]*```[ \t]*(?:tsx|typescript|ts|jsx|javascript|js)?[ \t]*\r?\n")
        .expect("valid fence regex")
});

static CLOSING_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*```[ \t]*$").expect("valid fence regex"));

/// Component source being generated
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceDocument {
    text: String,
}

impl SourceDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_text(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// Replace the whole text
    pub fn replace(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    /// Append a streamed chunk
    ///
    /// Leading whitespace is trimmed while the document is still empty, so a
    /// generation that opens with blank lines starts at its first token.
    pub fn append_chunk(&mut self, chunk: &str) {
        if self.text.is_empty() {
            self.text.push_str(chunk.trim_start());
        } else {
            self.text.push_str(chunk);
        }
    }

    pub fn clear(&mut self) {
        self.text.clear();
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// The text handed to the renderer
    ///
    /// A fenced code block is unwrapped to its body; a fence that has opened
    /// but not yet closed yields everything after the opening line.
    pub fn renderable_text(&self) -> &str {
        extract_code_block(&self.text)
    }
}

/// Body of the first fenced code block in `text`, or `text` itself
pub fn extract_code_block(text: &str) -> &str {
    let Some(opening) = OPENING_FENCE.find(text) else {
        return text;
    };
    let body = &text[opening.end()..];
    match CLOSING_FENCE.find(body) {
        Some(closing) => &body[..closing.start()],
        None => body,
    }
}

/// Incremental supplier of source text
pub trait ChunkSource {
    /// Next chunk, or `None` once the generation is complete
    fn next_chunk(&mut self) -> Option<String>;
}

/// Replays a string as a sequence of chunks
#[derive(Debug, Clone)]
pub struct StringChunkSource {
    chunks: Vec<String>,
    position: usize,
    delay: Option<Duration>,
}

impl StringChunkSource {
    /// Split `text` into chunks of at most `chunk_size` characters
    pub fn new(text: &str, chunk_size: usize) -> Self {
        let size = chunk_size.max(1);
        let chars: Vec<char> = text.chars().collect();
        let chunks = chars.chunks(size).map(|c| c.iter().collect()).collect();
        Self {
            chunks,
            position: 0,
            delay: None,
        }
    }

    pub fn from_chunks<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            chunks: chunks.into_iter().map(Into::into).collect(),
            position: 0,
            delay: None,
        }
    }

    /// Sleep before each chunk, like a model emitting tokens
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

impl ChunkSource for StringChunkSource {
    fn next_chunk(&mut self) -> Option<String> {
        let chunk = self.chunks.get(self.position)?.clone();
        self.position += 1;
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        Some(chunk)
    }
}
