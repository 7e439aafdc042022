//! Host-side session around a sandbox
//!
//! The session accumulates streamed text and decides when to render. Only
//! the latest text matters: chunks that arrive between two renders are
//! coalesced, and a render is skipped when the renderable text has not
//! changed since the previous one.

#![warn(clippy::all, rust_2018_idioms)]

use super::outcome::{PreviewState, RenderOutcome, StateTransition};
use super::PreviewSandbox;
use crate::app::source::{ChunkSource, SourceDocument};

pub struct PreviewSession {
    document: SourceDocument,
    sandbox: PreviewSandbox,
    last_rendered: Option<String>,
    renders: usize,
}

impl PreviewSession {
    pub fn new(sandbox: PreviewSandbox) -> Self {
        Self {
            document: SourceDocument::new(),
            sandbox,
            last_rendered: None,
            renders: 0,
        }
    }

    pub fn document(&self) -> &SourceDocument {
        &self.document
    }

    pub fn sandbox(&self) -> &PreviewSandbox {
        &self.sandbox
    }

    pub fn sandbox_mut(&mut self) -> &mut PreviewSandbox {
        &mut self.sandbox
    }

    /// Number of render cycles actually run
    pub fn render_count(&self) -> usize {
        self.renders
    }

    pub fn state(&self) -> PreviewState {
        self.sandbox.state()
    }

    pub fn transitions(&self) -> &[StateTransition] {
        self.sandbox.transitions()
    }

    pub fn push_chunk(&mut self, chunk: &str) {
        self.document.append_chunk(chunk);
    }

    pub fn replace(&mut self, text: &str) {
        self.document.replace(text);
    }

    /// Start a new generation: empty document and placeholder region
    pub fn reset(&mut self) {
        self.document.clear();
        self.last_rendered = None;
        self.sandbox.reset();
    }

    /// Render the current text unless it was already rendered
    pub fn flush(&mut self) -> RenderOutcome {
        let text = self.document.renderable_text();
        if self.last_rendered.as_deref() == Some(text) {
            return self.sandbox.outcome().clone();
        }
        let text = text.to_string();
        let outcome = self.sandbox.render(&text);
        self.last_rendered = Some(text);
        self.renders += 1;
        outcome
    }

    /// Consume `source` to the end, rendering after every `render_every`
    /// chunks and once more when it is exhausted
    ///
    /// Returns the final outcome.
    pub fn drive(&mut self, source: &mut dyn ChunkSource, render_every: usize) -> RenderOutcome {
        let every = render_every.max(1);
        let mut pending = 0;
        let mut chunks = 0;
        while let Some(chunk) = source.next_chunk() {
            self.push_chunk(&chunk);
            chunks += 1;
            pending += 1;
            if pending >= every {
                pending = 0;
                let outcome = self.flush();
                trace_debug!("After {} chunks: {}", chunks, outcome);
            }
        }
        let outcome = self.flush();
        log_info!(
            "Generation complete after {} chunks and {} renders: {}",
            chunks,
            self.renders,
            outcome
        );
        outcome
    }
}
