//! Core modules of the preview sandbox.
//!
//! # Module Organization
//!
//! - [`preview`] - the sandbox renderer, its transform stage, output region
//!   and host session
//! - [`v8_bindings`] - isolate lifecycle, capabilities and console capture
//! - [`source`] - the streamed source document and chunk sources
//! - [`config`] - TOML settings for runtime limits, capabilities and output
//!
//! # Architecture
//!
//! Text flows from a [`source::ChunkSource`] into a [`source::SourceDocument`],
//! then through [`preview::PreviewSession`] into [`preview::PreviewSandbox`],
//! which transforms it, runs it in an [`v8_bindings::IsolatedScope`] and shows
//! the result in its [`preview::OutputRegion`].

pub mod config;
pub mod preview;
pub mod source;
pub mod v8_bindings;

pub use preview::{PreviewSandbox, PreviewSession, RenderOutcome};
