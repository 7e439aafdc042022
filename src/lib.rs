//! Preview Sandbox - isolated live preview for generated UI components
//!
//! A prompt-to-UI tool streams model-generated component source (TSX) into
//! this crate, which renders it as a running view without letting it touch
//! the host. Every failure, from a half-written token to an exception thrown
//! by a click handler minutes after mounting, becomes a visible error in the
//! output region instead of propagating.
//!
//! # Core Features
//!
//! - **TSX transform**: TypeScript and JSX lowered to plain JavaScript with
//!   tree-sitter, reporting the first syntax error with its position
//! - **Isolation**: a fresh V8 isolate per render with a heap limit, an
//!   execution timeout and an explicit capability set
//! - **Rendering library**: a small React-compatible runtime (hooks, context,
//!   class components, error boundaries) evaluated inside the isolate
//! - **Interaction**: event dispatch and a virtual clock for timers and
//!   animation frames after mount
//! - **Streaming**: [`PreviewSession`] coalesces incoming chunks and skips
//!   renders of unchanged text
//!
//! # Getting Started
//!
//! ```no_run
//! use preview_sandbox::{PreviewSandbox, RenderOutcome};
//!
//! let mut sandbox = PreviewSandbox::new();
//! match sandbox.render("export default () => <button>Go</button>;") {
//!     RenderOutcome::Displayed => println!("{}", sandbox.region().to_html()),
//!     RenderOutcome::Errored(err) => eprintln!("{}", err),
//!     RenderOutcome::Empty => {}
//! }
//! ```

#![warn(clippy::all, rust_2018_idioms)]

// Include logging macros first
#[macro_use]
pub mod logging_macros;

pub mod app;

pub use app::config::PreviewConfig;
pub use app::preview::{PreviewError, PreviewEvent, PreviewSandbox, PreviewSession, PreviewState, RenderOutcome};
