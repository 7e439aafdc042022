//! V8 isolation layer for the preview
//!
//! # Architecture
//!
//! - **Platform**: one V8 platform per process, created on first use
//! - **Runtime**: a fresh isolate and context per render cycle, with a heap
//!   limit and a watchdog on every entry
//! - **Capabilities**: the enumerated names a module may see, passed as
//!   wrapper parameters instead of globals
//! - **Console**: a capture-only `console` whose output goes to the
//!   developer log
//!
//! # Usage
//!
//! ```no_run
//! use preview_sandbox::app::v8_bindings::initialize_v8_platform;
//!
//! initialize_v8_platform().expect("Failed to initialize V8");
//! ```

#![warn(clippy::all, rust_2018_idioms)]

pub mod capabilities;
pub mod console;
pub mod platform;
pub mod runtime;

pub use capabilities::{Capability, CapabilitySet, MODULE_PARAMETERS};
pub use console::{register_console, ConsoleBuffers, ConsoleLevel, ConsoleLine};
pub use platform::{ensure_v8_platform, initialize_v8_platform, is_v8_initialized};
pub use runtime::{IsolatedScope, RuntimeConfig, ScopeError};
