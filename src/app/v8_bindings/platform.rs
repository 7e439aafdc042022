//! Global V8 Platform Management
//!
//! Every preview isolate shares one V8 platform. It is created lazily the first
//! time a sandbox boots (or eagerly by the CLI at startup) and lives for the
//! rest of the process.
//!
//! # Example
//!
//! ```no_run
//! use preview_sandbox::app::v8_bindings::initialize_v8_platform;
//!
//! initialize_v8_platform().expect("V8 initialization failed");
//! ```

#![warn(clippy::all, rust_2018_idioms)]

use once_cell::sync::OnceCell;

/// Global V8 platform instance
static GLOBAL_V8_PLATFORM: OnceCell<v8::SharedRef<v8::Platform>> = OnceCell::new();

/// Initialize the V8 platform
///
/// Safe to call from any thread and any number of times; only the first call
/// does work. Isolates must not be created before this has returned `Ok`.
pub fn initialize_v8_platform() -> Result<(), String> {
    GLOBAL_V8_PLATFORM
        .get_or_try_init(|| {
            // 0 = default worker pool size, no idle tasks
            let platform = v8::new_default_platform(0, false).make_shared();

            v8::V8::initialize_platform(platform.clone());
            v8::V8::initialize();

            log_info!("V8 platform initialized for preview isolates");

            Ok(platform)
        })
        .map(|_| ())
}

/// Initialize the platform, converting the failure into an `anyhow` error
pub fn ensure_v8_platform() -> anyhow::Result<()> {
    initialize_v8_platform().map_err(|e| anyhow::anyhow!("V8 platform initialization failed: {}", e))
}

/// Check if V8 platform is initialized
pub fn is_v8_initialized() -> bool {
    GLOBAL_V8_PLATFORM.get().is_some()
}
