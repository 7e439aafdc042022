//! Isolated V8 scope for one preview cycle
//!
//! An [`IsolatedScope`] owns a fresh isolate and context. It is booted with a
//! runtime script (the rendering library) that evaluates to a host object; the
//! host object is kept as a V8 handle on the Rust side and is never reachable
//! from code running inside the context. Modules are loaded through that
//! object with the granted [`CapabilitySet`], and later calls (mount, events,
//! timers) go through it as well.
//!
//! Every entry into the isolate is guarded by a watchdog thread that
//! terminates execution after [`RuntimeConfig::timeout`]. Running into the
//! heap limit terminates execution too, instead of V8's fatal out-of-memory
//! abort.
//!
//! # Example
//!
//! ```no_run
//! use preview_sandbox::app::v8_bindings::{CapabilitySet, IsolatedScope, RuntimeConfig};
//!
//! let runtime = "({ ping(value) { return JSON.stringify({ pong: value }); } })";
//! let mut scope =
//!     IsolatedScope::boot(&RuntimeConfig::default(), &CapabilitySet::none(), runtime).unwrap();
//! let reply = scope.call("ping", &["1".to_string()]).unwrap();
//! assert_eq!(reply, r#"{"pong":"1"}"#);
//! ```

#![warn(clippy::all, rust_2018_idioms)]

use anyhow::{anyhow, Result};
use once_cell::sync::OnceCell;
use std::ffi::c_void;
use std::fmt;
use std::pin::pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::capabilities::CapabilitySet;
use super::console::{register_console, ConsoleBuffers, ConsoleRegistration};
use super::platform::ensure_v8_platform;

/// Configuration for isolate creation and execution
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    /// Maximum heap size in bytes (default: 256MB)
    pub max_heap_size_bytes: usize,

    /// Limit for any single entry into the isolate (default: 5 seconds)
    pub timeout: Duration,

    /// Keep console output for the developer log (default: true)
    pub capture_console: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_heap_size_bytes: 256 * 1024 * 1024,
            timeout: Duration::from_secs(5),
            capture_console: true,
        }
    }
}

/// Failure while running code inside the isolate
#[derive(Debug, Clone, PartialEq)]
pub enum ScopeError {
    /// The module wrapper did not compile
    Compile(String),
    /// An exception escaped the runtime's own containment
    Exception(String),
    /// The watchdog terminated execution
    Terminated(Duration),
    /// Execution was terminated on reaching the heap limit
    HeapLimit,
    /// The runtime or host object is not usable
    Internal(String),
}

impl fmt::Display for ScopeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeError::Compile(msg) => write!(f, "{}", msg),
            ScopeError::Exception(msg) => write!(f, "{}", msg),
            ScopeError::Terminated(timeout) => {
                write!(f, "Execution terminated (timeout: {:?})", timeout)
            }
            ScopeError::HeapLimit => write!(f, "Execution terminated: heap limit exceeded"),
            ScopeError::Internal(msg) => write!(f, "Preview runtime failure: {}", msg),
        }
    }
}

impl std::error::Error for ScopeError {}

/// Read the pending exception of a `TryCatch` scope as text
macro_rules! caught_message {
    ($scope:ident) => {{
        match $scope.exception() {
            Some(exception) => match exception.to_string($scope) {
                Some(text) => text.to_rust_string_lossy($scope),
                None => "Unknown error".to_string(),
            },
            None => "Unknown error".to_string(),
        }
    }};
}

/// Terminates the isolate if an entry runs past its deadline
struct Watchdog {
    cancel: Option<mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
    fired: Arc<AtomicBool>,
}

impl Watchdog {
    fn arm(handle: v8::IsolateHandle, timeout: Duration) -> Self {
        let (cancel, cancelled) = mpsc::channel::<()>();
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();

        let thread = thread::spawn(move || {
            if let Err(RecvTimeoutError::Timeout) = cancelled.recv_timeout(timeout) {
                flag.store(true, Ordering::SeqCst);
                handle.terminate_execution();
            }
        });

        Self {
            cancel: Some(cancel),
            thread: Some(thread),
            fired,
        }
    }

    /// Stop the watchdog; returns whether it fired
    fn disarm(&mut self) -> bool {
        drop(self.cancel.take());
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        self.fired.load(Ordering::SeqCst)
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.disarm();
    }
}

/// Headroom granted past the heap limit so a terminated script can unwind
const HEAP_LIMIT_GRACE_BYTES: usize = 32 * 1024 * 1024;

/// Target of the near-heap-limit callback
///
/// Boxed so its address stays fixed while the isolate holds it, and created
/// before the isolate so it is dropped after it.
#[derive(Default)]
struct HeapGuard {
    handle: OnceCell<v8::IsolateHandle>,
    reached: AtomicBool,
}

impl HeapGuard {
    /// Register with `isolate`; `self` must be the boxed guard
    fn install(&self, isolate: &mut v8::OwnedIsolate) {
        let _ = self.handle.set(isolate.thread_safe_handle());
        let data = self as *const HeapGuard as *mut c_void;
        isolate.add_near_heap_limit_callback(near_heap_limit, data);
    }

    /// Whether the limit was reached since the last check
    fn take_reached(&self) -> bool {
        self.reached.swap(false, Ordering::SeqCst)
    }
}

extern "C" fn near_heap_limit(
    data: *mut c_void,
    current_heap_limit: usize,
    _initial_heap_limit: usize,
) -> usize {
    // SAFETY: `data` is the boxed HeapGuard installed for this isolate, and
    // the guard outlives the isolate.
    let guard = unsafe { &*(data as *const HeapGuard) };
    guard.reached.store(true, Ordering::SeqCst);
    if let Some(handle) = guard.handle.get() {
        handle.terminate_execution();
    }
    current_heap_limit.saturating_add(HEAP_LIMIT_GRACE_BYTES)
}

/// A booted isolate holding the rendering runtime
///
/// Confined to the thread that booted it. Only one scope should be alive per
/// thread at a time: V8 isolates are entered on creation and must be dropped
/// in reverse order.
pub struct IsolatedScope {
    // Handles are released before the isolate that owns them.
    host: v8::Global<v8::Object>,
    context: v8::Global<v8::Context>,
    isolate: v8::OwnedIsolate,
    heap_guard: Box<HeapGuard>,
    console: ConsoleRegistration,
    config: RuntimeConfig,
    manifest: String,
    capabilities: CapabilitySet,
}

impl IsolatedScope {
    /// Create a fresh isolate and evaluate the runtime script in it
    ///
    /// The script's completion value must be an object; its methods become
    /// the host interface used by [`IsolatedScope::call`].
    pub fn boot(
        config: &RuntimeConfig,
        capabilities: &CapabilitySet,
        runtime_source: &str,
    ) -> Result<Self> {
        ensure_v8_platform()?;
        let start_time = Instant::now();

        let heap_guard = Box::new(HeapGuard::default());
        let params = v8::CreateParams::default().heap_limits(0, config.max_heap_size_bytes);
        let mut isolate = v8::Isolate::new(params);
        heap_guard.install(&mut isolate);

        let mut watchdog = Watchdog::arm(isolate.thread_safe_handle(), config.timeout);

        let booted = {
            let scope = pin!(v8::HandleScope::new(&mut isolate));
            let scope = &mut scope.init();
            let context = v8::Context::new(scope, Default::default());
            let scope = &mut v8::ContextScope::new(scope, context);

            let console = register_console(scope, ConsoleBuffers::new());

            let source = v8::String::new(scope, runtime_source)
                .ok_or_else(|| anyhow!("Failed to create V8 string from runtime source"))?;

            let scope = pin!(v8::TryCatch::new(scope));
            let scope = &mut scope.init();

            let script = match v8::Script::compile(scope, source, None) {
                Some(script) => script,
                None => {
                    let message = caught_message!(scope);
                    return Err(anyhow!("Preview runtime failed to compile: {}", message));
                }
            };

            let value = match script.run(scope) {
                Some(value) => value,
                None => {
                    if scope.has_terminated() {
                        return Err(anyhow!("Preview runtime timed out during startup"));
                    }
                    let message = caught_message!(scope);
                    return Err(anyhow!("Preview runtime failed to start: {}", message));
                }
            };

            let host = v8::Local::<v8::Object>::try_from(value)
                .map_err(|_| anyhow!("Preview runtime did not evaluate to an object"))?;

            let host = v8::Global::new(scope, host);
            let context = v8::Global::new(scope, context);
            (host, context, console)
        };

        if watchdog.disarm() {
            return Err(anyhow!("Preview runtime timed out during startup"));
        }
        if heap_guard.take_reached() {
            return Err(anyhow!("Preview runtime exceeded the heap limit during startup"));
        }

        let (host, context, console) = booted;
        trace_debug!(
            "Isolated scope booted in {}ms with capabilities [{}]",
            start_time.elapsed().as_millis(),
            capabilities.bindings().join(", ")
        );

        Ok(Self {
            host,
            context,
            isolate,
            heap_guard,
            console,
            config: config.clone(),
            manifest: capabilities.manifest_json(),
            capabilities: capabilities.clone(),
        })
    }

    pub fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    /// Compile a module body inside the capability wrapper and hand the
    /// resulting factory to the runtime's `load(factory, manifest)`
    ///
    /// Returns the runtime's reply text.
    pub fn load_module(&mut self, module_body: &str) -> Result<String, ScopeError> {
        let wrapped = self.capabilities.wrap_module(module_body);
        let timeout = self.config.timeout;
        let mut watchdog = Watchdog::arm(self.isolate.thread_safe_handle(), timeout);

        let outcome = {
            let scope = pin!(v8::HandleScope::new(&mut self.isolate));
            let scope = &mut scope.init();
            let context = v8::Local::new(scope, &self.context);
            let scope = &mut v8::ContextScope::new(scope, context);
            let scope = pin!(v8::TryCatch::new(scope));
            let scope = &mut scope.init();

            let host = v8::Local::new(scope, &self.host);

            'load: {
                let Some(code) = v8::String::new(scope, &wrapped) else {
                    break 'load Err(ScopeError::Internal(
                        "module source too large for V8".to_string(),
                    ));
                };

                let script = match v8::Script::compile(scope, code, None) {
                    Some(script) => script,
                    None => {
                        if scope.has_terminated() {
                            break 'load Err(ScopeError::Terminated(timeout));
                        }
                        break 'load Err(ScopeError::Compile(caught_message!(scope)));
                    }
                };

                let factory = match script.run(scope) {
                    Some(factory) => factory,
                    None => {
                        if scope.has_terminated() {
                            break 'load Err(ScopeError::Terminated(timeout));
                        }
                        break 'load Err(ScopeError::Exception(caught_message!(scope)));
                    }
                };

                let Some(load_key) = v8::String::new(scope, "load") else {
                    break 'load Err(ScopeError::Internal("failed to create key".to_string()));
                };
                let Some(load) = host
                    .get(scope, load_key.into())
                    .and_then(|member| v8::Local::<v8::Function>::try_from(member).ok())
                else {
                    break 'load Err(ScopeError::Internal(
                        "runtime has no load() entry point".to_string(),
                    ));
                };

                let Some(manifest) = v8::String::new(scope, &self.manifest) else {
                    break 'load Err(ScopeError::Internal("failed to create manifest".to_string()));
                };

                let argv: [v8::Local<'_, v8::Value>; 2] = [factory, manifest.into()];
                match load.call(scope, host.into(), &argv) {
                    Some(reply) => Ok(reply.to_rust_string_lossy(scope)),
                    None => {
                        if scope.has_terminated() {
                            break 'load Err(ScopeError::Terminated(timeout));
                        }
                        Err(ScopeError::Exception(caught_message!(scope)))
                    }
                }
            }
        };

        self.finish(&mut watchdog, outcome)
    }

    /// Invoke a method of the runtime's host object with string arguments
    ///
    /// Returns the method's return value converted to a string.
    pub fn call(&mut self, method: &str, args: &[String]) -> Result<String, ScopeError> {
        let timeout = self.config.timeout;
        let mut watchdog = Watchdog::arm(self.isolate.thread_safe_handle(), timeout);

        let outcome = {
            let scope = pin!(v8::HandleScope::new(&mut self.isolate));
            let scope = &mut scope.init();
            let context = v8::Local::new(scope, &self.context);
            let scope = &mut v8::ContextScope::new(scope, context);
            let scope = pin!(v8::TryCatch::new(scope));
            let scope = &mut scope.init();

            let host = v8::Local::new(scope, &self.host);

            'call: {
                let Some(key) = v8::String::new(scope, method) else {
                    break 'call Err(ScopeError::Internal("failed to create key".to_string()));
                };
                let Some(function) = host
                    .get(scope, key.into())
                    .and_then(|member| v8::Local::<v8::Function>::try_from(member).ok())
                else {
                    break 'call Err(ScopeError::Internal(format!(
                        "runtime has no {}() entry point",
                        method
                    )));
                };

                let mut argv: Vec<v8::Local<'_, v8::Value>> = Vec::with_capacity(args.len());
                for arg in args {
                    let Some(value) = v8::String::new(scope, arg) else {
                        break 'call Err(ScopeError::Internal(
                            "argument too large for V8".to_string(),
                        ));
                    };
                    argv.push(value.into());
                }

                match function.call(scope, host.into(), &argv) {
                    Some(reply) => Ok(reply.to_rust_string_lossy(scope)),
                    None => {
                        if scope.has_terminated() {
                            break 'call Err(ScopeError::Terminated(timeout));
                        }
                        Err(ScopeError::Exception(caught_message!(scope)))
                    }
                }
            }
        };

        self.finish(&mut watchdog, outcome)
    }

    fn finish(
        &mut self,
        watchdog: &mut Watchdog,
        outcome: Result<String, ScopeError>,
    ) -> Result<String, ScopeError> {
        let fired = watchdog.disarm();
        self.forward_console();

        if self.heap_guard.take_reached() {
            self.isolate.cancel_terminate_execution();
            log_warn!(
                "Preview terminated at the {} MB heap limit",
                self.config.max_heap_size_bytes / (1024 * 1024)
            );
            return Err(ScopeError::HeapLimit);
        }
        if fired {
            // The deadline may have passed just after the call returned.
            self.isolate.cancel_terminate_execution();
            return Err(ScopeError::Terminated(self.config.timeout));
        }
        outcome
    }

    /// Move captured console lines to the developer log
    fn forward_console(&self) {
        let lines = self.console.buffers().drain();
        if !self.config.capture_console {
            return;
        }
        for line in lines {
            trace_debug!("preview console.{}: {}", line.level, line.message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::v8_bindings::{initialize_v8_platform, Capability};

    const ECHO_RUNTIME: &str = r#"
        ({
            load(factory, manifest) {
                const grant = JSON.parse(manifest);
                const module = { exports: {} };
                const values = grant.bindings.map((name) => name === 'React' ? { ok: true } : () => 0);
                factory(() => ({}), module.exports, module, ...values);
                return JSON.stringify({ keys: Object.keys(module.exports) });
            },
            echo(a, b) { return a + '|' + b; },
            spin() { while (true) {} },
            explode() { throw new Error('kaboom'); },
            chatter() { console.log('tick'); return 'ok'; },
            hoard() { const kept = []; for (;;) kept.push(new Array(100000).fill(1)); },
        })
    "#;

    fn boot(config: RuntimeConfig) -> IsolatedScope {
        let _ = initialize_v8_platform();
        IsolatedScope::boot(&config, &CapabilitySet::rendering_library(), ECHO_RUNTIME).unwrap()
    }

    #[test]
    fn test_runtime_config_defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.max_heap_size_bytes, 256 * 1024 * 1024);
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert!(config.capture_console);
    }

    #[test]
    fn test_call_round_trip() {
        let mut scope = boot(RuntimeConfig::default());
        let reply = scope.call("echo", &["left".to_string(), "right".to_string()]);
        assert_eq!(reply.unwrap(), "left|right");
    }

    #[test]
    fn test_load_module_runs_factory() {
        let mut scope = boot(RuntimeConfig::default());
        let reply = scope
            .load_module("exports.default = function () {}; exports.extra = React.ok;")
            .unwrap();
        assert_eq!(reply, r#"{"keys":["default","extra"]}"#);
    }

    #[test]
    fn test_compile_error_is_reported() {
        let mut scope = boot(RuntimeConfig::default());
        let err = scope.load_module("const x = ;").unwrap_err();
        match err {
            ScopeError::Compile(message) => assert!(message.contains("SyntaxError"), "{}", message),
            other => panic!("expected compile error, got {:?}", other),
        }
    }

    #[test]
    fn test_exception_escaping_host_call() {
        let mut scope = boot(RuntimeConfig::default());
        let err = scope.call("explode", &[]).unwrap_err();
        assert_eq!(err, ScopeError::Exception("Error: kaboom".to_string()));

        // The scope stays usable afterwards
        assert!(scope.call("echo", &["a".into(), "b".into()]).is_ok());
    }

    #[test]
    fn test_missing_entry_point() {
        let mut scope = boot(RuntimeConfig::default());
        let err = scope.call("nope", &[]).unwrap_err();
        assert!(matches!(err, ScopeError::Internal(_)));
    }

    #[test]
    fn test_infinite_loop_timeout() {
        let mut scope = boot(RuntimeConfig {
            timeout: Duration::from_millis(100),
            ..Default::default()
        });

        let started = Instant::now();
        let err = scope.call("spin", &[]).unwrap_err();
        assert_eq!(err, ScopeError::Terminated(Duration::from_millis(100)));
        assert!(err.to_string().contains("terminated"));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_bindings_are_not_globals() {
        let _ = initialize_v8_platform();
        let runtime = r#"
            ({
                load(factory, manifest) {
                    return JSON.stringify({ react: typeof globalThis.React, load: typeof globalThis.load });
                },
            })
        "#;
        let caps = CapabilitySet::none().with(Capability::ReactLibrary);
        let mut scope = IsolatedScope::boot(&RuntimeConfig::default(), &caps, runtime).unwrap();
        let reply = scope.load_module("").unwrap();
        assert_eq!(reply, r#"{"react":"undefined","load":"undefined"}"#);
    }

    #[test]
    fn test_console_is_drained_after_each_call() {
        let mut scope = boot(RuntimeConfig::default());
        scope.load_module("console.log('from module');").unwrap();
        assert!(scope.console.buffers().drain().is_empty());

        for _ in 0..3 {
            assert_eq!(scope.call("chatter", &[]).unwrap(), "ok");
            assert!(scope.console.buffers().drain().is_empty());
        }
    }

    #[test]
    fn test_heap_limit_terminates_instead_of_aborting() {
        let mut scope = boot(RuntimeConfig {
            max_heap_size_bytes: 64 * 1024 * 1024,
            timeout: Duration::from_secs(30),
            ..Default::default()
        });

        let err = scope.call("hoard", &[]).unwrap_err();
        assert_eq!(err, ScopeError::HeapLimit);
        assert!(err.to_string().contains("heap limit exceeded"));
    }

    #[test]
    fn test_boot_rejects_non_object_runtime() {
        let _ = initialize_v8_platform();
        let result =
            IsolatedScope::boot(&RuntimeConfig::default(), &CapabilitySet::none(), "42");
        assert!(result.is_err());
    }
}
