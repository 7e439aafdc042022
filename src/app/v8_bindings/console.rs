//! Console Bindings for Preview Isolates
//!
//! Generated components call `console.log` and friends freely. Inside the
//! sandbox those calls land in [`ConsoleBuffers`]; the sandbox later forwards
//! them to the developer log. Nothing written here ever reaches the host's
//! error channel.

#![warn(clippy::all, rust_2018_idioms)]

use serde::Serialize;
use std::cell::RefCell;
use std::fmt;
use std::pin::pin;
use std::rc::Rc;

/// Severity of a captured console call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleLevel {
    Log,
    Debug,
    Warn,
    Error,
}

impl fmt::Display for ConsoleLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConsoleLevel::Log => "log",
            ConsoleLevel::Debug => "debug",
            ConsoleLevel::Warn => "warn",
            ConsoleLevel::Error => "error",
        };
        f.write_str(name)
    }
}

/// One `console.*` call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsoleLine {
    pub level: ConsoleLevel,
    pub message: String,
}

/// Console output captured from one isolate
///
/// Uses `Rc<RefCell<>>` because V8 callbacks only get shared access through
/// the function's external data.
#[derive(Debug, Clone, Default)]
pub struct ConsoleBuffers {
    lines: Rc<RefCell<Vec<ConsoleLine>>>,
}

impl ConsoleBuffers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, level: ConsoleLevel, message: String) {
        self.lines.borrow_mut().push(ConsoleLine { level, message });
    }

    /// Remove and return everything captured so far
    pub fn drain(&self) -> Vec<ConsoleLine> {
        std::mem::take(&mut *self.lines.borrow_mut())
    }

    /// Recover the buffers from a callback's external data
    ///
    /// # Safety
    ///
    /// The external must point at the `ConsoleBuffers` owned by the
    /// [`ConsoleRegistration`] of the isolate that is running the callback.
    unsafe fn from_v8_external(external: v8::Local<'_, v8::External>) -> Self {
        let ptr = external.value() as *const ConsoleBuffers;
        (*ptr).clone()
    }
}

/// Keeps the buffers referenced by V8 external data alive
///
/// Must outlive the isolate the console was registered in.
pub struct ConsoleRegistration {
    buffers: Box<ConsoleBuffers>,
}

impl ConsoleRegistration {
    pub fn buffers(&self) -> &ConsoleBuffers {
        &self.buffers
    }
}

/// Register `console` in the current context's global object
///
/// Binds `log`, `info`, `debug`, `warn`, `error` and `trace`.
pub fn register_console(
    scope: &mut v8::ContextScope<'_, '_, v8::HandleScope<'_>>,
    buffers: ConsoleBuffers,
) -> ConsoleRegistration {
    let registration = ConsoleRegistration {
        buffers: Box::new(buffers),
    };

    let global = scope.get_current_context().global(scope);
    let console_key = v8::String::new(scope, "console").unwrap();
    let console_obj = v8::Object::new(scope);

    let buffers_ptr = &*registration.buffers as *const ConsoleBuffers as *mut std::ffi::c_void;
    let buffers_data = v8::External::new(scope, buffers_ptr);

    macro_rules! bind {
        ($name:literal, $callback:ident) => {{
            let function = v8::Function::builder($callback)
                .data(buffers_data.into())
                .build(scope)
                .unwrap();
            let key = v8::String::new(scope, $name).unwrap();
            console_obj.set(scope, key.into(), function.into());
        }};
    }

    bind!("log", console_log_callback);
    bind!("info", console_log_callback);
    bind!("debug", console_debug_callback);
    bind!("trace", console_debug_callback);
    bind!("warn", console_warn_callback);
    bind!("error", console_error_callback);

    global.set(scope, console_key.into(), console_obj.into());
    registration
}

fn record(
    scope: &mut v8::PinScope<'_, '_>,
    args: &v8::FunctionCallbackArguments<'_>,
    level: ConsoleLevel,
) {
    let data = args.data();
    let Ok(external) = v8::Local::<v8::External>::try_from(data) else {
        return;
    };
    let buffers = unsafe { ConsoleBuffers::from_v8_external(external) };
    let message = format_console_args(scope, args);
    buffers.push(level, message);
}

fn console_log_callback(
    scope: &mut v8::PinScope<'_, '_>,
    args: v8::FunctionCallbackArguments<'_>,
    _rv: v8::ReturnValue<'_>,
) {
    record(scope, &args, ConsoleLevel::Log);
}

fn console_debug_callback(
    scope: &mut v8::PinScope<'_, '_>,
    args: v8::FunctionCallbackArguments<'_>,
    _rv: v8::ReturnValue<'_>,
) {
    record(scope, &args, ConsoleLevel::Debug);
}

fn console_warn_callback(
    scope: &mut v8::PinScope<'_, '_>,
    args: v8::FunctionCallbackArguments<'_>,
    _rv: v8::ReturnValue<'_>,
) {
    record(scope, &args, ConsoleLevel::Warn);
}

fn console_error_callback(
    scope: &mut v8::PinScope<'_, '_>,
    args: v8::FunctionCallbackArguments<'_>,
    _rv: v8::ReturnValue<'_>,
) {
    record(scope, &args, ConsoleLevel::Error);
}

/// Join arguments with spaces; objects are shown as JSON when possible
///
/// Never throws into the caller: cyclic objects, BigInt members and
/// throwing `toJSON`/`toString` fall back or are skipped.
fn format_console_args(
    scope: &mut v8::PinScope<'_, '_>,
    args: &v8::FunctionCallbackArguments<'_>,
) -> String {
    let mut parts = Vec::new();

    for i in 0..args.length() {
        let arg = args.get(i);
        if arg.is_object() && !arg.is_function() && !arg.is_native_error() {
            if let Some(json) = json_text(scope, arg) {
                parts.push(json);
                continue;
            }
        }
        if let Some(text) = plain_text(scope, arg) {
            parts.push(text);
        }
    }

    parts.join(" ")
}

fn json_text(scope: &mut v8::PinScope<'_, '_>, value: v8::Local<'_, v8::Value>) -> Option<String> {
    let scope = pin!(v8::TryCatch::new(scope));
    let scope = &mut scope.init();
    let json = v8::json::stringify(scope, value)?;
    Some(json.to_rust_string_lossy(scope))
}

fn plain_text(scope: &mut v8::PinScope<'_, '_>, value: v8::Local<'_, v8::Value>) -> Option<String> {
    let scope = pin!(v8::TryCatch::new(scope));
    let scope = &mut scope.init();
    let text = value.to_string(scope)?;
    Some(text.to_rust_string_lossy(scope))
}
