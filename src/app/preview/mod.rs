//! Live preview sandbox
//!
//! [`PreviewSandbox`] renders component source into its [`OutputRegion`]. A
//! render cycle runs the source through a [`SourceTransform`], boots a fresh
//! [`IsolatedScope`] with the preview runtime, loads the module with the
//! configured capabilities and mounts the located entry point. Every failure
//! along the way, and every error raised later by the mounted component's
//! event handlers or timers, ends as [`RenderOutcome::Errored`] with the
//! region showing the message.
//!
//! # Example
//!
//! ```no_run
//! use preview_sandbox::app::preview::PreviewSandbox;
//!
//! let mut sandbox = PreviewSandbox::new();
//! let outcome = sandbox.render(
//!     "export default function PreviewComponent() { return <h1>Hello</h1>; }",
//! );
//! assert!(outcome.is_displayed());
//! assert_eq!(sandbox.region().text_content(), "Hello");
//! ```

#![warn(clippy::all, rust_2018_idioms)]

pub mod outcome;
pub mod output;
pub mod session;
pub mod transform;

pub use outcome::{
    PreviewError, PreviewEvent, PreviewState, RenderOutcome, RuntimePhase, StateTransition,
};
pub use output::{
    AttrValue, DocumentStyle, FlatNode, FlatView, OutputRegion, RegionContent, StyleValue, VNode,
};
pub use session::PreviewSession;
pub use transform::{SourceLocation, SourceTransform, TransformError, TransformedModule, TsxTransform};

use serde::Deserialize;
use std::time::{Duration, Instant};

use crate::app::v8_bindings::{CapabilitySet, IsolatedScope, RuntimeConfig, ScopeError};

/// The rendering library evaluated in every isolate
pub const PREVIEW_RUNTIME: &str = include_str!("preview_runtime.js");

/// Default bound on re-render passes per commit
pub const DEFAULT_MAX_RENDER_PASSES: u32 = 25;

/// Reply of the runtime's host object
#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum HostReply {
    Configured,
    Ready {
        export: String,
        #[serde(default)]
        wrapped: bool,
    },
    Mounted {
        tree: FlatView,
        #[serde(default)]
        handlers: usize,
        #[serde(default)]
        timers: usize,
        #[serde(default)]
        clock: f64,
    },
    Ignored {
        reason: String,
    },
    Failed {
        kind: FailureKind,
        #[serde(default)]
        phase: Option<String>,
        message: String,
        #[serde(default)]
        stack: Option<String>,
    },
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
enum FailureKind {
    Export,
    Runtime,
}

/// Summary of the mounted view after the latest commit
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ViewStats {
    /// Handler ids registered by the view
    pub handlers: usize,
    /// Pending timers and animation frames
    pub timers: usize,
    /// Preview clock in milliseconds
    pub clock_ms: f64,
}

fn phase_from_name(name: Option<&str>, fallback: RuntimePhase) -> RuntimePhase {
    match name {
        Some("module") => RuntimePhase::Module,
        Some("mount") => RuntimePhase::Mount,
        Some("event") => RuntimePhase::Event,
        Some("timer") => RuntimePhase::Timer,
        Some(_) => RuntimePhase::Host,
        None => fallback,
    }
}

fn scope_error(err: ScopeError, phase: RuntimePhase) -> PreviewError {
    match err {
        // Syntax the transform let through but V8 rejected
        ScopeError::Compile(message) => PreviewError::Transform(TransformError::new(message, None)),
        ScopeError::Exception(message) => PreviewError::runtime(phase, message),
        ScopeError::Terminated(_) | ScopeError::HeapLimit | ScopeError::Internal(_) => {
            PreviewError::runtime(phase, err.to_string())
        }
    }
}

/// Isolated renderer for untrusted component source
///
/// Owns one V8 isolate while a component is mounted, so it stays on the
/// thread that created it.
pub struct PreviewSandbox {
    transform: Box<dyn SourceTransform>,
    runtime: RuntimeConfig,
    capabilities: CapabilitySet,
    max_render_passes: u32,
    scope: Option<IsolatedScope>,
    region: OutputRegion,
    state: PreviewState,
    outcome: RenderOutcome,
    transitions: Vec<StateTransition>,
    stats: ViewStats,
}

impl Default for PreviewSandbox {
    fn default() -> Self {
        Self::new()
    }
}

impl PreviewSandbox {
    /// Sandbox with the TSX transform, default limits and the rendering
    /// library capability set
    pub fn new() -> Self {
        Self::with_settings(
            Box::new(TsxTransform::new()),
            RuntimeConfig::default(),
            CapabilitySet::rendering_library(),
        )
    }

    pub fn with_settings(
        transform: Box<dyn SourceTransform>,
        runtime: RuntimeConfig,
        capabilities: CapabilitySet,
    ) -> Self {
        Self {
            transform,
            runtime,
            capabilities,
            max_render_passes: DEFAULT_MAX_RENDER_PASSES,
            scope: None,
            region: OutputRegion::new(),
            state: PreviewState::Empty,
            outcome: RenderOutcome::Empty,
            transitions: Vec::new(),
            stats: ViewStats::default(),
        }
    }

    pub fn with_max_render_passes(mut self, passes: u32) -> Self {
        self.max_render_passes = passes.max(1);
        self
    }

    pub fn state(&self) -> PreviewState {
        self.state
    }

    pub fn outcome(&self) -> &RenderOutcome {
        &self.outcome
    }

    pub fn region(&self) -> &OutputRegion {
        &self.region
    }

    pub fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    pub fn runtime_config(&self) -> &RuntimeConfig {
        &self.runtime
    }

    /// Every state change since the sandbox was created
    pub fn transitions(&self) -> &[StateTransition] {
        &self.transitions
    }

    pub fn view_stats(&self) -> ViewStats {
        self.stats
    }

    /// Whether a component is currently mounted in an isolate
    pub fn is_mounted(&self) -> bool {
        self.scope.is_some()
    }

    /// Render `text` from scratch
    ///
    /// The previous scope and region content are discarded before anything
    /// else happens.
    pub fn render(&mut self, text: &str) -> RenderOutcome {
        self.teardown();
        self.region.clear();

        if text.trim().is_empty() {
            self.outcome = RenderOutcome::Empty;
            self.set_state(PreviewState::Empty);
            return self.outcome.clone();
        }

        self.set_state(PreviewState::Rendering);
        let start_time = Instant::now();
        let result = self.run_cycle(text);

        match result {
            Ok(tree) => {
                log_debug!(
                    "Preview displayed in {}ms ({} handlers, {} timers)",
                    start_time.elapsed().as_millis(),
                    self.stats.handlers,
                    self.stats.timers
                );
                self.region.show_view(tree);
                self.outcome = RenderOutcome::Displayed;
                self.set_state(PreviewState::Displayed);
            }
            Err(err) => self.fail(err),
        }
        self.outcome.clone()
    }

    /// Invoke an event handler of the mounted view
    ///
    /// `handler_id` is one of the ids carried by the view's `on` maps.
    pub fn dispatch(&mut self, handler_id: &str, event: &PreviewEvent) -> RenderOutcome {
        let payload = match serde_json::to_string(event) {
            Ok(payload) => payload,
            Err(e) => {
                log_warn!("Failed to serialize preview event: {}", e);
                return self.outcome.clone();
            }
        };
        trace_debug!("Dispatching {} with {}", handler_id, payload);
        self.interact(
            "dispatch",
            &[handler_id.to_string(), payload],
            RuntimePhase::Event,
        )
    }

    /// Advance the preview clock, firing due timers and animation frames
    pub fn advance_timers(&mut self, elapsed: Duration) -> RenderOutcome {
        let millis = elapsed.as_secs_f64() * 1000.0;
        self.interact("advance", &[millis.to_string()], RuntimePhase::Timer)
    }

    /// Discard the mounted scope and show the placeholder
    pub fn reset(&mut self) {
        self.teardown();
        self.region.clear();
        self.outcome = RenderOutcome::Empty;
        self.set_state(PreviewState::Empty);
    }

    fn run_cycle(&mut self, text: &str) -> Result<Vec<VNode>, PreviewError> {
        let module = self.transform.transform(text)?;
        trace_debug!(
            "{} transform produced {} bytes, imports [{}]",
            self.transform.name(),
            module.code.len(),
            module.imports.join(", ")
        );

        let mut scope = IsolatedScope::boot(&self.runtime, &self.capabilities, PREVIEW_RUNTIME)
            .map_err(|e| PreviewError::runtime(RuntimePhase::Host, e.to_string()))?;

        let settings = serde_json::json!({ "maxRenderPasses": self.max_render_passes }).to_string();
        let reply = scope
            .call("configure", &[settings])
            .map_err(|e| scope_error(e, RuntimePhase::Host))?;
        expect_reply(&reply, RuntimePhase::Host)?;

        let reply = scope
            .load_module(&module.code)
            .map_err(|e| scope_error(e, RuntimePhase::Module))?;
        if let HostReply::Ready { export, wrapped } = expect_reply(&reply, RuntimePhase::Module)? {
            trace_debug!("Entry point located at {} (wrapped element: {})", export, wrapped);
        }

        let reply = scope
            .call("mount", &[])
            .map_err(|e| scope_error(e, RuntimePhase::Mount))?;
        let tree = match expect_reply(&reply, RuntimePhase::Mount)? {
            HostReply::Mounted {
                tree: FlatView(tree),
                handlers,
                timers,
                clock,
            } => {
                self.stats = ViewStats {
                    handlers,
                    timers,
                    clock_ms: clock,
                };
                tree
            }
            other => {
                return Err(PreviewError::runtime(
                    RuntimePhase::Mount,
                    format!("Unexpected reply from preview runtime: {:?}", other),
                ))
            }
        };

        self.scope = Some(scope);
        Ok(tree)
    }

    fn interact(&mut self, method: &str, args: &[String], phase: RuntimePhase) -> RenderOutcome {
        let Some(scope) = self.scope.as_mut() else {
            trace_debug!("Ignoring {}: nothing is mounted", method);
            return self.outcome.clone();
        };

        let reply = match scope.call(method, args) {
            Ok(reply) => reply,
            Err(e) => {
                self.fail(scope_error(e, phase));
                return self.outcome.clone();
            }
        };

        match expect_reply(&reply, phase) {
            Ok(HostReply::Mounted {
                tree: FlatView(tree),
                handlers,
                timers,
                clock,
            }) => {
                self.stats = ViewStats {
                    handlers,
                    timers,
                    clock_ms: clock,
                };
                self.region.show_view(tree);
            }
            Ok(HostReply::Ignored { reason }) => {
                log_warn!("Preview ignored {}: {}", method, reason);
            }
            Ok(other) => {
                log_warn!("Unexpected reply to {}: {:?}", method, other);
            }
            Err(err) => self.fail(err),
        }
        self.outcome.clone()
    }

    fn fail(&mut self, err: PreviewError) {
        self.teardown();
        match &err {
            PreviewError::Runtime {
                phase,
                stack: Some(stack),
                ..
            } => { log_warn!("Preview failed during {}: {}\n{}", phase, err, stack); }
            _ => { log_warn!("Preview failed ({}): {}", err.kind(), err); }
        }
        self.region.show_error(err.clone());
        self.outcome = RenderOutcome::Errored(err);
        self.set_state(PreviewState::Errored);
    }

    fn teardown(&mut self) {
        if self.scope.take().is_some() {
            trace_debug!("Disposed isolated scope");
        }
        self.stats = ViewStats::default();
    }

    fn set_state(&mut self, next: PreviewState) {
        if next == self.state {
            return;
        }
        let transition = StateTransition {
            from: self.state,
            to: next,
        };
        trace_debug!("Preview state {}", transition);
        self.transitions.push(transition);
        self.state = next;
    }
}

/// Parse a host reply, turning `failed` replies into errors
fn expect_reply(reply: &str, phase: RuntimePhase) -> Result<HostReply, PreviewError> {
    let parsed: HostReply = serde_json::from_str(reply).map_err(|e| {
        PreviewError::runtime(
            RuntimePhase::Host,
            format!("Malformed reply from preview runtime during {}: {}", phase, e),
        )
    })?;

    match parsed {
        HostReply::Failed {
            kind: FailureKind::Export,
            message,
            ..
        } => Err(PreviewError::ExportMissing { message }),
        HostReply::Failed {
            kind: FailureKind::Runtime,
            phase: reported,
            message,
            stack,
        } => Err(PreviewError::Runtime {
            message,
            phase: phase_from_name(reported.as_deref(), phase),
            stack,
        }),
        other => Ok(other),
    }
}
