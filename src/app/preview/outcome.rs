//! Render outcomes, preview states and the error taxonomy
//!
//! Every failure inside the sandbox ends up as a [`PreviewError`] carried by
//! [`RenderOutcome::Errored`]. Nothing here is ever raised into the host.

#![warn(clippy::all, rust_2018_idioms)]

use serde::{Deserialize, Serialize};
use std::fmt;

use super::transform::TransformError;

/// Where a runtime error was raised
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimePhase {
    /// Evaluating the module body
    Module,
    /// Initial render and commit
    Mount,
    /// An event handler inside the mounted view
    Event,
    /// A timer or animation frame callback
    Timer,
    /// The isolate itself (startup, runtime replies)
    Host,
}

impl fmt::Display for RuntimePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RuntimePhase::Module => "module",
            RuntimePhase::Mount => "mount",
            RuntimePhase::Event => "event",
            RuntimePhase::Timer => "timer",
            RuntimePhase::Host => "host",
        };
        f.write_str(name)
    }
}

/// Contained failure of a render cycle
#[derive(Debug, Clone, PartialEq)]
pub enum PreviewError {
    /// The source could not be turned into executable form
    Transform(TransformError),
    /// The module ran but exported nothing renderable
    ExportMissing { message: String },
    /// The module or the mounted component threw
    Runtime {
        message: String,
        phase: RuntimePhase,
        stack: Option<String>,
    },
}

impl PreviewError {
    pub fn runtime(phase: RuntimePhase, message: impl Into<String>) -> Self {
        PreviewError::Runtime {
            message: message.into(),
            phase,
            stack: None,
        }
    }

    /// The text shown in the error region
    pub fn message(&self) -> String {
        self.to_string()
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PreviewError::Transform(_) => "transform",
            PreviewError::ExportMissing { .. } => "export-missing",
            PreviewError::Runtime { .. } => "runtime",
        }
    }
}

impl fmt::Display for PreviewError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PreviewError::Transform(err) => write!(f, "{}", err),
            PreviewError::ExportMissing { message } => write!(f, "{}", message),
            PreviewError::Runtime { message, .. } => write!(f, "{}", message),
        }
    }
}

impl std::error::Error for PreviewError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PreviewError::Transform(err) => Some(err),
            _ => None,
        }
    }
}

impl From<TransformError> for PreviewError {
    fn from(err: TransformError) -> Self {
        PreviewError::Transform(err)
    }
}

/// Result of a render cycle or post-mount interaction
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RenderOutcome {
    /// Nothing generated yet
    #[default]
    Empty,
    /// The component is mounted and shown in the output region
    Displayed,
    /// The output region shows this error
    Errored(PreviewError),
}

impl RenderOutcome {
    pub fn is_empty(&self) -> bool {
        matches!(self, RenderOutcome::Empty)
    }

    pub fn is_displayed(&self) -> bool {
        matches!(self, RenderOutcome::Displayed)
    }

    pub fn is_errored(&self) -> bool {
        matches!(self, RenderOutcome::Errored(_))
    }

    pub fn error(&self) -> Option<&PreviewError> {
        match self {
            RenderOutcome::Errored(err) => Some(err),
            _ => None,
        }
    }

    pub fn state(&self) -> PreviewState {
        match self {
            RenderOutcome::Empty => PreviewState::Empty,
            RenderOutcome::Displayed => PreviewState::Displayed,
            RenderOutcome::Errored(_) => PreviewState::Errored,
        }
    }
}

impl fmt::Display for RenderOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderOutcome::Empty => write!(f, "empty"),
            RenderOutcome::Displayed => write!(f, "displayed"),
            RenderOutcome::Errored(err) => write!(f, "errored ({}): {}", err.kind(), err),
        }
    }
}

/// Sandbox state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreviewState {
    Empty,
    Rendering,
    Displayed,
    Errored,
}

impl fmt::Display for PreviewState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PreviewState::Empty => "Empty",
            PreviewState::Rendering => "Rendering",
            PreviewState::Displayed => "Displayed",
            PreviewState::Errored => "Errored",
        };
        f.write_str(name)
    }
}

/// One recorded state change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StateTransition {
    pub from: PreviewState,
    pub to: PreviewState,
}

impl fmt::Display for StateTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.from, self.to)
    }
}

/// Event payload for a post-mount interaction
///
/// Fields left unset keep the target's current value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PreviewEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checked: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

impl PreviewEvent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_checked(mut self, checked: bool) -> Self {
        self.checked = Some(checked);
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }
}
