//! Capability set handed to sandboxed modules
//!
//! A preview module sees exactly the names listed here and nothing else from
//! the host. Capabilities are never installed on the isolate's global object;
//! they are passed as parameters of the function that wraps the module body,
//! so the grant is visible in one place: [`CapabilitySet::wrap_module`].

#![warn(clippy::all, rust_2018_idioms)]

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Parameters every module wrapper receives, in this order
pub const MODULE_PARAMETERS: [&str; 3] = ["require", "exports", "module"];

/// One grantable capability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// The rendering library: the `React` binding and `require("react")`
    ReactLibrary,
    /// Virtual `setTimeout`/`setInterval` driven by the preview clock
    Timers,
    /// Virtual `requestAnimationFrame` on the same clock
    AnimationFrames,
}

impl Capability {
    /// Names bound as module wrapper parameters
    pub fn bindings(&self) -> &'static [&'static str] {
        match self {
            Capability::ReactLibrary => &["React"],
            Capability::Timers => &["setTimeout", "clearTimeout", "setInterval", "clearInterval"],
            Capability::AnimationFrames => &["requestAnimationFrame", "cancelAnimationFrame"],
        }
    }

    /// Module specifiers `require` resolves for this capability
    pub fn modules(&self) -> &'static [&'static str] {
        match self {
            Capability::ReactLibrary => &["react"],
            Capability::Timers | Capability::AnimationFrames => &[],
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::ReactLibrary => write!(f, "react"),
            Capability::Timers => write!(f, "timers"),
            Capability::AnimationFrames => write!(f, "animation-frames"),
        }
    }
}

/// The enumerated set of capabilities a preview module may use
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilitySet {
    granted: BTreeSet<Capability>,
    strict_modules: bool,
}

/// Grant description sent to the preview runtime when a module loads
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Manifest<'a> {
    bindings: Vec<&'a str>,
    modules: Vec<&'a str>,
    strict_modules: bool,
}

impl CapabilitySet {
    /// Nothing at all; modules only get `require`, `exports` and `module`
    pub fn none() -> Self {
        Self {
            granted: BTreeSet::new(),
            strict_modules: false,
        }
    }

    /// The rendering library plus its scheduling primitives
    pub fn rendering_library() -> Self {
        Self::none()
            .with(Capability::ReactLibrary)
            .with(Capability::Timers)
            .with(Capability::AnimationFrames)
    }

    pub fn with(mut self, capability: Capability) -> Self {
        self.granted.insert(capability);
        self
    }

    pub fn without(mut self, capability: Capability) -> Self {
        self.granted.remove(&capability);
        self
    }

    /// Make `require` of an ungranted module throw instead of returning `{}`
    pub fn with_strict_modules(mut self, strict: bool) -> Self {
        self.strict_modules = strict;
        self
    }

    pub fn contains(&self, capability: Capability) -> bool {
        self.granted.contains(&capability)
    }

    pub fn strict_modules(&self) -> bool {
        self.strict_modules
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        self.granted.iter().copied()
    }

    /// Binding names in wrapper parameter order
    pub fn bindings(&self) -> Vec<&'static str> {
        self.granted.iter().flat_map(|c| c.bindings().iter().copied()).collect()
    }

    /// Module specifiers `require` may resolve
    pub fn modules(&self) -> Vec<&'static str> {
        self.granted.iter().flat_map(|c| c.modules().iter().copied()).collect()
    }

    /// Full wrapper parameter list
    pub fn wrapper_parameters(&self) -> Vec<&'static str> {
        MODULE_PARAMETERS
            .iter()
            .copied()
            .chain(self.bindings())
            .collect()
    }

    /// Wrap a CommonJS-shaped module body into a factory function expression
    pub fn wrap_module(&self, body: &str) -> String {
        format!(
            "(function ({}) {{\n{}\n}})",
            self.wrapper_parameters().join(", "),
            body
        )
    }

    /// JSON description consumed by the preview runtime's `load`
    pub fn manifest_json(&self) -> String {
        let manifest = Manifest {
            bindings: self.bindings(),
            modules: self.modules(),
            strict_modules: self.strict_modules,
        };
        // Only string lists and a bool; serialization cannot fail.
        serde_json::to_string(&manifest).unwrap_or_else(|_| "{}".to_string())
    }
}

impl Default for CapabilitySet {
    fn default() -> Self {
        Self::rendering_library()
    }
}
