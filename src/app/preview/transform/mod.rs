//! Source-to-executable transform stage
//!
//! A [`SourceTransform`] turns authored component source into a module body
//! that the isolated scope can evaluate inside its capability wrapper. The
//! body may use `require`, `exports` and `module` plus whatever the capability
//! set binds; it must not assume anything else exists.

#![warn(clippy::all, rust_2018_idioms)]

pub mod jsx;
pub mod tsx;

pub use tsx::TsxTransform;

use std::fmt;

/// 1-based position in the authored source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// The source could not be converted to executable form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformError {
    pub message: String,
    pub location: Option<SourceLocation>,
}

impl TransformError {
    pub fn new(message: impl Into<String>, location: Option<SourceLocation>) -> Self {
        Self {
            message: message.into(),
            location,
        }
    }
}

impl fmt::Display for TransformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location {
            Some(location) => write!(f, "{} ({})", self.message, location),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for TransformError {}

/// Output of a successful transform
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TransformedModule {
    /// CommonJS-shaped module body
    pub code: String,
    /// Module specifiers the body requires, in source order
    pub imports: Vec<String>,
    /// Export names the body assigns
    pub exports: Vec<String>,
}

impl TransformedModule {
    pub fn from_code(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            ..Default::default()
        }
    }
}

/// Pluggable first stage of the preview pipeline
pub trait SourceTransform {
    /// Short name for logs
    fn name(&self) -> &str;

    fn transform(&self, source: &str) -> Result<TransformedModule, TransformError>;
}

impl<F> SourceTransform for F
where
    F: Fn(&str) -> Result<TransformedModule, TransformError>,
{
    fn name(&self) -> &str {
        "custom"
    }

    fn transform(&self, source: &str) -> Result<TransformedModule, TransformError> {
        self(source)
    }
}
