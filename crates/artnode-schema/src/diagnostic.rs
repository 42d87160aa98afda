//! Build diagnostics.

use std::fmt;

use serde::Serialize;

/// Class of a recoverable build problem.
///
/// The class decides what happens to the node: structural problems
/// invalidate it, reference problems only drop the edge, resource problems
/// invalidate or degrade depending on what failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    Structural,
    Reference,
    Resource,
}

/// A single problem found while compiling the content tree.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Diagnostic {
    /// Tree path of the node or directory the problem belongs to.
    pub path: String,
    /// Dotted rule identifier, e.g. `field.required`.
    pub rule: String,
    /// Class of the problem.
    pub class: ErrorClass,
    /// Human-readable message.
    pub message: String,
}

impl Diagnostic {
    #[must_use]
    pub fn new(
        class: ErrorClass,
        path: impl Into<String>,
        rule: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            rule: rule.into(),
            class,
            message: message.into(),
        }
    }

    /// A problem that invalidates the node.
    #[must_use]
    pub fn structural(
        path: impl Into<String>,
        rule: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(ErrorClass::Structural, path, rule, message)
    }

    /// A dangling or cyclic cross-reference.
    #[must_use]
    pub fn reference(
        path: impl Into<String>,
        rule: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(ErrorClass::Reference, path, rule, message)
    }

    /// A failed read, timeout or signing call.
    #[must_use]
    pub fn resource(
        path: impl Into<String>,
        rule: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(ErrorClass::Resource, path, rule, message)
    }

    /// Whether this diagnostic invalidates the node it is attached to.
    #[must_use]
    pub fn is_structural(&self) -> bool {
        self.class == ErrorClass::Structural
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = if self.path.is_empty() { "/" } else { &self.path };
        write!(f, "{path}: [{}] {}", self.rule, self.message)
    }
}
