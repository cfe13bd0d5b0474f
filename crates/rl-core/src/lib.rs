//! Shared primitives used across render-layout crates.

use core::fmt;

/// Result alias used across the workspace.
pub type LayoutResult<T> = Result<T, LayoutError>;

/// Error carried by every fallible layout operation.
///
/// `code` is a stable dotted identifier (`compose.body_missing`,
/// `host.fetch_failed`, ...) that callers and tests match on; `message` is
/// free-form context for humans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutError {
    pub code: &'static str,
    pub message: String,
}

impl LayoutError {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Returns true when the error code belongs to the given dotted namespace.
    pub fn is_in(&self, namespace: &str) -> bool {
        self.code
            .strip_prefix(namespace)
            .is_some_and(|rest| rest.starts_with('.'))
    }
}

impl fmt::Display for LayoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for LayoutError {}
