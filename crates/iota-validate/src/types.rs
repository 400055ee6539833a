//! Result types for endpoint validation.

use serde::Serialize;

/// The endpoint function found in a Go source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidatedEndpoint {
    /// Declared package name (`package greet`).
    pub package: String,
    /// Exported function name.
    pub function: String,
    /// Name of the single `string` parameter; callers supply it as a form value.
    pub parameter: String,
}
