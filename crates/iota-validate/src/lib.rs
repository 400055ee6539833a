pub mod error;
pub mod parser;
pub mod types;

pub use crate::error::{Rejection, ValidateError};
pub use crate::types::ValidatedEndpoint;

/// High-level API: validate Go source and return the endpoint it exposes.
///
/// The declared package is returned as-is; comparing it against the addressing
/// path is up to the caller (see [`check_package`]).
pub fn validate_source(source: &str) -> Result<ValidatedEndpoint, ValidateError> {
    parser::parse_endpoint(source)
}

/// Whether the declared package matches the package the source was uploaded under.
pub fn check_package(endpoint: &ValidatedEndpoint, expected: &str) -> bool {
    endpoint.package == expected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_package_compares_declared_name() {
        let ep = validate_source("package greet\n\nfunc Hi(n string) (string, error) { return n, nil }\n")
            .unwrap();
        assert!(check_package(&ep, "greet"));
        assert!(!check_package(&ep, "other"));
    }
}
