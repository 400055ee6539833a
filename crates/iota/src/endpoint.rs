//! Endpoint identity.

use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EndpointIdError {
    #[error("{field} must not be empty")]
    Empty { field: &'static str },
    #[error("{field} '{value}' is not a valid path segment")]
    InvalidSegment { field: &'static str, value: String },
}

/// Identity of one logical endpoint: `(owner, package, function)`.
///
/// Immutable once built. Components double as filesystem path segments, so they
/// are restricted to ASCII alphanumerics, `_`, `-` and `.` (but not `.`/`..`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct EndpointId {
    owner: String,
    package: String,
    function: String,
}

impl EndpointId {
    pub fn new(
        owner: impl Into<String>,
        package: impl Into<String>,
        function: impl Into<String>,
    ) -> Result<Self, EndpointIdError> {
        let owner = owner.into();
        let package = package.into();
        let function = function.into();
        check_segment("owner", &owner)?;
        check_segment("package", &package)?;
        check_segment("function", &function)?;
        Ok(Self {
            owner,
            package,
            function,
        })
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    pub fn function(&self) -> &str {
        &self.function
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.owner, self.package, self.function)
    }
}

/// Validate one user-supplied path segment.
pub fn check_segment(field: &'static str, value: &str) -> Result<(), EndpointIdError> {
    if value.is_empty() {
        return Err(EndpointIdError::Empty { field });
    }
    let valid = value != "."
        && value != ".."
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if !valid {
        return Err(EndpointIdError::InvalidSegment {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

/// An endpoint as deployed: identity plus the declared parameter name of the
/// user function. The parameter name is not part of identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Endpoint {
    pub id: EndpointId,
    pub parameter: String,
}

impl Endpoint {
    pub fn new(id: EndpointId, parameter: impl Into<String>) -> Self {
        Self {
            id,
            parameter: parameter.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn display_joins_components() {
        let id = EndpointId::new("alice", "greet", "Hi").unwrap();
        assert_eq!(id.to_string(), "alice.greet.Hi");
    }

    #[test]
    fn equality_and_hash_are_by_value() {
        let a = EndpointId::new("alice", "greet", "Hi").unwrap();
        let b = EndpointId::new("alice".to_string(), "greet", "Hi").unwrap();
        let c = EndpointId::new("bob", "greet", "Hi").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);

        let set: HashSet<_> = [a, b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn rejects_empty_components() {
        assert_eq!(
            EndpointId::new("", "greet", "Hi").unwrap_err(),
            EndpointIdError::Empty { field: "owner" }
        );
        assert_eq!(
            EndpointId::new("alice", "greet", "").unwrap_err(),
            EndpointIdError::Empty { field: "function" }
        );
    }

    #[test]
    fn rejects_path_traversal() {
        assert!(EndpointId::new("..", "greet", "Hi").is_err());
        assert!(EndpointId::new("alice", "a/b", "Hi").is_err());
        assert!(EndpointId::new("alice", "greet", "Hi there").is_err());
        assert!(EndpointId::new("alice-2", "greet_v1", "Hi.x").is_ok());
    }

    #[test]
    fn endpoint_carries_parameter_name() {
        let id = EndpointId::new("alice", "greet", "Hi").unwrap();
        let ep = Endpoint::new(id.clone(), "name");
        assert_eq!(ep.id, id);
        assert_eq!(ep.parameter, "name");
    }
}
