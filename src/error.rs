//! Errors reported at the model boundary.
//!
//! Only model construction and validation produce errors. Once a fault tree
//! has been validated and handed to the analysis core, any failure there is
//! a contract violation and surfaces as a panic or debug assertion, never
//! as a value of [`Error`].

use thiserror::Error;

/// Errors from fault-tree model construction and validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// The gate definitions form a cycle. Carries the cycle path of names.
    #[error("cycle detected: {}", .path.join(" -> "))]
    Cycle { path: Vec<String> },

    /// Misuse of the model API, e.g. reading a vote number that is not set.
    #[error("logic error: {0}")]
    Logic(String),

    /// The model does not satisfy the fault-tree well-formedness rules.
    #[error("validation error: {0}")]
    Validation(String),

    /// The same event is referenced twice by one formula.
    #[error("duplicate argument: {0}")]
    DuplicateArgument(String),

    /// A value is out of its domain, e.g. a vote number below 2.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_message() {
        let err = Error::Cycle {
            path: vec!["top".to_string(), "g1".to_string(), "top".to_string()],
        };
        assert_eq!(err.to_string(), "cycle detected: top -> g1 -> top");
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            Error::DuplicateArgument("pump_fail".to_string()).to_string(),
            "duplicate argument: pump_fail"
        );
        assert_eq!(
            Error::InvalidArgument("vote number cannot be less than 2".to_string()).to_string(),
            "invalid argument: vote number cannot be less than 2"
        );
    }
}
