//! Execution identifier type using TypeID format.
//!
//! Every submission gets an ExecutionId so its log lines can be correlated
//! across the serializer, the lifecycle manager and the HTTP layer.
//! Format: `exec_01h455vb4pex5vsknk084sn02q`

use mti::prelude::*;
use std::fmt;
use std::str::FromStr;

/// A validated identifier for one code submission.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExecutionId(MagicTypeId);

/// Error returned when attempting to parse an invalid execution ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidExecutionId {
    /// TypeID parsing failed
    Parse(String),
    /// Wrong prefix (expected "exec")
    WrongPrefix {
        /// The expected prefix
        expected: &'static str,
        /// The actual prefix found
        actual: String,
    },
}

impl fmt::Display for InvalidExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(e) => write!(f, "invalid execution ID: {e}"),
            Self::WrongPrefix { expected, actual } => {
                write!(f, "expected prefix '{expected}', got '{actual}'")
            }
        }
    }
}

impl std::error::Error for InvalidExecutionId {}

impl ExecutionId {
    /// The TypeID prefix for execution identifiers.
    pub const PREFIX: &'static str = "exec";

    /// Creates a new execution ID with a fresh UUIDv7 (time-sortable).
    #[must_use]
    pub fn new() -> Self {
        Self(Self::PREFIX.create_type_id::<V7>())
    }

    /// Parses an execution ID from a string, validating the prefix.
    ///
    /// # Errors
    ///
    /// Returns `InvalidExecutionId::Parse` if the string is not a valid TypeID.
    /// Returns `InvalidExecutionId::WrongPrefix` if the TypeID has a different prefix.
    pub fn parse(s: &str) -> Result<Self, InvalidExecutionId> {
        let id = MagicTypeId::from_str(s).map_err(|e| InvalidExecutionId::Parse(e.to_string()))?;

        let prefix = id.prefix().as_str();
        if prefix != Self::PREFIX {
            return Err(InvalidExecutionId::WrongPrefix {
                expected: Self::PREFIX,
                actual: prefix.to_string(),
            });
        }

        Ok(Self(id))
    }
}

impl Default for ExecutionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ExecutionId {
    type Err = InvalidExecutionId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_creates_prefixed_id() {
        let id = ExecutionId::new();
        assert!(id.to_string().starts_with("exec_"));
    }

    #[test]
    fn parse_roundtrips_display() {
        let id = ExecutionId::new();
        let parsed = ExecutionId::parse(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn parse_wrong_prefix_fails() {
        let result = ExecutionId::parse("corr_01h455vb4pex5vsknk084sn02q");
        assert!(matches!(
            result,
            Err(InvalidExecutionId::WrongPrefix {
                expected: "exec",
                ..
            })
        ));
    }

    #[test]
    fn parse_invalid_format_fails() {
        let result = "not-a-valid-typeid".parse::<ExecutionId>();
        assert!(matches!(result, Err(InvalidExecutionId::Parse(_))));
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(ExecutionId::new(), ExecutionId::default());
    }
}
