//! Error types for the glasshouse execution service.
//!
//! Every error implements Display, Debug, Clone, PartialEq, Eq and
//! std::error::Error. No external error crates are used in the library.
//!
//! The taxonomy mirrors what callers see in the `error.type` field of a
//! failed response:
//!
//! - `ParsingError`: the request was rejected before reaching the engine
//! - execution errors: raised by the submitted code, reported under the
//!   engine's own kind name (`ArithmeticError`, `NameError`, ...)
//! - `InitializationError`: the sandbox could not be booted (process-fatal)
//! - `TimeoutError`: the sandbox did not become ready in time

use crate::sandbox::SandboxState;
use std::fmt;
use std::time::Duration;

/// Wire name for request validation failures.
pub const PARSING_ERROR: &str = "ParsingError";

/// Wire name for sandbox boot failures.
pub const INITIALIZATION_ERROR: &str = "InitializationError";

/// Wire name for readiness timeouts.
pub const TIMEOUT_ERROR: &str = "TimeoutError";

/// Wire name for failures that are neither the caller's nor the code's fault.
pub const INTERNAL_ERROR: &str = "InternalError";

/// Errors produced by the sandbox lifecycle and the execution service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlasshouseError {
    /// The specific error that occurred (boxed to keep `Result` small)
    kind: Box<GlasshouseErrorKind>,
}

/// Specific error types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GlasshouseErrorKind {
    /// The request is malformed: empty code, bad file entry, escaping path.
    Parsing {
        /// What was wrong with the request
        reason: String,
    },
    /// The submitted code raised an error inside the engine.
    Execution {
        /// Engine-defined error kind, e.g. `ArithmeticError`
        kind: String,
        /// Error message, possibly enriched with source context
        message: String,
    },
    /// The seed directory was unreadable or the engine failed to boot.
    Initialization {
        /// Why initialization failed
        reason: String,
    },
    /// The sandbox never reached the Ready state.
    Timeout {
        /// Number of polls performed
        attempts: u32,
        /// Interval between polls
        interval: Duration,
    },
    /// A lifecycle operation was called from a state that does not allow it.
    InvalidState {
        /// The operation that was attempted
        operation: &'static str,
        /// The state the sandbox was in
        state: SandboxState,
    },
    /// A configuration file or value is invalid.
    Configuration {
        /// The configuration field that is invalid
        field: String,
        /// Why it is invalid
        reason: String,
    },
    /// Unexpected internal failure (worker panic, dropped channel).
    Internal {
        /// Description of the failure
        message: String,
    },
}

impl GlasshouseError {
    /// Creates a new error with the given kind.
    #[must_use]
    pub fn new(kind: GlasshouseErrorKind) -> Self {
        Self {
            kind: Box::new(kind),
        }
    }

    /// Returns a reference to the error kind.
    #[must_use]
    pub fn kind(&self) -> &GlasshouseErrorKind {
        &self.kind
    }

    /// Creates a parsing error.
    #[must_use]
    pub fn parsing(reason: impl Into<String>) -> Self {
        Self::new(GlasshouseErrorKind::Parsing {
            reason: reason.into(),
        })
    }

    /// Creates an execution error.
    #[must_use]
    pub fn execution(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(GlasshouseErrorKind::Execution {
            kind: kind.into(),
            message: message.into(),
        })
    }

    /// Creates an initialization error.
    #[must_use]
    pub fn initialization(reason: impl Into<String>) -> Self {
        Self::new(GlasshouseErrorKind::Initialization {
            reason: reason.into(),
        })
    }

    /// Creates a readiness timeout error.
    #[must_use]
    pub fn timeout(attempts: u32, interval: Duration) -> Self {
        Self::new(GlasshouseErrorKind::Timeout { attempts, interval })
    }

    /// Creates an invalid state error.
    #[must_use]
    pub fn invalid_state(operation: &'static str, state: SandboxState) -> Self {
        Self::new(GlasshouseErrorKind::InvalidState { operation, state })
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn configuration(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(GlasshouseErrorKind::Configuration {
            field: field.into(),
            reason: reason.into(),
        })
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(GlasshouseErrorKind::Internal {
            message: message.into(),
        })
    }

    /// Returns true if the request was rejected before reaching the engine.
    #[must_use]
    pub fn is_parsing(&self) -> bool {
        matches!(*self.kind, GlasshouseErrorKind::Parsing { .. })
    }

    /// Returns true if the submitted code raised the error.
    #[must_use]
    pub fn is_execution(&self) -> bool {
        matches!(*self.kind, GlasshouseErrorKind::Execution { .. })
    }

    /// Returns true if this error should take the process down.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(*self.kind, GlasshouseErrorKind::Initialization { .. })
    }

    /// Returns true if this is a configuration error.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(*self.kind, GlasshouseErrorKind::Configuration { .. })
    }

    /// Returns true if the sandbox did not become ready in time.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(*self.kind, GlasshouseErrorKind::Timeout { .. })
    }

    /// The name reported in the `error.type` field of a failed response.
    #[must_use]
    pub fn error_type(&self) -> &str {
        match self.kind.as_ref() {
            GlasshouseErrorKind::Parsing { .. } => PARSING_ERROR,
            GlasshouseErrorKind::Execution { kind, .. } => kind,
            GlasshouseErrorKind::Initialization { .. } => INITIALIZATION_ERROR,
            GlasshouseErrorKind::Timeout { .. } => TIMEOUT_ERROR,
            GlasshouseErrorKind::InvalidState { .. }
            | GlasshouseErrorKind::Configuration { .. }
            | GlasshouseErrorKind::Internal { .. } => INTERNAL_ERROR,
        }
    }

    /// The message reported in the `error.message` field of a failed response.
    ///
    /// Execution errors report the engine message verbatim; every other kind
    /// reports its `Display` text.
    #[must_use]
    pub fn message(&self) -> String {
        match self.kind.as_ref() {
            GlasshouseErrorKind::Execution { message, .. } => message.clone(),
            _ => self.to_string(),
        }
    }
}

impl fmt::Display for GlasshouseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind.as_ref() {
            GlasshouseErrorKind::Parsing { reason } => {
                write!(f, "invalid request: {}", reason)
            }
            GlasshouseErrorKind::Execution { kind, message } => {
                write!(f, "{}: {}", kind, message)
            }
            GlasshouseErrorKind::Initialization { reason } => {
                write!(
                    f,
                    "sandbox initialization failed: {}; the process must be restarted",
                    reason
                )
            }
            GlasshouseErrorKind::Timeout { attempts, interval } => {
                write!(
                    f,
                    "sandbox not ready after {} polls every {}ms; retry the request later",
                    attempts,
                    interval.as_millis()
                )
            }
            GlasshouseErrorKind::InvalidState { operation, state } => {
                write!(f, "cannot {} while the sandbox is {}", operation, state)
            }
            GlasshouseErrorKind::Configuration { field, reason } => {
                write!(f, "invalid configuration for '{}': {}", field, reason)
            }
            GlasshouseErrorKind::Internal { message } => {
                write!(f, "internal error: {}", message)
            }
        }
    }
}

impl std::error::Error for GlasshouseError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parsing_error_reports_wire_type() {
        let error = GlasshouseError::parsing("code is empty");
        assert!(error.is_parsing());
        assert_eq!(error.error_type(), "ParsingError");
        assert!(error.message().contains("code is empty"));
    }

    #[test]
    fn execution_error_reports_engine_kind_and_raw_message() {
        let error = GlasshouseError::execution("ArithmeticError", "Division by zero");
        assert!(error.is_execution());
        assert_eq!(error.error_type(), "ArithmeticError");
        assert_eq!(error.message(), "Division by zero");
        assert_eq!(error.to_string(), "ArithmeticError: Division by zero");
    }

    #[test]
    fn initialization_error_is_fatal() {
        let error = GlasshouseError::initialization("seed directory missing");
        assert!(error.is_fatal());
        assert_eq!(error.error_type(), "InitializationError");
        assert!(error.to_string().contains("restarted"));
    }

    #[test]
    fn timeout_error_display_includes_poll_budget() {
        let error = GlasshouseError::timeout(100, Duration::from_millis(100));
        assert!(error.is_timeout());
        assert!(!error.is_fatal());
        let message = error.to_string();
        assert!(message.contains("100 polls"));
        assert!(message.contains("100ms"));
    }

    #[test]
    fn invalid_state_is_reported_as_internal() {
        let error = GlasshouseError::invalid_state("execute", SandboxState::Recycling);
        assert_eq!(error.error_type(), "InternalError");
        assert!(error.to_string().contains("recycling"));
    }

    #[test]
    fn errors_are_clone_and_eq() {
        let error1 = GlasshouseError::internal("worker panicked");
        let error2 = error1.clone();
        assert_eq!(error1, error2);
        assert_ne!(error1, GlasshouseError::internal("other"));
    }
}
