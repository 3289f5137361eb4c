//! Request and response shapes exchanged with callers.
//!
//! Field names follow the wire format (`b64_data`, `std_out`, `code_runtime`)
//! through serde renames; the Rust names follow the data model.

use crate::error::GlasshouseError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A code submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// Source text to run as the engine's top-level program.
    #[serde(default)]
    pub code: String,
    /// Files to place in the sandbox home directory before running.
    #[serde(default)]
    pub files: Vec<InputFile>,
}

impl ExecutionRequest {
    /// Creates a request without input files.
    #[must_use]
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            files: Vec::new(),
        }
    }

    /// Adds an input file, given as already base64-encoded payload.
    #[must_use]
    pub fn with_file(mut self, filename: impl Into<String>, b64_data: impl Into<String>) -> Self {
        self.files.push(InputFile {
            filename: Some(filename.into()),
            b64_data: Some(b64_data.into()),
        });
        self
    }
}

/// One caller-supplied file as it arrives on the wire.
///
/// Both fields are optional so a malformed entry can be reported by index
/// instead of rejecting the whole body at deserialization time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputFile {
    /// Path relative to the sandbox home directory.
    #[serde(default)]
    pub filename: Option<String>,
    /// Standard base64 payload.
    #[serde(default)]
    pub b64_data: Option<String>,
}

/// A file leaving the sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireFile {
    /// Path relative to the sandbox home directory.
    pub filename: String,
    /// Standard base64 payload.
    pub b64_data: String,
}

/// The `error` object of a failed response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Error kind, e.g. `ParsingError` or an engine kind like `NameError`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Human-readable message.
    pub message: String,
}

impl ErrorInfo {
    /// Creates a new error object.
    #[must_use]
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

impl From<&GlasshouseError> for ErrorInfo {
    fn from(error: &GlasshouseError) -> Self {
        Self::new(error.error_type(), error.message())
    }
}

/// The outcome of one submission.
///
/// Exactly one of `success` or `error.is_some()` holds; the only ways to
/// build a result are [`ExecutionResult::success`] and
/// [`ExecutionResult::failure`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Whether the code ran to completion.
    pub success: bool,
    /// Value of the program's trailing expression, if it had one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_expression: Option<Value>,
    /// Files created by the code.
    #[serde(default)]
    pub output_files: Vec<WireFile>,
    /// Present exactly when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    /// Captured standard output.
    #[serde(rename = "std_out", default)]
    pub stdout: String,
    /// Captured standard error.
    #[serde(rename = "std_err", default)]
    pub stderr: String,
    /// Wall-clock milliseconds spent running the code.
    #[serde(rename = "code_runtime", default)]
    pub runtime_ms: u64,
}

impl ExecutionResult {
    /// Creates a successful result.
    #[must_use]
    pub fn success(final_expression: Option<Value>) -> Self {
        Self {
            success: true,
            final_expression,
            output_files: Vec::new(),
            error: None,
            stdout: String::new(),
            stderr: String::new(),
            runtime_ms: 0,
        }
    }

    /// Creates a failed result.
    #[must_use]
    pub fn failure(error: ErrorInfo) -> Self {
        Self {
            success: false,
            final_expression: None,
            output_files: Vec::new(),
            error: Some(error),
            stdout: String::new(),
            stderr: String::new(),
            runtime_ms: 0,
        }
    }

    /// Creates a failed result from a service error.
    #[must_use]
    pub fn from_error(error: &GlasshouseError) -> Self {
        Self::failure(ErrorInfo::from(error))
    }

    /// Attaches the output files.
    #[must_use]
    pub fn with_output_files(mut self, output_files: Vec<WireFile>) -> Self {
        self.output_files = output_files;
        self
    }

    /// Attaches the captured output streams.
    #[must_use]
    pub fn with_streams(mut self, stdout: String, stderr: String) -> Self {
        self.stdout = stdout;
        self.stderr = stderr;
        self
    }

    /// Attaches the measured runtime.
    #[must_use]
    pub fn with_runtime_ms(mut self, runtime_ms: u64) -> Self {
        self.runtime_ms = runtime_ms;
        self
    }

    /// Returns the output file with the given name, if produced.
    #[must_use]
    pub fn output_file(&self, filename: &str) -> Option<&WireFile> {
        self.output_files.iter().find(|f| f.filename == filename)
    }
}
