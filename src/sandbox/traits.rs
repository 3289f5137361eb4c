//! Engine trait definitions.
//!
//! An [`EngineFactory`] boots [`Engine`] instances; the lifecycle manager owns
//! at most one instance at a time and replaces it after every execution.
//! Engines are synchronous and are always driven from the blocking pool.

use serde_json::Value;
use std::fmt::{self, Debug};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative stop flag shared between the manager and one engine instance.
///
/// The engine polls the flag while running and aborts with an
/// interruption error once it is set. Nothing forces a stop: code blocked
/// inside a single native call finishes that call first.
#[derive(Debug, Clone, Default)]
pub struct InterruptSignal(Arc<AtomicBool>);

impl InterruptSignal {
    /// Creates an unset signal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests the engine to stop.
    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns true once a stop has been requested.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Parameters for booting one engine instance.
#[derive(Debug, Clone)]
pub struct BootOptions {
    /// Absolute home directory of the sandbox filesystem.
    pub home: String,
    /// Stop flag for this instance.
    pub interrupt: InterruptSignal,
}

impl BootOptions {
    /// Creates boot options.
    #[must_use]
    pub fn new(home: impl Into<String>, interrupt: InterruptSignal) -> Self {
        Self {
            home: home.into(),
            interrupt,
        }
    }
}

/// Text written by the running code to its output streams.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    /// Everything printed to standard output.
    pub stdout: String,
    /// Everything printed to standard error.
    pub stderr: String,
}

/// One entry of a sandbox directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Entry name, without any directory part.
    pub name: String,
    /// Whether the entry is a directory.
    pub is_dir: bool,
}

impl DirEntry {
    /// Returns true for the `.` and `..` markers.
    #[must_use]
    pub fn is_marker(&self) -> bool {
        self.name == "." || self.name == ".."
    }
}

/// An error raised by an engine.
///
/// `kind` is defined by the engine (`SyntaxError`, `NameError`, ...) and is
/// reported to callers unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineError {
    /// Engine-defined error kind.
    pub kind: String,
    /// Human-readable message.
    pub message: String,
}

impl EngineError {
    /// Creates a new engine error.
    #[must_use]
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for EngineError {}

/// One booted, isolated interpreter with its own memory-only filesystem.
///
/// Paths are either absolute or relative to [`Engine::home`]; every path
/// must resolve inside the home directory.
pub trait Engine: Send + Debug {
    /// Absolute home directory of this instance.
    fn home(&self) -> &str;

    /// Writes a file, creating missing parent directories.
    ///
    /// # Errors
    ///
    /// Fails if the path escapes home or collides with a directory.
    fn write_file(&mut self, path: &str, bytes: &[u8]) -> Result<(), EngineError>;

    /// Reads a file.
    ///
    /// # Errors
    ///
    /// Fails if the path does not name a file.
    fn read_file(&self, path: &str) -> Result<Vec<u8>, EngineError>;

    /// Lists a directory, including the `.` and `..` markers.
    ///
    /// # Errors
    ///
    /// Fails if the path does not name a directory.
    fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>, EngineError>;

    /// Names of the libraries `code` imports.
    fn referenced_libraries(&self, code: &str) -> Vec<String>;

    /// Makes the named libraries importable. Already loaded names are skipped.
    ///
    /// # Errors
    ///
    /// Returns the first failure; the remaining names are still attempted.
    fn load_libraries(&mut self, names: &[String]) -> Result<(), EngineError>;

    /// Runs `code` as a top-level program.
    ///
    /// Returns the value of the trailing expression, or `None` when the
    /// program ends in a statement.
    ///
    /// # Errors
    ///
    /// Returns the classified error raised by the code.
    fn run(&mut self, code: &str) -> Result<Option<Value>, EngineError>;

    /// Drains the output captured since the previous call.
    fn take_output(&mut self) -> CapturedOutput;
}

/// Boots engine instances.
///
/// Allows a different interpreter to be plugged into the lifecycle manager
/// without changing it.
pub trait EngineFactory: Send + Sync + Debug {
    /// Boots a fresh instance with an empty filesystem.
    ///
    /// # Errors
    ///
    /// Fails if the engine cannot be constructed.
    fn boot(&self, options: BootOptions) -> Result<Box<dyn Engine>, EngineError>;

    /// Short engine name for logs.
    fn name(&self) -> &'static str;
}
