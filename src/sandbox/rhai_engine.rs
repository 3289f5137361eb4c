//! Rhai-backed engine.
//!
//! Every instance owns a fresh `rhai::Engine`, a [`VirtualFs`] and its own
//! output buffers. Scripts reach the filesystem only through the functions
//! registered here; there is no access to host files, network or processes.

use crate::sandbox::library;
use crate::sandbox::traits::{
    BootOptions, CapturedOutput, DirEntry, Engine, EngineError, EngineFactory, InterruptSignal,
};
use crate::sandbox::vfs::{FsError, VirtualFs};
use rhai::module_resolvers::StaticModuleResolver;
use rhai::{Blob, Dynamic, EvalAltResult, FnPtr, Module, Scope, INT};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

/// Error kinds reported by the Rhai engine.
pub mod kinds {
    /// The code does not parse.
    pub const SYNTAX_ERROR: &str = "SyntaxError";
    /// Unknown variable or function.
    pub const NAME_ERROR: &str = "NameError";
    /// Value of the wrong type.
    pub const TYPE_ERROR: &str = "TypeError";
    /// Division by zero, overflow and similar.
    pub const ARITHMETIC_ERROR: &str = "ArithmeticError";
    /// Out-of-bounds index or missing property.
    pub const INDEX_ERROR: &str = "IndexError";
    /// An imported library could not be resolved.
    pub const IMPORT_ERROR: &str = "ImportError";
    /// Raised with `throw` or by a host function.
    pub const RUNTIME_ERROR: &str = "RuntimeError";
    /// Stopped through the interrupt signal.
    pub const INTERRUPTED_ERROR: &str = "InterruptedError";
    /// An engine limit was exceeded.
    pub const RESOURCE_ERROR: &str = "ResourceError";
    /// Anything else.
    pub const EXECUTION_ERROR: &str = "ExecutionError";
}

/// Boots [`RhaiEngine`] instances.
#[derive(Debug, Clone, Default)]
pub struct RhaiEngineFactory {
    _private: (),
}

impl RhaiEngineFactory {
    /// Creates a factory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl EngineFactory for RhaiEngineFactory {
    fn boot(&self, options: BootOptions) -> Result<Box<dyn Engine>, EngineError> {
        Ok(Box::new(RhaiEngine::new(options)))
    }

    fn name(&self) -> &'static str {
        "rhai"
    }
}

/// One Rhai interpreter instance.
pub struct RhaiEngine {
    engine: rhai::Engine,
    fs: Arc<Mutex<VirtualFs>>,
    output: Arc<Mutex<CapturedOutput>>,
    modules: BTreeMap<String, Module>,
    home: String,
}

impl fmt::Debug for RhaiEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RhaiEngine")
            .field("home", &self.home)
            .field("modules", &self.modules.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl RhaiEngine {
    /// Creates an instance with an empty filesystem and no libraries.
    #[must_use]
    pub fn new(options: BootOptions) -> Self {
        let fs = Arc::new(Mutex::new(VirtualFs::new(&options.home)));
        let output = Arc::new(Mutex::new(CapturedOutput::default()));
        let home = lock(&fs).home().to_string();

        let mut engine = rhai::Engine::new();
        register_output(&mut engine, &output);
        register_interrupt(&mut engine, options.interrupt);
        register_filesystem(&mut engine, &fs);
        register_stubs(&mut engine);

        let mut instance = Self {
            engine,
            fs,
            output,
            modules: BTreeMap::new(),
            home,
        };
        // Replaces the default resolver, which would read scripts from the host.
        instance.install_resolver();
        instance
    }

    fn load_library(&mut self, name: &str) -> Result<(), EngineError> {
        if self.modules.contains_key(name) {
            return Ok(());
        }
        let source = library::source(name).ok_or_else(|| {
            EngineError::new(kinds::IMPORT_ERROR, format!("unknown library '{name}'"))
        })?;

        let ast = self
            .engine
            .compile(source)
            .map_err(|e| EngineError::new(kinds::SYNTAX_ERROR, format!("library '{name}': {e}")))?;
        let module = Module::eval_ast_as_new(Scope::new(), &ast, &self.engine)
            .map_err(|e| EngineError::new(classify(&e), format!("library '{name}': {e}")))?;

        self.modules.insert(name.to_string(), module);
        Ok(())
    }

    fn install_resolver(&mut self) {
        let mut resolver = StaticModuleResolver::new();
        for (name, module) in &self.modules {
            resolver.insert(name.as_str(), module.clone());
        }
        self.engine.set_module_resolver(resolver);
    }
}

impl Engine for RhaiEngine {
    fn home(&self) -> &str {
        &self.home
    }

    fn write_file(&mut self, path: &str, bytes: &[u8]) -> Result<(), EngineError> {
        lock(&self.fs).write(path, bytes).map_err(EngineError::from)
    }

    fn read_file(&self, path: &str) -> Result<Vec<u8>, EngineError> {
        lock(&self.fs)
            .read(path)
            .map(<[u8]>::to_vec)
            .map_err(EngineError::from)
    }

    fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>, EngineError> {
        lock(&self.fs).read_dir(path).map_err(EngineError::from)
    }

    fn referenced_libraries(&self, code: &str) -> Vec<String> {
        library::referenced(code)
    }

    fn load_libraries(&mut self, names: &[String]) -> Result<(), EngineError> {
        let mut first_error = None;
        for name in names {
            if let Err(e) = self.load_library(name) {
                first_error.get_or_insert(e);
            }
        }
        self.install_resolver();
        first_error.map_or(Ok(()), Err)
    }

    fn run(&mut self, code: &str) -> Result<Option<Value>, EngineError> {
        let mut scope = Scope::new();
        let value = self
            .engine
            .eval_with_scope::<Dynamic>(&mut scope, code)
            .map_err(|e| EngineError::new(classify(&e), e.to_string()))?;

        if value.is_unit() {
            return Ok(None);
        }
        // Values serde cannot represent (function pointers, custom types)
        // fall back to their display text.
        let json = rhai::serde::from_dynamic::<Value>(&value)
            .unwrap_or_else(|_| Value::String(value.to_string()));
        Ok(Some(json))
    }

    fn take_output(&mut self) -> CapturedOutput {
        std::mem::take(&mut *lock(&self.output))
    }
}

/// Maps a Rhai error to the kind reported to callers.
fn classify(error: &EvalAltResult) -> &'static str {
    match error {
        EvalAltResult::ErrorParsing(..) => kinds::SYNTAX_ERROR,
        EvalAltResult::ErrorVariableNotFound(..) | EvalAltResult::ErrorFunctionNotFound(..) => {
            kinds::NAME_ERROR
        }
        EvalAltResult::ErrorMismatchDataType(..) | EvalAltResult::ErrorMismatchOutputType(..) => {
            kinds::TYPE_ERROR
        }
        EvalAltResult::ErrorArithmetic(..) => kinds::ARITHMETIC_ERROR,
        EvalAltResult::ErrorIndexNotFound(..)
        | EvalAltResult::ErrorArrayBounds(..)
        | EvalAltResult::ErrorStringBounds(..) => kinds::INDEX_ERROR,
        EvalAltResult::ErrorModuleNotFound(..) => kinds::IMPORT_ERROR,
        EvalAltResult::ErrorRuntime(..) => kinds::RUNTIME_ERROR,
        EvalAltResult::ErrorTerminated(..) => kinds::INTERRUPTED_ERROR,
        EvalAltResult::ErrorTooManyOperations(..)
        | EvalAltResult::ErrorStackOverflow(..)
        | EvalAltResult::ErrorDataTooLarge(..) => kinds::RESOURCE_ERROR,
        EvalAltResult::ErrorInFunctionCall(_, _, inner, _)
        | EvalAltResult::ErrorInModule(_, inner, _) => classify(inner),
        _ => kinds::EXECUTION_ERROR,
    }
}

fn register_output(engine: &mut rhai::Engine, output: &Arc<Mutex<CapturedOutput>>) {
    let stdout = Arc::clone(output);
    engine.on_print(move |text| {
        let mut output = lock(&stdout);
        output.stdout.push_str(text);
        output.stdout.push('\n');
    });

    let stderr = Arc::clone(output);
    engine.on_debug(move |text, _source, _position| {
        let mut output = lock(&stderr);
        output.stderr.push_str(text);
        output.stderr.push('\n');
    });

    let stderr = Arc::clone(output);
    engine.register_fn("eprint", move |value: Dynamic| {
        let mut output = lock(&stderr);
        output.stderr.push_str(&value.to_string());
        output.stderr.push('\n');
    });
}

fn register_interrupt(engine: &mut rhai::Engine, interrupt: InterruptSignal) {
    engine.on_progress(move |_operations| {
        if interrupt.is_set() {
            Some(Dynamic::from("execution interrupted"))
        } else {
            None
        }
    });
}

fn register_filesystem(engine: &mut rhai::Engine, fs: &Arc<Mutex<VirtualFs>>) {
    let vfs = Arc::clone(fs);
    engine.register_fn(
        "write_file",
        move |path: &str, content: &str| -> Result<(), Box<EvalAltResult>> {
            lock(&vfs).write(path, content.as_bytes()).map_err(script_error)
        },
    );

    let vfs = Arc::clone(fs);
    engine.register_fn(
        "write_bytes",
        move |path: &str, content: Blob| -> Result<(), Box<EvalAltResult>> {
            lock(&vfs).write(path, &content).map_err(script_error)
        },
    );

    let vfs = Arc::clone(fs);
    engine.register_fn(
        "append_file",
        move |path: &str, content: &str| -> Result<(), Box<EvalAltResult>> {
            lock(&vfs).append(path, content.as_bytes()).map_err(script_error)
        },
    );

    let vfs = Arc::clone(fs);
    engine.register_fn(
        "read_file",
        move |path: &str| -> Result<String, Box<EvalAltResult>> {
            let fs = lock(&vfs);
            let bytes = fs.read(path).map_err(script_error)?;
            String::from_utf8(bytes.to_vec())
                .map_err(|_| format!("file '{path}' is not valid UTF-8; use read_bytes").into())
        },
    );

    let vfs = Arc::clone(fs);
    engine.register_fn(
        "read_bytes",
        move |path: &str| -> Result<Blob, Box<EvalAltResult>> {
            lock(&vfs).read(path).map(<[u8]>::to_vec).map_err(script_error)
        },
    );

    let vfs = Arc::clone(fs);
    engine.register_fn("exists", move |path: &str| lock(&vfs).exists(path));

    let vfs = Arc::clone(fs);
    engine.register_fn("is_dir", move |path: &str| lock(&vfs).is_dir(path));

    let vfs = Arc::clone(fs);
    engine.register_fn(
        "mkdir",
        move |path: &str| -> Result<(), Box<EvalAltResult>> {
            lock(&vfs).mkdir(path).map_err(script_error)
        },
    );

    let vfs = Arc::clone(fs);
    engine.register_fn(
        "remove_file",
        move |path: &str| -> Result<(), Box<EvalAltResult>> {
            lock(&vfs).remove(path).map_err(script_error)
        },
    );

    let vfs = Arc::clone(fs);
    engine.register_fn(
        "list_dir",
        move |path: &str| -> Result<rhai::Array, Box<EvalAltResult>> {
            let entries = lock(&vfs).read_dir(path).map_err(script_error)?;
            Ok(entries
                .into_iter()
                .filter(|entry| !entry.is_marker())
                .map(|entry| Dynamic::from(entry.name))
                .collect())
        },
    );
}

/// Host surface that exists so common code does not fail on lookup, but
/// does nothing: no environment, no timers.
fn register_stubs(engine: &mut rhai::Engine) {
    engine.register_fn("env", |_name: &str| ());
    engine.register_fn("set_timeout", |_callback: FnPtr, _delay_ms: INT| -> INT { 0 });
    engine.register_fn("clear_timeout", |_id: INT| ());
}

fn script_error(error: FsError) -> Box<EvalAltResult> {
    error.to_string().into()
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
