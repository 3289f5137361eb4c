//! Lifecycle of the single execution slot.
//!
//! The manager owns at most one booted engine. Each execution runs on a
//! fresh instance and is followed by a recycle that drops the instance and
//! boots a new one from the immutable snapshot, so nothing the code did
//! survives into the next request.
//!
//! State machine:
//!
//! ```text
//! Uninitialized -> Preparing -> Ready -> Executing -> Recycling -> Preparing -> ...
//!                      |
//!                      +-- boot failure --> Uninitialized
//! ```

use crate::bridge::{self, DecodedFile};
use crate::config::SandboxConfig;
use crate::enrich::enrich;
use crate::error::GlasshouseError;
use crate::sandbox::rhai_engine::RhaiEngineFactory;
use crate::sandbox::snapshot::DefaultFileSnapshot;
use crate::sandbox::traits::{BootOptions, Engine, EngineError, EngineFactory, InterruptSignal};
use crate::types::{ExecutionResult, InputFile};
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::Instant;

/// Lifecycle state of the execution slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SandboxState {
    /// No engine has been booted, or the last boot failed.
    Uninitialized,
    /// An engine is booting.
    Preparing,
    /// An engine is booted and idle.
    Ready,
    /// Code is running, or has run and the engine awaits recycling.
    Executing,
    /// The used engine is being discarded.
    Recycling,
}

impl fmt::Display for SandboxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Preparing => "preparing",
            Self::Ready => "ready",
            Self::Executing => "executing",
            Self::Recycling => "recycling",
        };
        f.write_str(name)
    }
}

/// A booted engine and the interrupt signal it polls.
#[derive(Debug)]
struct Cycle {
    engine: Box<dyn Engine>,
    interrupt: InterruptSignal,
}

/// Owns the engine instance and drives it through its lifecycle.
///
/// Shared behind an `Arc`; the service guarantees that `execute` and
/// `recycle` are never called concurrently.
#[derive(Debug)]
pub struct SandboxManager {
    config: SandboxConfig,
    factory: Arc<dyn EngineFactory>,
    snapshot: OnceLock<Arc<DefaultFileSnapshot>>,
    state: Mutex<SandboxState>,
    cycle: tokio::sync::Mutex<Option<Cycle>>,
    /// Signal of the current cycle, reachable without awaiting `cycle`.
    interrupt: Mutex<Option<InterruptSignal>>,
}

impl SandboxManager {
    /// Creates a manager that boots engines from `factory`.
    #[must_use]
    pub fn new(config: SandboxConfig, factory: Arc<dyn EngineFactory>) -> Self {
        Self {
            config,
            factory,
            snapshot: OnceLock::new(),
            state: Mutex::new(SandboxState::Uninitialized),
            cycle: tokio::sync::Mutex::new(None),
            interrupt: Mutex::new(None),
        }
    }

    /// Creates a manager backed by the Rhai engine.
    #[must_use]
    pub fn with_rhai(config: SandboxConfig) -> Self {
        Self::new(config, Arc::new(RhaiEngineFactory::new()))
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SandboxState {
        *lock(&self.state)
    }

    /// The sandbox settings this manager was built with.
    #[must_use]
    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Loads the snapshot and boots the first engine.
    ///
    /// # Errors
    ///
    /// Returns an initialization error if the seed directory is unreadable
    /// or the engine fails to boot, and an invalid state error if called
    /// after a successful initialization.
    pub async fn initialize(&self) -> Result<(), GlasshouseError> {
        let state = self.state();
        if state != SandboxState::Uninitialized {
            return Err(GlasshouseError::invalid_state("initialize", state));
        }

        self.snapshot()?;
        self.transition(
            "initialize",
            &[SandboxState::Uninitialized],
            SandboxState::Preparing,
        )?;
        self.boot_cycle().await
    }

    /// Polls until the state is Ready.
    ///
    /// # Errors
    ///
    /// Returns a timeout error after `ready_poll_attempts` polls.
    pub async fn wait_until_ready(&self) -> Result<(), GlasshouseError> {
        let interval = self.config.ready_poll_interval();
        let attempts = self.config.ready_poll_attempts;

        for attempt in 1..=attempts {
            if self.state() == SandboxState::Ready {
                return Ok(());
            }
            if attempt < attempts {
                tokio::time::sleep(interval).await;
            }
        }

        tracing::warn!(attempts, state = %self.state(), "sandbox did not become ready");
        Err(GlasshouseError::timeout(attempts, interval))
    }

    /// Runs `code` against the current engine.
    ///
    /// Never fails: every problem is reported inside the result. The state
    /// stays Executing until [`SandboxManager::recycle`] runs, except when
    /// the request is rejected before reaching the engine.
    pub async fn execute(&self, code: &str, files: &[InputFile]) -> ExecutionResult {
        let inputs = match validate(code, files) {
            Ok(inputs) => inputs,
            Err(e) => {
                tracing::debug!(error = %e, "request rejected before execution");
                return ExecutionResult::from_error(&e);
            }
        };

        if let Err(e) = self.transition("execute", &[SandboxState::Ready], SandboxState::Executing)
        {
            return ExecutionResult::from_error(&e);
        }

        let snapshot = match self.snapshot() {
            Ok(snapshot) => snapshot,
            Err(e) => return ExecutionResult::from_error(&e),
        };

        let mut slot = self.cycle.lock().await;
        let Some(Cycle { mut engine, interrupt }) = slot.take() else {
            return ExecutionResult::from_error(&GlasshouseError::internal(
                "no engine is booted although the sandbox is ready",
            ));
        };

        let code = code.to_string();
        let joined = tokio::task::spawn_blocking(move || {
            let result = run_cycle(engine.as_mut(), &code, &inputs, &snapshot);
            (engine, result)
        })
        .await;

        match joined {
            Ok((engine, result)) => {
                *slot = Some(Cycle { engine, interrupt });
                result
            }
            Err(e) => {
                tracing::error!(error = %e, "engine worker failed");
                ExecutionResult::from_error(&GlasshouseError::internal(format!(
                    "engine worker failed: {e}"
                )))
            }
        }
    }

    /// Asks the running code to stop. Returns immediately; the engine stops
    /// at its next interrupt check.
    pub fn terminate(&self) {
        if let Some(interrupt) = lock(&self.interrupt).as_ref() {
            interrupt.set();
            tracing::debug!("interrupt requested");
        }
    }

    /// Discards the current engine and boots a fresh one from the snapshot.
    ///
    /// # Errors
    ///
    /// Returns an invalid state error unless the state is Ready or
    /// Executing, and an initialization error if the new engine fails to
    /// boot.
    pub async fn recycle(&self) -> Result<(), GlasshouseError> {
        self.transition(
            "recycle",
            &[SandboxState::Ready, SandboxState::Executing],
            SandboxState::Recycling,
        )?;
        let started = Instant::now();

        drop(self.cycle.lock().await.take());
        lock(&self.interrupt).take();

        self.transition(
            "recycle",
            &[SandboxState::Recycling],
            SandboxState::Preparing,
        )?;
        self.boot_cycle().await?;

        tracing::info!(elapsed_ms = elapsed_ms(started), "sandbox recycled");
        Ok(())
    }

    fn snapshot(&self) -> Result<Arc<DefaultFileSnapshot>, GlasshouseError> {
        if let Some(snapshot) = self.snapshot.get() {
            return Ok(Arc::clone(snapshot));
        }
        let loaded = Arc::new(DefaultFileSnapshot::load(&self.config.seed_dir)?);
        Ok(Arc::clone(self.snapshot.get_or_init(|| loaded)))
    }

    /// Boots an engine while the state is Preparing.
    async fn boot_cycle(&self) -> Result<(), GlasshouseError> {
        let started = Instant::now();
        let snapshot = match self.snapshot() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.set_state(SandboxState::Uninitialized);
                return Err(e);
            }
        };

        let interrupt = InterruptSignal::new();
        let options = BootOptions::new(self.config.home_dir.clone(), interrupt.clone());
        let factory = Arc::clone(&self.factory);
        let preload = self.config.preload_libraries.clone();

        let booted = tokio::task::spawn_blocking(move || {
            boot_engine(factory.as_ref(), options, &snapshot, &preload)
        })
        .await;

        let engine = match booted {
            Ok(Ok(engine)) => engine,
            Ok(Err(e)) => return Err(self.boot_failed(e.to_string())),
            Err(e) => return Err(self.boot_failed(format!("boot worker failed: {e}"))),
        };

        *self.cycle.lock().await = Some(Cycle {
            engine,
            interrupt: interrupt.clone(),
        });
        *lock(&self.interrupt) = Some(interrupt);
        self.set_state(SandboxState::Ready);

        tracing::debug!(
            engine = self.factory.name(),
            elapsed_ms = elapsed_ms(started),
            "sandbox ready"
        );
        Ok(())
    }

    fn boot_failed(&self, reason: String) -> GlasshouseError {
        tracing::error!(reason = %reason, "sandbox boot failed");
        self.set_state(SandboxState::Uninitialized);
        GlasshouseError::initialization(reason)
    }

    fn transition(
        &self,
        operation: &'static str,
        from: &[SandboxState],
        to: SandboxState,
    ) -> Result<(), GlasshouseError> {
        let mut state = lock(&self.state);
        if !from.contains(&*state) {
            return Err(GlasshouseError::invalid_state(operation, *state));
        }
        tracing::debug!(from = %*state, to = %to, "sandbox state change");
        *state = to;
        Ok(())
    }

    fn set_state(&self, to: SandboxState) {
        let mut state = lock(&self.state);
        tracing::debug!(from = %*state, to = %to, "sandbox state change");
        *state = to;
    }
}

/// Rejects the request before any engine work.
fn validate(code: &str, files: &[InputFile]) -> Result<Vec<DecodedFile>, GlasshouseError> {
    if code.trim().is_empty() {
        return Err(GlasshouseError::parsing("code must not be empty"));
    }
    bridge::decode_inputs(files)
}

/// Boots an engine and fills it with the snapshot and preloaded libraries.
fn boot_engine(
    factory: &dyn EngineFactory,
    options: BootOptions,
    snapshot: &DefaultFileSnapshot,
    preload: &[String],
) -> Result<Box<dyn Engine>, EngineError> {
    let mut engine = factory.boot(options)?;
    for file in snapshot.files() {
        engine.write_file(&file.name, &file.bytes)?;
    }
    if !preload.is_empty() {
        if let Err(e) = engine.load_libraries(preload) {
            tracing::warn!(error = %e, "failed to preload libraries");
        }
    }
    Ok(engine)
}

/// One execution on the blocking pool.
fn run_cycle(
    engine: &mut dyn Engine,
    code: &str,
    inputs: &[DecodedFile],
    snapshot: &DefaultFileSnapshot,
) -> ExecutionResult {
    let libraries = engine.referenced_libraries(code);
    if !libraries.is_empty() {
        if let Err(e) = engine.load_libraries(&libraries) {
            tracing::warn!(error = %e, ?libraries, "failed to load referenced libraries");
        }
    }

    let written = inputs
        .iter()
        .try_for_each(|file| engine.write_file(&file.name, &file.bytes));

    let started = Instant::now();
    let outcome = written.and_then(|()| engine.run(code));
    let runtime_ms = elapsed_ms(started);

    let input_names: HashSet<&str> = inputs.iter().map(|file| file.name.as_str()).collect();
    let output_files = match bridge::collect_outputs(&*engine, snapshot, &input_names) {
        Ok(files) => files,
        Err(e) => {
            tracing::warn!(error = %e, "failed to collect output files");
            Vec::new()
        }
    };
    let output = engine.take_output();

    let result = match outcome {
        Ok(value) => ExecutionResult::success(value),
        Err(e) => {
            tracing::debug!(kind = %e.kind, "code raised an error");
            let message = enrich(code, &e.message);
            ExecutionResult::from_error(&GlasshouseError::execution(e.kind, message))
        }
    };

    result
        .with_output_files(output_files)
        .with_streams(output.stdout, output.stderr)
        .with_runtime_ms(runtime_ms)
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::traits::{CapturedOutput, DirEntry};
    use serde_json::Value;
    use std::time::Duration;
    use tempfile::TempDir;

    fn seed_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("seed.txt"), b"seed").unwrap();
        dir
    }

    fn config(seed: &TempDir) -> SandboxConfig {
        SandboxConfig::new()
            .with_seed_dir(seed.path())
            .with_ready_poll(Duration::from_millis(5), 3)
    }

    async fn ready_manager(seed: &TempDir) -> SandboxManager {
        let manager = SandboxManager::with_rhai(config(seed));
        manager.initialize().await.unwrap();
        manager
    }

    #[test]
    fn state_display_is_lowercase() {
        assert_eq!(SandboxState::Uninitialized.to_string(), "uninitialized");
        assert_eq!(SandboxState::Executing.to_string(), "executing");
    }

    #[tokio::test]
    async fn initialize_reaches_ready() {
        let seed = seed_dir();
        let manager = ready_manager(&seed).await;
        assert_eq!(manager.state(), SandboxState::Ready);

        let again = manager.initialize().await.unwrap_err();
        assert_eq!(again.error_type(), "InternalError");
    }

    #[tokio::test]
    async fn initialize_without_seed_dir_is_fatal() {
        let manager = SandboxManager::with_rhai(
            SandboxConfig::new().with_seed_dir("/nonexistent/glasshouse-seed"),
        );
        let error = manager.initialize().await.unwrap_err();
        assert!(error.is_fatal());
        assert_eq!(manager.state(), SandboxState::Uninitialized);
    }

    #[tokio::test]
    async fn execute_then_recycle() {
        let seed = seed_dir();
        let manager = ready_manager(&seed).await;

        let result = manager.execute("1 + 1", &[]).await;
        assert!(result.success);
        assert_eq!(result.final_expression, Some(Value::from(2)));
        assert_eq!(manager.state(), SandboxState::Executing);

        manager.recycle().await.unwrap();
        assert_eq!(manager.state(), SandboxState::Ready);
    }

    #[tokio::test]
    async fn empty_code_is_rejected_and_state_stays_ready() {
        let seed = seed_dir();
        let manager = ready_manager(&seed).await;

        let result = manager.execute("   \n", &[]).await;
        assert!(!result.success);
        assert_eq!(result.error.unwrap().kind, "ParsingError");
        assert_eq!(manager.state(), SandboxState::Ready);
    }

    #[tokio::test]
    async fn execute_requires_ready() {
        let seed = seed_dir();
        let manager = SandboxManager::with_rhai(config(&seed));

        let result = manager.execute("1", &[]).await;
        assert_eq!(result.error.unwrap().kind, "InternalError");
    }

    #[tokio::test]
    async fn wait_until_ready_times_out() {
        let seed = seed_dir();
        let manager = SandboxManager::with_rhai(config(&seed));

        let error = manager.wait_until_ready().await.unwrap_err();
        assert!(error.is_timeout());
        assert_eq!(error.error_type(), "TimeoutError");
    }

    #[tokio::test]
    async fn seed_files_are_readable_but_not_returned() {
        let seed = seed_dir();
        let manager = ready_manager(&seed).await;

        let result = manager
            .execute(r#"let s = read_file("seed.txt"); write_file("copy.txt", s); s"#, &[])
            .await;
        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.final_expression, Some(Value::from("seed")));
        let names: Vec<&str> = result.output_files.iter().map(|f| f.filename.as_str()).collect();
        assert_eq!(names, vec!["copy.txt"]);
    }

    #[tokio::test]
    async fn errors_are_enriched_and_streams_kept() {
        let seed = seed_dir();
        let manager = ready_manager(&seed).await;

        let code = "print(\"before\"); let z = 0;\nlet y = 1 / z;\nprint(\"after\");";
        let result = manager.execute(code, &[]).await;

        assert!(!result.success);
        let error = result.error.unwrap();
        assert_eq!(error.kind, "ArithmeticError");
        assert!(error.message.contains("Code context:"));
        assert!(error.message.contains("2: let y = 1 / z;"));
        assert_eq!(result.stdout, "before\n");
    }

    #[tokio::test]
    async fn recycle_discards_files_written_by_code() {
        let seed = seed_dir();
        let manager = ready_manager(&seed).await;

        manager.execute(r#"write_file("left.txt", "x");"#, &[]).await;
        manager.recycle().await.unwrap();

        let result = manager.execute(r#"exists("left.txt")"#, &[]).await;
        assert_eq!(result.final_expression, Some(Value::from(false)));
    }

    #[tokio::test]
    async fn recycle_requires_ready_or_executing() {
        let seed = seed_dir();
        let manager = SandboxManager::with_rhai(config(&seed));
        let error = manager.recycle().await.unwrap_err();
        assert_eq!(error.error_type(), "InternalError");
    }

    #[tokio::test]
    async fn terminate_interrupts_the_current_cycle() {
        let seed = seed_dir();
        let manager = ready_manager(&seed).await;

        manager.terminate();
        let result = manager.execute("let i = 0; loop { i += 1; }", &[]).await;
        assert_eq!(result.error.unwrap().kind, "InterruptedError");
    }

    /// Engine whose boot always fails.
    #[derive(Debug)]
    struct BrokenFactory;

    impl EngineFactory for BrokenFactory {
        fn boot(&self, _options: BootOptions) -> Result<Box<dyn Engine>, EngineError> {
            Err(EngineError::new("BootError", "no interpreter"))
        }

        fn name(&self) -> &'static str {
            "broken"
        }
    }

    #[tokio::test]
    async fn boot_failure_returns_to_uninitialized() {
        let seed = seed_dir();
        let manager = SandboxManager::new(config(&seed), Arc::new(BrokenFactory));

        let error = manager.initialize().await.unwrap_err();
        assert!(error.is_fatal());
        assert!(error.to_string().contains("no interpreter"));
        assert_eq!(manager.state(), SandboxState::Uninitialized);
    }

    /// Engine that records nothing and panics when run.
    #[derive(Debug)]
    struct PanickingEngine;

    impl Engine for PanickingEngine {
        fn home(&self) -> &str {
            "/home/sandbox"
        }
        fn write_file(&mut self, _path: &str, _bytes: &[u8]) -> Result<(), EngineError> {
            Ok(())
        }
        fn read_file(&self, path: &str) -> Result<Vec<u8>, EngineError> {
            Err(EngineError::new("FileSystemError", path))
        }
        fn read_dir(&self, _path: &str) -> Result<Vec<DirEntry>, EngineError> {
            Ok(Vec::new())
        }
        fn referenced_libraries(&self, _code: &str) -> Vec<String> {
            Vec::new()
        }
        fn load_libraries(&mut self, _names: &[String]) -> Result<(), EngineError> {
            Ok(())
        }
        fn run(&mut self, _code: &str) -> Result<Option<Value>, EngineError> {
            panic!("engine crashed");
        }
        fn take_output(&mut self) -> CapturedOutput {
            CapturedOutput::default()
        }
    }

    #[derive(Debug)]
    struct PanickingFactory;

    impl EngineFactory for PanickingFactory {
        fn boot(&self, _options: BootOptions) -> Result<Box<dyn Engine>, EngineError> {
            Ok(Box::new(PanickingEngine))
        }

        fn name(&self) -> &'static str {
            "panicking"
        }
    }

    #[tokio::test]
    async fn engine_panic_becomes_internal_error_and_recycle_recovers() {
        let seed = seed_dir();
        let manager = SandboxManager::new(config(&seed), Arc::new(PanickingFactory));
        manager.initialize().await.unwrap();

        let result = manager.execute("anything", &[]).await;
        assert_eq!(result.error.unwrap().kind, "InternalError");

        manager.recycle().await.unwrap();
        assert_eq!(manager.state(), SandboxState::Ready);
    }
}
