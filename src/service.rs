//! The request pipeline: serialize, wait for readiness, execute, reply,
//! then recycle.
//!
//! Every submission runs under the single `"execution"` lock, so at most one
//! request touches the sandbox at a time and requests are served in the
//! order they were submitted. The caller receives its result before the
//! sandbox is recycled; the lock is held until the recycle finishes.

use crate::error::GlasshouseError;
use crate::sandbox::SandboxManager;
use crate::serializer::RequestSerializer;
use crate::types::{ExecutionId, ExecutionRequest, ExecutionResult};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{oneshot, watch};
use tracing::Instrument;

/// Name of the lock every execution runs under.
pub const EXECUTION_LOCK: &str = "execution";

/// Serializes submissions onto the sandbox manager.
///
/// Cloning is cheap; clones share the manager, the lock registry and the
/// fatal signal.
#[derive(Debug, Clone)]
pub struct ExecutionService {
    manager: Arc<SandboxManager>,
    serializer: RequestSerializer,
    fatal: Arc<watch::Sender<Option<String>>>,
}

impl ExecutionService {
    /// Creates a service around an already initialized manager.
    #[must_use]
    pub fn new(manager: Arc<SandboxManager>) -> Self {
        let (fatal, _) = watch::channel(None);
        Self {
            manager,
            serializer: RequestSerializer::new(),
            fatal: Arc::new(fatal),
        }
    }

    /// The sandbox manager behind this service.
    #[must_use]
    pub fn manager(&self) -> &Arc<SandboxManager> {
        &self.manager
    }

    /// Receives the reason once the sandbox can no longer be recycled.
    ///
    /// After that every later request would time out, so the process
    /// should shut down.
    #[must_use]
    pub fn subscribe_fatal(&self) -> watch::Receiver<Option<String>> {
        self.fatal.subscribe()
    }

    /// Submits a request under a fresh execution id.
    ///
    /// The place in line is taken when this method is called. Must be
    /// called from within a Tokio runtime.
    pub fn submit(
        &self,
        request: ExecutionRequest,
    ) -> impl Future<Output = ExecutionResult> + Send + 'static {
        self.submit_with_id(ExecutionId::new(), request)
    }

    /// Submits a request, tagging its log lines with `id`.
    pub fn submit_with_id(
        &self,
        id: ExecutionId,
        request: ExecutionRequest,
    ) -> impl Future<Output = ExecutionResult> + Send + 'static {
        let (reply, receiver) = oneshot::channel();
        let manager = Arc::clone(&self.manager);
        let fatal = Arc::clone(&self.fatal);
        let span = tracing::info_span!("execution", execution_id = %id);

        tracing::debug!(parent: &span, queued = self.serializer.queue_len(EXECUTION_LOCK), "request queued");

        let task = self.serializer.acquire(
            EXECUTION_LOCK,
            async move {
                if let Err(e) = manager.wait_until_ready().await {
                    let _ = reply.send(ExecutionResult::from_error(&e));
                    return;
                }

                let result = manager.execute(&request.code, &request.files).await;
                tracing::info!(
                    success = result.success,
                    runtime_ms = result.runtime_ms,
                    outputs = result.output_files.len(),
                    "execution finished"
                );
                if reply.send(result).is_err() {
                    tracing::debug!("caller went away before the result was ready");
                }

                manager.terminate();
                if let Err(e) = manager.recycle().await {
                    tracing::error!(error = %e, "sandbox recycle failed");
                    fatal.send_replace(Some(e.to_string()));
                }
            }
            .instrument(span),
        );
        tokio::spawn(task);

        async move {
            receiver.await.unwrap_or_else(|_| {
                ExecutionResult::from_error(&GlasshouseError::internal(
                    "execution task ended without a result",
                ))
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SandboxConfig;
    use crate::sandbox::SandboxState;
    use std::time::Duration;
    use tempfile::TempDir;

    async fn service() -> (ExecutionService, TempDir) {
        let seed = TempDir::new().unwrap();
        let config = SandboxConfig::new()
            .with_seed_dir(seed.path())
            .with_ready_poll(Duration::from_millis(10), 500);
        let manager = Arc::new(SandboxManager::with_rhai(config));
        manager.initialize().await.unwrap();
        (ExecutionService::new(manager), seed)
    }

    #[tokio::test]
    async fn submit_returns_final_expression() {
        let (service, _seed) = service().await;
        let result = service.submit(ExecutionRequest::new("1 + 1")).await;

        assert!(result.success);
        assert_eq!(result.final_expression, Some(serde_json::json!(2)));
    }

    #[tokio::test]
    async fn sandbox_is_recycled_after_each_request() {
        let (service, _seed) = service().await;
        service
            .submit(ExecutionRequest::new(r#"write_file("state.txt", "1");"#))
            .await;

        let result = service
            .submit(ExecutionRequest::new(r#"exists("state.txt")"#))
            .await;
        assert_eq!(result.final_expression, Some(serde_json::json!(false)));
    }

    #[tokio::test]
    async fn parsing_errors_do_not_reach_the_engine() {
        let (service, _seed) = service().await;
        let result = service.submit(ExecutionRequest::new("")).await;

        assert!(!result.success);
        assert_eq!(result.error.unwrap().kind, "ParsingError");
        assert_eq!(result.runtime_ms, 0);
    }

    #[tokio::test]
    async fn uninitialized_sandbox_times_out_without_fatal_signal() {
        let seed = TempDir::new().unwrap();
        let config = SandboxConfig::new()
            .with_seed_dir(seed.path())
            .with_ready_poll(Duration::from_millis(1), 3);
        let manager = Arc::new(SandboxManager::with_rhai(config));
        let service = ExecutionService::new(Arc::clone(&manager));

        let result = service.submit(ExecutionRequest::new("1")).await;
        assert_eq!(result.error.unwrap().kind, "TimeoutError");
        assert_eq!(manager.state(), SandboxState::Uninitialized);
        assert!(service.subscribe_fatal().borrow().is_none());
    }
}
