//! # Glasshouse: stateless sandboxed code execution
//!
//! Runs untrusted code in an isolated, memory-only interpreter and returns
//! its value, printed output, created files and any error. No state survives
//! from one execution to the next: the interpreter is discarded and rebuilt
//! from an immutable seed snapshot after every request.
//!
//! ## Architecture
//!
//! - **RequestSerializer**: named FIFO locks; all executions share one
//! - **SandboxManager**: owns the single engine and its lifecycle
//! - **FileBridge** (`bridge`): base64 wire files in and out of the sandbox
//! - **Error enrichment** (`enrich`): appends source context to errors
//! - **ExecutionService**: lock, wait ready, execute, reply, recycle
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use glasshouse::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), GlasshouseError> {
//!     let manager = Arc::new(SandboxManager::with_rhai(SandboxConfig::default()));
//!     manager.initialize().await?;
//!
//!     let service = ExecutionService::new(manager);
//!     let result = service.submit(ExecutionRequest::new("1 + 1")).await;
//!     assert_eq!(result.final_expression, Some(serde_json::json!(2)));
//!     Ok(())
//! }
//! ```

pub mod bridge;
pub mod config;
pub mod enrich;
pub mod error;
pub mod logging;
pub mod sandbox;
pub mod serializer;
pub mod server;
pub mod service;
pub mod types;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{GlasshouseConfig, SandboxConfig, ServerConfig};
    pub use crate::error::{GlasshouseError, GlasshouseErrorKind};
    pub use crate::logging::{LogLevel, LoggingConfig};
    pub use crate::sandbox::{
        Engine, EngineFactory, RhaiEngineFactory, SandboxManager, SandboxState,
    };
    pub use crate::serializer::RequestSerializer;
    pub use crate::service::ExecutionService;
    pub use crate::types::{
        ErrorInfo, ExecutionId, ExecutionRequest, ExecutionResult, InputFile, WireFile,
    };
}
