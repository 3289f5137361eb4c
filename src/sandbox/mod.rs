//! The isolated execution environment and its lifecycle.
//!
//! ## Overview
//!
//! [`Engine`] is one booted interpreter with a private, memory-only
//! filesystem; [`EngineFactory`] boots engines. [`SandboxManager`] owns the
//! single engine instance, runs code on it and replaces it after every use.
//!
//! ## Implementations
//!
//! - **RhaiEngine**: embeds the Rhai scripting language. Scripts see only
//!   the registered host functions and a [`VirtualFs`] rooted at the home
//!   directory.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use glasshouse::config::SandboxConfig;
//! use glasshouse::sandbox::SandboxManager;
//!
//! let manager = SandboxManager::with_rhai(SandboxConfig::default());
//! manager.initialize().await?;
//! manager.wait_until_ready().await?;
//! let result = manager.execute("40 + 2", &[]).await;
//! manager.recycle().await?;
//! ```

pub mod library;
mod manager;
mod rhai_engine;
mod snapshot;
mod traits;
mod vfs;

pub use manager::{SandboxManager, SandboxState};
pub use rhai_engine::{kinds, RhaiEngine, RhaiEngineFactory};
pub use snapshot::{DefaultFileSnapshot, SeedFile};
pub use traits::{
    BootOptions, CapturedOutput, DirEntry, Engine, EngineError, EngineFactory, InterruptSignal,
};
pub use vfs::{FsError, VirtualFs};
