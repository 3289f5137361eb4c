//! Configuration management for glasshouse.
//!
//! # Configuration File Format
//!
//! Configuration is stored in TOML format. The search order is:
//! 1. `./glasshouse.toml` (project-local)
//! 2. `~/.config/glasshouse/config.toml` (XDG config)
//!
//! Every key is optional; missing keys take the defaults shown below.
//!
//! ```toml
//! [server]
//! bind = "0.0.0.0:8080"
//! max_body_bytes = 67108864
//!
//! [sandbox]
//! seed_dir = "seed"
//! home_dir = "/home/sandbox"
//! ready_poll_interval_ms = 100
//! ready_poll_attempts = 100
//! preload_libraries = ["stats", "text"]
//!
//! [logging]
//! enabled = true
//! level = "info"
//! file = false
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use glasshouse::config;
//!
//! // Load from default search paths
//! let config = config::load()?;
//!
//! // Load from a specific path
//! let config = config::from_path(Path::new("/etc/glasshouse/config.toml"))?;
//! ```

mod file;
mod types;

pub use file::{from_path, from_str, load, locate, search_paths, xdg_config_dir};
pub use types::{GlasshouseConfig, SandboxConfig, ServerConfig};
