//! Configuration file loading.
//!
//! Loads glasshouse configuration from TOML files at XDG-compliant locations.

use crate::config::types::GlasshouseConfig;
use crate::error::GlasshouseError;
use std::path::{Path, PathBuf};

/// Default configuration file name for project-local config.
const LOCAL_CONFIG_NAME: &str = "glasshouse.toml";

/// Default configuration file name within XDG config directory.
const XDG_CONFIG_NAME: &str = "config.toml";

/// Application name for XDG directory lookup.
const APP_NAME: &str = "glasshouse";

/// Loads configuration from the default search paths.
///
/// Search order:
/// 1. `./glasshouse.toml` (project-local)
/// 2. `~/.config/glasshouse/config.toml` (XDG config)
///
/// Returns the default configuration if no config file is found.
///
/// # Errors
///
/// Returns an error if a config file exists but cannot be parsed.
pub fn load() -> Result<GlasshouseConfig, GlasshouseError> {
    match locate() {
        Some(path) => from_path(&path),
        None => Ok(GlasshouseConfig::default()),
    }
}

/// Returns the first search path that exists, if any.
#[must_use]
pub fn locate() -> Option<PathBuf> {
    search_paths().into_iter().find(|path| path.exists())
}

/// Loads configuration from a specific file path.
///
/// # Errors
///
/// Returns an error if:
/// - The file cannot be read
/// - The file contains invalid TOML
/// - The TOML doesn't match the expected schema
pub fn from_path(path: &Path) -> Result<GlasshouseConfig, GlasshouseError> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        GlasshouseError::configuration(
            "config_file",
            format!("failed to read '{}': {}", path.display(), e),
        )
    })?;

    from_str(&contents).map_err(|e| {
        GlasshouseError::configuration(
            "config_file",
            format!("failed to parse '{}': {}", path.display(), e),
        )
    })
}

/// Parses configuration from a TOML string.
///
/// # Errors
///
/// Returns an error if the TOML is invalid or doesn't match the schema.
pub fn from_str(toml_str: &str) -> Result<GlasshouseConfig, GlasshouseError> {
    let config: GlasshouseConfig = toml::from_str(toml_str)
        .map_err(|e| GlasshouseError::configuration("config", format!("invalid TOML: {e}")))?;
    config.validate()?;
    Ok(config)
}

/// Returns the paths that would be searched for configuration files.
#[must_use]
pub fn search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(LOCAL_CONFIG_NAME)];

    if let Some(config_dir) = xdg_config_dir() {
        paths.push(config_dir.join(XDG_CONFIG_NAME));
    }

    paths
}

/// Returns the path to the XDG config directory for glasshouse.
///
/// This is `~/.config/glasshouse` on most systems.
#[must_use]
pub fn xdg_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join(APP_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn from_str_parses_all_sections() {
        let toml = r#"
            [server]
            bind = "127.0.0.1:9000"

            [sandbox]
            seed_dir = "/srv/seed"
            ready_poll_interval_ms = 10
            ready_poll_attempts = 3
            preload_libraries = ["csv"]

            [logging]
            level = "debug"
            file = true
        "#;

        let config = from_str(toml).unwrap();

        assert_eq!(config.server.bind, "127.0.0.1:9000");
        assert_eq!(config.sandbox.seed_dir, PathBuf::from("/srv/seed"));
        assert_eq!(config.sandbox.ready_poll_interval(), Duration::from_millis(10));
        assert_eq!(config.sandbox.ready_poll_attempts, 3);
        assert_eq!(config.sandbox.preload_libraries, vec!["csv".to_string()]);
        assert_eq!(config.logging.level, crate::logging::LogLevel::Debug);
        assert!(config.logging.file);
    }

    #[test]
    fn from_str_empty_document_uses_defaults() {
        let config = from_str("").unwrap();
        assert_eq!(config, GlasshouseConfig::default());
    }

    #[test]
    fn from_str_error_on_invalid_toml() {
        let err = from_str("this is not valid toml [[[").unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn from_str_rejects_zero_poll_attempts() {
        let err = from_str("[sandbox]\nready_poll_attempts = 0").unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("ready_poll_attempts"));
    }

    #[test]
    fn from_str_rejects_relative_home_dir() {
        let err = from_str("[sandbox]\nhome_dir = \"home\"").unwrap_err();
        assert!(err.to_string().contains("home_dir"));
    }

    #[test]
    fn from_path_reads_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "[server]\nbind = \"0.0.0.0:3000\"").unwrap();

        let config = from_path(&config_path).unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:3000");
    }

    #[test]
    fn from_path_error_on_missing_file() {
        let err = from_path(Path::new("/nonexistent/path/config.toml")).unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("failed to read"));
    }

    #[test]
    fn locate_returns_an_existing_search_path() {
        if let Some(path) = locate() {
            assert!(path.exists());
            assert!(search_paths().contains(&path));
        }
    }

    #[test]
    fn from_str_reads_server_body_limit() {
        let config = from_str("[server]\nmax_body_bytes = 2048").unwrap();
        assert_eq!(config.server.max_body_bytes, 2048);
    }

    #[test]
    fn search_paths_includes_local() {
        let paths = search_paths();
        assert!(paths
            .iter()
            .any(|p| p.file_name() == Some(std::ffi::OsStr::new(LOCAL_CONFIG_NAME))));
    }

    #[test]
    fn xdg_config_dir_returns_path() {
        if let Some(dir) = xdg_config_dir() {
            assert!(dir.ends_with(APP_NAME));
        }
    }
}
