//! Default files copied into every fresh sandbox.

use crate::error::GlasshouseError;
use std::collections::HashSet;
use std::path::Path;
use walkdir::WalkDir;

/// One seed file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedFile {
    /// `/`-separated path relative to the seed root.
    pub name: String,
    /// File contents.
    pub bytes: Vec<u8>,
}

/// Immutable set of seed files, loaded once per process.
#[derive(Debug, Clone, Default)]
pub struct DefaultFileSnapshot {
    files: Vec<SeedFile>,
    names: HashSet<String>,
}

impl DefaultFileSnapshot {
    /// Reads every regular file below `seed_dir`, recursively.
    ///
    /// # Errors
    ///
    /// Returns an initialization error if the directory is missing or any
    /// entry cannot be read.
    pub fn load(seed_dir: &Path) -> Result<Self, GlasshouseError> {
        if !seed_dir.is_dir() {
            return Err(GlasshouseError::initialization(format!(
                "seed directory '{}' does not exist or is not a directory",
                seed_dir.display()
            )));
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(seed_dir).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                GlasshouseError::initialization(format!(
                    "failed to walk seed directory '{}': {}",
                    seed_dir.display(),
                    e
                ))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }

            let relative = entry.path().strip_prefix(seed_dir).map_err(|e| {
                GlasshouseError::initialization(format!(
                    "seed entry '{}' is outside the seed directory: {}",
                    entry.path().display(),
                    e
                ))
            })?;
            let name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            let bytes = std::fs::read(entry.path()).map_err(|e| {
                GlasshouseError::initialization(format!(
                    "failed to read seed file '{}': {}",
                    entry.path().display(),
                    e
                ))
            })?;

            files.push(SeedFile { name, bytes });
        }

        tracing::info!(
            seed_dir = %seed_dir.display(),
            files = files.len(),
            "default file snapshot loaded"
        );
        Ok(Self::from_files(files))
    }

    /// Builds a snapshot from in-memory files.
    #[must_use]
    pub fn from_files(files: Vec<SeedFile>) -> Self {
        let names = files.iter().map(|f| f.name.clone()).collect();
        Self { files, names }
    }

    /// The seed files, sorted by path.
    #[must_use]
    pub fn files(&self) -> &[SeedFile] {
        &self.files
    }

    /// Returns true if `name` is a seed file path.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Number of seed files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Returns true if there are no seed files.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn load_reads_nested_files_with_relative_names() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("seed.txt"), b"seed").unwrap();
        std::fs::create_dir(dir.path().join("data")).unwrap();
        std::fs::write(dir.path().join("data").join("table.csv"), b"a,b\n").unwrap();

        let snapshot = DefaultFileSnapshot::load(dir.path()).unwrap();

        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.contains("seed.txt"));
        assert!(snapshot.contains("data/table.csv"));
        let table = snapshot
            .files()
            .iter()
            .find(|f| f.name == "data/table.csv")
            .unwrap();
        assert_eq!(table.bytes, b"a,b\n");
    }

    #[test]
    fn empty_directory_gives_empty_snapshot() {
        let dir = TempDir::new().unwrap();
        let snapshot = DefaultFileSnapshot::load(dir.path()).unwrap();
        assert!(snapshot.is_empty());
    }

    #[test]
    fn missing_directory_is_an_initialization_error() {
        let error = DefaultFileSnapshot::load(Path::new("/nonexistent/seed")).unwrap_err();
        assert!(error.is_fatal());
        assert!(error.to_string().contains("/nonexistent/seed"));
    }
}
