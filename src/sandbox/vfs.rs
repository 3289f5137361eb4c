//! Memory-only filesystem confined to the sandbox home directory.
//!
//! Paths are `/`-separated. Relative paths are joined with the home
//! directory, `.` and `..` are normalized lexically, and anything that ends
//! up outside home is rejected.

use crate::sandbox::traits::{DirEntry, EngineError};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Filesystem error kind reported to engines.
const FILE_SYSTEM_ERROR: &str = "FileSystemError";

/// Errors from [`VirtualFs`] operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsError {
    /// Nothing exists at the path.
    NotFound(String),
    /// A file operation targeted a directory.
    IsDirectory(String),
    /// A directory operation targeted a file, or a parent is a file.
    NotADirectory(String),
    /// The path resolves outside the home directory.
    OutsideHome(String),
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(path) => write!(f, "no such file or directory: '{path}'"),
            Self::IsDirectory(path) => write!(f, "is a directory: '{path}'"),
            Self::NotADirectory(path) => write!(f, "not a directory: '{path}'"),
            Self::OutsideHome(path) => {
                write!(f, "path '{path}' is outside the sandbox home directory")
            }
        }
    }
}

impl std::error::Error for FsError {}

impl From<FsError> for EngineError {
    fn from(error: FsError) -> Self {
        EngineError::new(FILE_SYSTEM_ERROR, error.to_string())
    }
}

/// In-memory file tree rooted at a home directory.
#[derive(Debug, Clone)]
pub struct VirtualFs {
    home: String,
    files: BTreeMap<String, Vec<u8>>,
    dirs: BTreeSet<String>,
}

impl VirtualFs {
    /// Creates an empty filesystem whose home directory exists.
    #[must_use]
    pub fn new(home: &str) -> Self {
        let home = normalize(home).unwrap_or_else(|| "/".to_string());
        let mut dirs = BTreeSet::new();
        dirs.insert(home.clone());
        Self {
            home,
            files: BTreeMap::new(),
            dirs,
        }
    }

    /// The normalized home directory.
    #[must_use]
    pub fn home(&self) -> &str {
        &self.home
    }

    /// Resolves `path` to a normalized absolute path inside home.
    ///
    /// # Errors
    ///
    /// Returns [`FsError::OutsideHome`] if the path escapes home.
    pub fn resolve(&self, path: &str) -> Result<String, FsError> {
        let joined = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("{}/{}", self.home, path)
        };

        let resolved = normalize(&joined).ok_or_else(|| FsError::OutsideHome(path.to_string()))?;
        if resolved == self.home || resolved.starts_with(&format!("{}/", self.home)) {
            Ok(resolved)
        } else {
            Err(FsError::OutsideHome(path.to_string()))
        }
    }

    /// Writes a file, creating missing parent directories.
    ///
    /// # Errors
    ///
    /// Fails if the path escapes home, names a directory, or a parent is a file.
    pub fn write(&mut self, path: &str, bytes: &[u8]) -> Result<(), FsError> {
        let resolved = self.resolve(path)?;
        if self.dirs.contains(&resolved) {
            return Err(FsError::IsDirectory(path.to_string()));
        }
        self.create_parents(&resolved, path)?;
        self.files.insert(resolved, bytes.to_vec());
        Ok(())
    }

    /// Appends to a file, creating it if missing.
    ///
    /// # Errors
    ///
    /// Same as [`VirtualFs::write`].
    pub fn append(&mut self, path: &str, bytes: &[u8]) -> Result<(), FsError> {
        let resolved = self.resolve(path)?;
        match self.files.get_mut(&resolved) {
            Some(existing) => {
                existing.extend_from_slice(bytes);
                Ok(())
            }
            None => self.write(path, bytes),
        }
    }

    /// Reads a file.
    ///
    /// # Errors
    ///
    /// Fails if the path escapes home, is a directory, or does not exist.
    pub fn read(&self, path: &str) -> Result<&[u8], FsError> {
        let resolved = self.resolve(path)?;
        if let Some(bytes) = self.files.get(&resolved) {
            return Ok(bytes);
        }
        if self.dirs.contains(&resolved) {
            return Err(FsError::IsDirectory(path.to_string()));
        }
        Err(FsError::NotFound(path.to_string()))
    }

    /// Returns true if a file or directory exists at `path`.
    #[must_use]
    pub fn exists(&self, path: &str) -> bool {
        self.resolve(path)
            .is_ok_and(|p| self.files.contains_key(&p) || self.dirs.contains(&p))
    }

    /// Returns true if `path` is a directory.
    #[must_use]
    pub fn is_dir(&self, path: &str) -> bool {
        self.resolve(path).is_ok_and(|p| self.dirs.contains(&p))
    }

    /// Creates a directory and its missing parents.
    ///
    /// # Errors
    ///
    /// Fails if the path escapes home or a file is in the way.
    pub fn mkdir(&mut self, path: &str) -> Result<(), FsError> {
        let resolved = self.resolve(path)?;
        if self.files.contains_key(&resolved) {
            return Err(FsError::NotADirectory(path.to_string()));
        }
        self.create_parents(&resolved, path)?;
        self.dirs.insert(resolved);
        Ok(())
    }

    /// Removes a file.
    ///
    /// # Errors
    ///
    /// Fails if the path is a directory or does not exist.
    pub fn remove(&mut self, path: &str) -> Result<(), FsError> {
        let resolved = self.resolve(path)?;
        if self.files.remove(&resolved).is_some() {
            return Ok(());
        }
        if self.dirs.contains(&resolved) {
            return Err(FsError::IsDirectory(path.to_string()));
        }
        Err(FsError::NotFound(path.to_string()))
    }

    /// Lists the direct children of a directory, preceded by `.` and `..`.
    ///
    /// # Errors
    ///
    /// Fails if the path is a file or does not exist.
    pub fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>, FsError> {
        let resolved = self.resolve(path)?;
        if !self.dirs.contains(&resolved) {
            if self.files.contains_key(&resolved) {
                return Err(FsError::NotADirectory(path.to_string()));
            }
            return Err(FsError::NotFound(path.to_string()));
        }

        let mut entries = vec![
            DirEntry {
                name: ".".to_string(),
                is_dir: true,
            },
            DirEntry {
                name: "..".to_string(),
                is_dir: true,
            },
        ];

        let prefix = format!("{resolved}/");
        let is_child = |key: &&String| {
            key.strip_prefix(&prefix)
                .is_some_and(|rest| !rest.is_empty() && !rest.contains('/'))
        };
        let entry = |key: &String, is_dir: bool| DirEntry {
            name: key[prefix.len()..].to_string(),
            is_dir,
        };

        entries.extend(self.dirs.iter().filter(is_child).map(|key| entry(key, true)));
        entries.extend(self.files.keys().filter(is_child).map(|key| entry(key, false)));
        Ok(entries)
    }

    /// Ensures every ancestor of `resolved` below home is a directory.
    fn create_parents(&mut self, resolved: &str, path: &str) -> Result<(), FsError> {
        let mut ancestors = Vec::new();
        let mut current = resolved;
        while let Some((parent, _)) = current.rsplit_once('/') {
            if parent.len() <= self.home.len() {
                break;
            }
            ancestors.push(parent.to_string());
            current = parent;
        }

        for ancestor in ancestors.into_iter().rev() {
            if self.files.contains_key(&ancestor) {
                return Err(FsError::NotADirectory(path.to_string()));
            }
            self.dirs.insert(ancestor);
        }
        Ok(())
    }
}

/// Lexically normalizes an absolute path. Returns `None` if `..` climbs
/// above the root.
fn normalize(path: &str) -> Option<String> {
    let mut parts: Vec<&str> = Vec::new();
    for component in path.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            other => parts.push(other),
        }
    }
    Some(format!("/{}", parts.join("/")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fs() -> VirtualFs {
        VirtualFs::new("/home/sandbox")
    }

    #[test]
    fn relative_paths_resolve_under_home() {
        let fs = fs();
        assert_eq!(fs.resolve("a.txt").unwrap(), "/home/sandbox/a.txt");
        assert_eq!(fs.resolve("./sub/../b.txt").unwrap(), "/home/sandbox/b.txt");
        assert_eq!(fs.resolve("").unwrap(), "/home/sandbox");
        assert_eq!(
            fs.resolve("/home/sandbox/c.txt").unwrap(),
            "/home/sandbox/c.txt"
        );
    }

    #[test]
    fn escaping_paths_are_rejected() {
        let fs = fs();
        assert!(matches!(fs.resolve("../x"), Err(FsError::OutsideHome(_))));
        assert!(matches!(fs.resolve("/etc/passwd"), Err(FsError::OutsideHome(_))));
        assert!(matches!(
            fs.resolve("/home/sandboxed/x"),
            Err(FsError::OutsideHome(_))
        ));
        assert!(matches!(fs.resolve("/../../.."), Err(FsError::OutsideHome(_))));
    }

    #[test]
    fn write_creates_parent_directories() {
        let mut fs = fs();
        fs.write("sub/deep/x.txt", b"data").unwrap();

        assert!(fs.is_dir("sub"));
        assert!(fs.is_dir("sub/deep"));
        assert_eq!(fs.read("sub/deep/x.txt").unwrap(), b"data");
    }

    #[test]
    fn write_through_file_parent_fails() {
        let mut fs = fs();
        fs.write("a", b"").unwrap();
        assert!(matches!(fs.write("a/b", b""), Err(FsError::NotADirectory(_))));
    }

    #[test]
    fn append_extends_or_creates() {
        let mut fs = fs();
        fs.append("log.txt", b"one\n").unwrap();
        fs.append("log.txt", b"two\n").unwrap();
        assert_eq!(fs.read("log.txt").unwrap(), b"one\ntwo\n");
    }

    #[test]
    fn read_errors() {
        let mut fs = fs();
        fs.mkdir("dir").unwrap();
        assert!(matches!(fs.read("missing"), Err(FsError::NotFound(_))));
        assert!(matches!(fs.read("dir"), Err(FsError::IsDirectory(_))));
    }

    #[test]
    fn remove_file() {
        let mut fs = fs();
        fs.write("a.txt", b"x").unwrap();
        fs.remove("a.txt").unwrap();
        assert!(!fs.exists("a.txt"));
        assert!(matches!(fs.remove("a.txt"), Err(FsError::NotFound(_))));
    }

    #[test]
    fn read_dir_lists_direct_children_with_markers() {
        let mut fs = fs();
        fs.write("a.txt", b"").unwrap();
        fs.write("sub/b.txt", b"").unwrap();

        let names: Vec<(String, bool)> = fs
            .read_dir("")
            .unwrap()
            .into_iter()
            .map(|e| (e.name, e.is_dir))
            .collect();

        assert_eq!(
            names,
            vec![
                (".".to_string(), true),
                ("..".to_string(), true),
                ("sub".to_string(), true),
                ("a.txt".to_string(), false),
            ]
        );

        let sub = fs.read_dir("sub").unwrap();
        assert_eq!(sub.len(), 3);
        assert_eq!(sub[2].name, "b.txt");
    }

    #[test]
    fn read_dir_on_file_fails() {
        let mut fs = fs();
        fs.write("a.txt", b"").unwrap();
        assert!(matches!(fs.read_dir("a.txt"), Err(FsError::NotADirectory(_))));
    }

    #[test]
    fn fs_error_converts_to_engine_error() {
        let error: EngineError = FsError::NotFound("x".to_string()).into();
        assert_eq!(error.kind, "FileSystemError");
        assert!(error.message.contains("'x'"));
    }
}
