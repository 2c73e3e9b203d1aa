use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::traits::UnitStore;

/// Filesystem-backed unit store.
///
/// Relative paths are resolved against `base`; absolute paths are used as
/// given. Every write goes to a temporary file in the destination folder and
/// is renamed into place, so readers never observe a half-written unit.
#[derive(Debug, Clone)]
pub struct FsUnitStore {
    base: PathBuf,
}

impl FsUnitStore {
    /// Store rooted at `base`.
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// Store that resolves relative paths against the process working directory.
    pub fn cwd() -> Self {
        Self::new(PathBuf::new())
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        path_clean::clean(self.base.join(path))
    }
}

impl Default for FsUnitStore {
    fn default() -> Self {
        Self::cwd()
    }
}

impl UnitStore for FsUnitStore {
    fn read(&self, path: &Path) -> StoreResult<Option<Vec<u8>>> {
        let full = self.resolve(path);
        match fs::read(&full) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::io(full, e)),
        }
    }

    fn write(&self, path: &Path, data: &[u8]) -> StoreResult<()> {
        let full = self.resolve(path);
        let dir = match full.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;

        let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| StoreError::io(&dir, e))?;
        tmp.write_all(data).map_err(|e| StoreError::io(tmp.path(), e))?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| StoreError::io(tmp.path(), e))?;
        tmp.persist(&full)
            .map_err(|e| StoreError::io(&full, e.error))?;

        debug!(path = %full.display(), bytes = data.len(), "wrote file");
        Ok(())
    }

    fn exists(&self, path: &Path) -> StoreResult<bool> {
        let full = self.resolve(path);
        full.try_exists().map_err(|e| StoreError::io(full, e))
    }

    fn delete(&self, path: &Path) -> StoreResult<bool> {
        let full = self.resolve(path);
        match fs::remove_file(&full) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::io(full, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_creates_folders_and_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsUnitStore::new(dir.path());
        let path = Path::new("deep/nested/Patient_p1.xml");
        store.write(path, b"<Patient/>").unwrap();
        assert!(dir.path().join("deep/nested/Patient_p1.xml").is_file());
        assert_eq!(store.read_required(path).unwrap(), b"<Patient/>");
    }

    #[test]
    fn absolute_paths_ignore_base() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsUnitStore::new("/definitely/not/used");
        let path = dir.path().join("a.xml");
        store.write(&path, b"a").unwrap();
        assert!(store.exists(&path).unwrap());
    }

    #[test]
    fn overwrite_leaves_no_temporaries() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsUnitStore::new(dir.path());
        store.write(Path::new("x.xml"), b"one").unwrap();
        store.write(Path::new("x.xml"), b"two").unwrap();
        assert_eq!(store.read_required(Path::new("x.xml")).unwrap(), b"two");
        let entries = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn missing_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsUnitStore::new(dir.path());
        assert!(store.read(Path::new("missing.xml")).unwrap().is_none());
        assert!(!store.exists(Path::new("missing.xml")).unwrap());
        store.write(Path::new("d.xml"), b"d").unwrap();
        assert!(store.delete(Path::new("d.xml")).unwrap());
        assert!(!store.delete(Path::new("d.xml")).unwrap());
    }

    #[test]
    fn io_errors_carry_the_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("file"), b"x").unwrap();
        let store = FsUnitStore::new(dir.path());
        // A regular file cannot be used as a folder.
        let err = store.write(Path::new("file/child.xml"), b"y").unwrap_err();
        match err {
            StoreError::Io { path, .. } => assert!(path.ends_with("file")),
            other => panic!("unexpected error: {other}"),
        }
    }
}
