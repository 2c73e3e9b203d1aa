use std::path::{Path, PathBuf};

use crate::error::{StoreError, StoreResult};

/// Byte storage for unit documents and buffer files.
///
/// All implementations must satisfy these invariants:
/// - A successful `write` is visible to every later `read` of the same path.
/// - A failed `write` leaves any previous content of that path intact.
/// - The store never interprets file contents.
/// - All I/O errors are propagated, never silently ignored.
pub trait UnitStore: Send + Sync {
    /// Read a file. Returns `Ok(None)` if it does not exist.
    fn read(&self, path: &Path) -> StoreResult<Option<Vec<u8>>>;

    /// Write a file, creating parent folders as needed.
    fn write(&self, path: &Path, data: &[u8]) -> StoreResult<()>;

    /// Check whether a file exists.
    fn exists(&self, path: &Path) -> StoreResult<bool>;

    /// Delete a file. Returns `true` if it existed.
    fn delete(&self, path: &Path) -> StoreResult<bool>;

    /// Read a file that must exist.
    fn read_required(&self, path: &Path) -> StoreResult<Vec<u8>> {
        self.read(path)?
            .ok_or_else(|| StoreError::NotFound(path.to_path_buf()))
    }

    /// Write several files.
    ///
    /// Default implementation calls `write()` for each file in order.
    fn write_batch(&self, files: &[(PathBuf, Vec<u8>)]) -> StoreResult<()> {
        files.iter().try_for_each(|(path, data)| self.write(path, data))
    }
}
